// src/lib.rs
//
// Library entry point.
//
// The engine is split in two halves that share nothing but lock-free
// queues and atomics: an `EngineController` that owns every editable
// structure on the control thread, and an `Engine` that renders blocks on
// the audio thread.

mod arena;
mod audio_buffer;
mod config;
mod controller;
mod double_buffer;
mod engine;
mod error;
mod event;
mod event_buffer;
mod handoff;
mod smoother;
mod spsc;

pub mod graph;
pub mod nodes;
pub mod sequencer;

pub use arena::{ArenaAllocation, ArenaAllocator, DeallocateToken};
pub use audio_buffer::SampleBuffer;
pub use config::EngineConfig;
pub use controller::{create_engine, EngineController, Reclaimed};
pub use double_buffer::{double_buffered, CellReader, CellWriter};
pub use engine::{Engine, EngineReadback};
pub use error::{
    ArenaError, ArenaResult, CompileError, CompileResult, EngineError, EngineResult,
    SequenceError, SequenceResult, TopologyError, TopologyResult,
};
pub use event::{Event, EventKind, LiveEvent, RawEvent};
pub use event_buffer::{EventArena, EventBuffer};
pub use smoother::LinearParameterSmoother;
pub use spsc::{queue, QueueReader, QueueWriter};
