//! Note sequencing: the editable model, its compiler, the runtime store
//! the audio thread reads, and the transport that drives playback.

mod compiler;
mod model;
mod store;
mod time;
mod transport;

pub use compiler::{
    clamp_note, compile_arrangement, compile_notes, compile_pattern, compile_sequence,
    sort_event_list, CompiledChannels, SequenceEvent,
};
pub use model::{Arrangement, Clip, Note, Pattern, SequenceModel, TimeView};
pub use store::{
    sequence_store, ChannelEventMap, RtSequenceStore, SequenceEventList,
    SequenceEventListCollection, SequenceMap, SequenceStore,
};
pub use time::SequenceTime;
pub use transport::{
    transport, transport_with_capacity, LoopSegments, PlayheadJumpEvent, PlayheadSegment,
    RtTransport, Transport, TransportConfig, DEFAULT_JUMP_QUEUE_CAPACITY,
};

/// Identifies a pattern or an arrangement.
pub type SequenceId = u64;

/// Identifies the channel (instrument track) a note list belongs to.
pub type ChannelId = u64;
