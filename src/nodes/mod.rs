// src/nodes/mod.rs
//
// Built-in processors.

mod gain;
mod master_output;
mod sequence_note_provider;

pub use gain::GainProcessor;
pub use master_output::MasterOutput;
pub use sequence_note_provider::SequenceNoteProvider;
