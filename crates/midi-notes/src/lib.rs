//! Standard MIDI Files in and out of the voice splitter.
//!
//! [`Song`] turns SMF bytes into time-resolved notes labeled with their
//! true voice; [`voices_to_midi`] writes split voices back as one track
//! per voice.

pub mod context;
pub mod song;
pub mod writer;

pub use context::{
    KeySignature, MidiFileContext, SmpteTiming, TempoChange, TempoMap, TimeSignature,
};
pub use song::{extract_notes, LabelSource, Song};
pub use writer::{voices_to_midi, write_voices, ExportOptions};

use std::path::PathBuf;

/// Errors from reading or writing MIDI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("MIDI write error: {0}")]
    MidiWrite(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
