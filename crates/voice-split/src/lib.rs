//! Probabilistic voice splitting.
//!
//! Takes a flattened stream of notes (pitch, velocity, onset, offset) and
//! reconstructs independent monophonic voices without any channel or track
//! hints. Notes sharing an onset time form an onset group; each group is one
//! decision step of a beam search over assignments.
//!
//! - [`VoiceChain`] is a voice's history as a persistent linked list, shared
//!   between hypotheses.
//! - [`TransitionScorer`] gives the log-probability of continuing a voice or
//!   opening a new one.
//! - [`BeamExpander`] enumerates every legal assignment of one group for one
//!   hypothesis.
//! - [`VoiceSplitter`] owns the beam and drives it through the song.
//! - [`eval`] scores a result against ground-truth voices.
//!
//! # Example
//!
//! ```
//! use voice_split::{split_voices, ModelParameters, Note, SearchLimits};
//!
//! let note = |id: usize, pitch: u8, onset: u64| Note {
//!     id,
//!     pitch,
//!     velocity: 90,
//!     onset_micros: onset,
//!     onset_tick: onset / 1000,
//!     offset_micros: onset + 500_000,
//!     offset_tick: (onset + 500_000) / 1000,
//!     label: 0,
//! };
//!
//! // Two lines moving in contrary motion
//! let notes = vec![
//!     note(0, 60, 0),
//!     note(1, 72, 0),
//!     note(2, 62, 500_000),
//!     note(3, 70, 500_000),
//! ];
//!
//! let params = ModelParameters::default();
//! let (best, _stats) = split_voices(&notes, &params, &SearchLimits::default())?;
//! assert_eq!(best.voice_count(), 2);
//! # Ok::<(), voice_split::Error>(())
//! ```

pub mod chain;
pub mod engine;
pub mod eval;
pub mod expand;
pub mod hypothesis;
pub mod note;
pub mod params;
pub mod score;
pub mod transition;

pub use chain::VoiceChain;
pub use engine::{split_voices, SearchStats, VoiceSplitter};
pub use eval::{aggregate, evaluate, EvaluationReport, GoldStandard, SongScore};
pub use expand::{BeamExpander, Deadline, Expansion};
pub use hypothesis::{Beam, Hypothesis};
pub use note::{onset_groups, Note};
pub use params::{ModelParameters, SearchLimits};
pub use transition::{TransitionScorer, FORBIDDEN_SCORE};

/// Errors from voice splitting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no hypotheses remain: the search collapsed")]
    EmptyBeam,

    #[error("invalid parameter {field}: {reason}")]
    InvalidParameters { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
