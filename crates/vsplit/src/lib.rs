//! vsplit - split MIDI files into monophonic voices and score the result.

pub mod inputs;
pub mod report;
pub mod runner;
pub mod tune;
