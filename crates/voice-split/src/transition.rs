//! Log-probability of note-to-voice transitions.
//!
//! Voices are kept in ascending pitch order: index 0 is the lowest voice.
//! A note placed below the voice under it, or above the voice over it,
//! pays [`ORDER_PENALTY`] once per violated neighbor.

use crate::chain::VoiceChain;
use crate::note::Note;
use crate::params::ModelParameters;
use crate::score::gaussian_window;
use std::sync::Arc;

/// Score of a transition whose probability is undefined.
///
/// Finite so that sums stay orderable, and far below any real log-probability.
pub const FORBIDDEN_SCORE: f64 = -1.0e300;

/// Penalty for each pitch-order violation, `ln 2`.
pub const ORDER_PENALTY: f64 = std::f64::consts::LN_2;

pub struct TransitionScorer<'a> {
    params: &'a ModelParameters,
}

impl<'a> TransitionScorer<'a> {
    pub fn new(params: &'a ModelParameters) -> Self {
        Self { params }
    }

    /// Score appending `note` to the voice at `position`.
    pub fn score_existing(&self, note: &Note, voices: &[Arc<VoiceChain>], position: usize) -> f64 {
        let base = match voices.get(position) {
            Some(head) => self.continuation_log_prob(note, head),
            None => return FORBIDDEN_SCORE,
        };
        let lower = position.checked_sub(1).and_then(|p| voices.get(p));
        let upper = voices.get(position + 1);
        with_order_penalty(base, note, lower, upper)
    }

    /// Score opening a new voice for `note`, inserted before `position`.
    pub fn score_new_voice(&self, note: &Note, voices: &[Arc<VoiceChain>], position: usize) -> f64 {
        let base = self.params.new_voice_log_prior();
        let lower = position.checked_sub(1).and_then(|p| voices.get(p));
        let upper = voices.get(position);
        with_order_penalty(base, note, lower, upper)
    }

    /// `ln(pitch score) + ln(gap score)` for continuing `head` with `note`.
    pub fn continuation_log_prob(&self, note: &Note, head: &VoiceChain) -> f64 {
        let pitch_score = gaussian_window(
            head.weighted_recent_pitch(self.params),
            note.pitch as f64,
            self.params.pitch_std,
        );

        let gap = note.onset_micros as f64 - head.most_recent_note().offset_micros as f64;
        let inside = (gap.abs() / self.params.gap_std_micros + 1.0).max(0.0);
        let gap_score = (inside.ln() + 1.0).max(self.params.min_gap_score);

        pitch_score.ln() + gap_score.ln()
    }
}

fn with_order_penalty(
    log_prob: f64,
    note: &Note,
    lower: Option<&Arc<VoiceChain>>,
    upper: Option<&Arc<VoiceChain>>,
) -> f64 {
    if !log_prob.is_finite() {
        return FORBIDDEN_SCORE;
    }

    let mut score = log_prob;
    if lower.is_some_and(|voice| note.pitch < voice.most_recent_note().pitch) {
        score -= ORDER_PENALTY;
    }
    if upper.is_some_and(|voice| note.pitch > voice.most_recent_note().pitch) {
        score -= ORDER_PENALTY;
    }
    score.max(FORBIDDEN_SCORE)
}
