use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BEAM_WIDTH: usize = 25;
pub const DEFAULT_NEW_VOICE_PRIOR: f64 = 1e-9;
pub const DEFAULT_PITCH_HISTORY_LENGTH: usize = 6;
pub const DEFAULT_GAP_STD_MICROS: f64 = 127_000.0;
pub const DEFAULT_PITCH_STD: f64 = 4.0;
pub const DEFAULT_MIN_GAP_SCORE: f64 = 8e-4;

pub const DEFAULT_EXPANSION_BUDGET: Duration = Duration::from_secs(20);
pub const DEFAULT_BEAM_SAFETY_CAP: usize = 1000;

/// Model parameters, fixed for the duration of one decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParameters {
    /// Hypotheses retained after each onset group.
    pub beam_width: usize,
    /// Probability of opening a new voice. Its natural log is the
    /// new-voice transition score.
    pub new_voice_prior: f64,
    /// How many of a voice's most recent pitches feed its weighted pitch.
    pub pitch_history_length: usize,
    /// Scale of the gap score, in microseconds.
    pub gap_std_micros: f64,
    /// Standard deviation of the pitch window, in semitones.
    pub pitch_std: f64,
    /// Floor applied to the gap score.
    pub min_gap_score: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            beam_width: DEFAULT_BEAM_WIDTH,
            new_voice_prior: DEFAULT_NEW_VOICE_PRIOR,
            pitch_history_length: DEFAULT_PITCH_HISTORY_LENGTH,
            gap_std_micros: DEFAULT_GAP_STD_MICROS,
            pitch_std: DEFAULT_PITCH_STD,
            min_gap_score: DEFAULT_MIN_GAP_SCORE,
        }
    }
}

impl ModelParameters {
    pub fn new_voice_log_prior(&self) -> f64 {
        self.new_voice_prior.ln()
    }

    /// Reject parameter sets the scorer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.beam_width == 0 {
            return Err(invalid("beam_width", "must be at least 1"));
        }
        if self.pitch_history_length == 0 {
            return Err(invalid("pitch_history_length", "must be at least 1"));
        }
        if !(self.new_voice_prior > 0.0 && self.new_voice_prior <= 1.0) {
            return Err(invalid(
                "new_voice_prior",
                format!("{} is not a probability in (0, 1]", self.new_voice_prior),
            ));
        }
        if !(self.gap_std_micros.is_finite() && self.gap_std_micros > 0.0) {
            return Err(invalid(
                "gap_std_micros",
                format!("{} is not a positive number", self.gap_std_micros),
            ));
        }
        if !(self.pitch_std.is_finite() && self.pitch_std > 0.0) {
            return Err(invalid(
                "pitch_std",
                format!("{} is not a positive number", self.pitch_std),
            ));
        }
        if !(self.min_gap_score.is_finite() && self.min_gap_score >= 0.0) {
            return Err(invalid(
                "min_gap_score",
                format!("{} is not a non-negative number", self.min_gap_score),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(beam={}, prior={:e}, history={}, gap_std={}, pitch_std={}, min_gap={:e})",
            self.beam_width,
            self.new_voice_prior,
            self.pitch_history_length,
            self.gap_std_micros,
            self.pitch_std,
            self.min_gap_score,
        )
    }
}

/// Safety limits on the search itself, independent of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchLimits {
    /// Soft wall-clock budget for expanding one onset group.
    pub expansion_budget: Duration,
    /// A step is skipped while the beam holds more hypotheses than this.
    pub beam_safety_cap: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            expansion_budget: DEFAULT_EXPANSION_BUDGET,
            beam_safety_cap: DEFAULT_BEAM_SAFETY_CAP,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidParameters {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = ModelParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.beam_width, 25);
        assert!((params.new_voice_log_prior() - (1e-9f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn rejects_zero_beam() {
        let params = ModelParameters {
            beam_width: 0,
            ..Default::default()
        };
        match params.validate() {
            Err(Error::InvalidParameters { field, .. }) => assert_eq!(field, "beam_width"),
            other => panic!("expected invalid beam_width, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_probabilities_and_scales() {
        let cases = [
            ModelParameters {
                new_voice_prior: 0.0,
                ..Default::default()
            },
            ModelParameters {
                new_voice_prior: 1.5,
                ..Default::default()
            },
            ModelParameters {
                pitch_std: 0.0,
                ..Default::default()
            },
            ModelParameters {
                gap_std_micros: f64::NAN,
                ..Default::default()
            },
            ModelParameters {
                min_gap_score: -1.0,
                ..Default::default()
            },
            ModelParameters {
                pitch_history_length: 0,
                ..Default::default()
            },
        ];
        for params in cases {
            assert!(params.validate().is_err(), "{} should be rejected", params);
        }
    }

    #[test]
    fn display_lists_every_field() {
        let shown = ModelParameters::default().to_string();
        assert!(shown.contains("beam=25"));
        assert!(shown.contains("history=6"));
        assert!(shown.contains("gap_std=127000"));
    }
}
