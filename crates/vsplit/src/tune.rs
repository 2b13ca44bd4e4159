//! Grid search over model parameters.

use crate::runner::evaluate_corpus;
use midi_notes::Song;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use voice_split::{EvaluationReport, ModelParameters, SearchLimits};

/// A searched interval: values start at `min`, stay below `max`, and
/// are at least `min_step` apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub min_step: f64,
}

impl ParamRange {
    const fn new(min: f64, max: f64, min_step: f64) -> Self {
        Self { min, max, min_step }
    }

    pub fn values(&self, steps: usize) -> Vec<f64> {
        let steps = steps.max(1) as f64;
        let step = ((self.max - self.min) / steps).max(self.min_step);
        if step <= 0.0 {
            return vec![self.min];
        }
        // Tolerance keeps float drift from adding a value at `max`
        let count = ((self.max - self.min) / step - 1e-9).ceil().max(1.0) as usize;
        (0..count).map(|i| self.min + i as f64 * step).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuneGrid {
    pub beam_width: ParamRange,
    pub new_voice_prior: ParamRange,
    pub pitch_history_length: ParamRange,
    pub gap_std_micros: ParamRange,
    pub pitch_std: ParamRange,
    pub min_gap_score: ParamRange,
}

impl Default for TuneGrid {
    fn default() -> Self {
        Self {
            beam_width: ParamRange::new(10.0, 11.0, 1.0),
            new_voice_prior: ParamRange::new(1e-9, 1e-7, 0.0),
            pitch_history_length: ParamRange::new(5.0, 10.0, 1.0),
            gap_std_micros: ParamRange::new(30_000.0, 1_000_000.0, 0.0),
            pitch_std: ParamRange::new(4.0, 9.0, 0.5),
            min_gap_score: ParamRange::new(1e-6, 1e-4, 0.0),
        }
    }
}

impl TuneGrid {
    /// Every combination, in a fixed order.
    pub fn parameter_sets(&self, steps: usize) -> Vec<ModelParameters> {
        let beams = self.beam_width.values(steps);
        let priors = self.new_voice_prior.values(steps);
        let histories = self.pitch_history_length.values(steps);
        let gaps = self.gap_std_micros.values(steps);
        let pitch_stds = self.pitch_std.values(steps);
        let min_gaps = self.min_gap_score.values(steps);

        let mut sets = Vec::new();
        for &new_voice_prior in &priors {
            for &history in &histories {
                for &gap_std_micros in &gaps {
                    for &pitch_std in &pitch_stds {
                        for &min_gap_score in &min_gaps {
                            for &beam in &beams {
                                sets.push(ModelParameters {
                                    beam_width: beam.round() as usize,
                                    new_voice_prior,
                                    pitch_history_length: history.round() as usize,
                                    gap_std_micros,
                                    pitch_std,
                                    min_gap_score,
                                });
                            }
                        }
                    }
                }
            }
        }
        sets
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneResult {
    pub params: ModelParameters,
    pub report: EvaluationReport,
}

/// Evaluate every parameter set in parallel and return the best by F1.
///
/// Ties go to the earliest set in grid order. Sets whose decode fails on
/// any song are logged and left out. `None` if every set failed.
pub fn tune(
    songs: &[Song],
    grid: &TuneGrid,
    steps: usize,
    limits: &SearchLimits,
) -> Option<TuneResult> {
    let sets = grid.parameter_sets(steps);
    info!(combinations = sets.len(), songs = songs.len(), "tuning");

    let results: Vec<Option<TuneResult>> = sets
        .into_par_iter()
        .map(|params| match evaluate_corpus(songs, &params, limits) {
            Ok(report) => Some(TuneResult { params, report }),
            Err(e) => {
                warn!(%params, error = %e, "parameter set failed");
                None
            }
        })
        .collect();

    results
        .into_iter()
        .flatten()
        .fold(None, |best: Option<TuneResult>, candidate| match best {
            Some(current) if current.report.f1 >= candidate.report.f1 => Some(current),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::duet;
    use pretty_assertions::assert_eq;

    #[test]
    fn range_values_exclude_max() {
        let range = ParamRange::new(5.0, 10.0, 1.0);
        assert_eq!(range.values(5), vec![5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(range.values(2), vec![5.0, 7.5]);
    }

    #[test]
    fn min_step_limits_resolution() {
        let beam = ParamRange::new(10.0, 11.0, 1.0);
        assert_eq!(beam.values(5), vec![10.0]);

        let prior = ParamRange::new(1e-9, 1e-7, 0.0);
        assert_eq!(prior.values(5).len(), 5);
        assert_eq!(prior.values(0).len(), 1);
    }

    #[test]
    fn grid_sizes() {
        let grid = TuneGrid::default();
        assert_eq!(grid.parameter_sets(1).len(), 1);
        assert_eq!(grid.parameter_sets(2).len(), 32);

        let sets = grid.parameter_sets(2);
        assert!(sets.iter().all(|p| p.beam_width == 10));
        assert!(sets.iter().any(|p| p.pitch_history_length == 8));
        assert!(sets.iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn tune_picks_a_perfect_set() {
        let songs = vec![duet()];
        let best = tune(&songs, &TuneGrid::default(), 1, &SearchLimits::default()).unwrap();
        assert_eq!(best.report.f1, 1.0);
        assert_eq!(best.params.beam_width, 10);
    }
}
