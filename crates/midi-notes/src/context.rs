//! File-level timing: resolution, tempo changes and signatures, and the
//! tick-to-microsecond conversion built from them.

use serde::{Deserialize, Serialize};

/// Tempo in effect before the first tempo event (120 BPM).
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Parsed MIDI file context: timing, format, and conductor events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiFileContext {
    /// Ticks per quarter note. Meaningless when `smpte` is set.
    pub ppq: u16,
    /// Set for files using timecode rather than metrical timing.
    pub smpte: Option<SmpteTiming>,
    pub format: u8,
    pub track_count: usize,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
    pub key_signatures: Vec<KeySignature>,
    pub total_ticks: u64,
}

impl Default for MidiFileContext {
    fn default() -> Self {
        Self {
            ppq: 480,
            smpte: None,
            format: 1,
            track_count: 0,
            tempo_changes: Vec::new(),
            time_signatures: Vec::new(),
            key_signatures: Vec::new(),
            total_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmpteTiming {
    /// 24, 25, 29 (drop-frame 29.97) or 30.
    pub fps: u8,
    pub ticks_per_frame: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub microseconds_per_beat: u32,
    pub bpm: f64,
}

impl TempoChange {
    pub fn new(tick: u64, microseconds_per_beat: u32) -> Self {
        Self {
            tick,
            microseconds_per_beat,
            bpm: 60_000_000.0 / microseconds_per_beat.max(1) as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u8,
    pub denominator: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub tick: u64,
    /// Sharps when positive, flats when negative.
    pub sharps: i8,
    pub minor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    tick: u64,
    micros_per_quarter: u32,
    start_micros: u64,
}

/// Converts absolute ticks to microseconds.
///
/// Metrical files integrate over tempo segments; timecode files have a
/// fixed duration per tick and ignore tempo events.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: u16,
    micros_per_tick: Option<f64>,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    pub fn from_context(context: &MidiFileContext) -> Self {
        let micros_per_tick = context.smpte.map(|smpte| {
            let fps = midly::Fps::from_int(smpte.fps)
                .map(|fps| fps.as_f32() as f64)
                .unwrap_or(smpte.fps as f64);
            1_000_000.0 / (fps * smpte.ticks_per_frame.max(1) as f64)
        });

        let ppq = context.ppq.max(1);
        let mut segments = vec![TempoSegment {
            tick: 0,
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            start_micros: 0,
        }];
        for change in &context.tempo_changes {
            let last = segments[segments.len() - 1];
            let start_micros = last.start_micros + span_micros(last, change.tick, ppq);
            let segment = TempoSegment {
                tick: change.tick,
                micros_per_quarter: change.microseconds_per_beat,
                start_micros,
            };
            // A later change at the same tick wins
            if last.tick == change.tick {
                let end = segments.len() - 1;
                segments[end] = TempoSegment {
                    start_micros: last.start_micros,
                    ..segment
                };
            } else {
                segments.push(segment);
            }
        }

        Self {
            ppq,
            micros_per_tick,
            segments,
        }
    }

    pub fn micros_at_tick(&self, tick: u64) -> u64 {
        if let Some(per_tick) = self.micros_per_tick {
            return (tick as f64 * per_tick).round() as u64;
        }
        let index = self.segments.partition_point(|s| s.tick <= tick);
        // The first segment starts at tick 0, so index is at least 1
        let segment = self.segments[index.saturating_sub(1)];
        segment.start_micros + span_micros(segment, tick, self.ppq)
    }
}

fn span_micros(segment: TempoSegment, tick: u64, ppq: u16) -> u64 {
    let ticks = tick.saturating_sub(segment.tick) as u128;
    (ticks * segment.micros_per_quarter as u128 / ppq as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(tempo_changes: Vec<TempoChange>) -> MidiFileContext {
        MidiFileContext {
            tempo_changes,
            ..Default::default()
        }
    }

    #[test]
    fn default_tempo_is_120_bpm() {
        let map = TempoMap::from_context(&context(vec![]));
        assert_eq!(map.micros_at_tick(480), 500_000);
        assert_eq!(map.micros_at_tick(240), 250_000);
    }

    #[test]
    fn integrates_across_tempo_changes() {
        // 120 BPM for one beat, then 60 BPM
        let map = TempoMap::from_context(&context(vec![
            TempoChange::new(0, 500_000),
            TempoChange::new(480, 1_000_000),
        ]));
        assert_eq!(map.micros_at_tick(480), 500_000);
        assert_eq!(map.micros_at_tick(720), 1_000_000);
        assert_eq!(map.micros_at_tick(960), 1_500_000);
    }

    #[test]
    fn last_change_at_a_tick_wins() {
        let map = TempoMap::from_context(&context(vec![
            TempoChange::new(0, 500_000),
            TempoChange::new(0, 250_000),
        ]));
        assert_eq!(map.micros_at_tick(480), 250_000);
    }

    #[test]
    fn change_before_first_beat_keeps_default_prefix() {
        let map = TempoMap::from_context(&context(vec![TempoChange::new(240, 1_000_000)]));
        assert_eq!(map.micros_at_tick(240), 250_000);
        assert_eq!(map.micros_at_tick(480), 750_000);
    }

    #[test]
    fn timecode_uses_fixed_tick_length() {
        let ctx = MidiFileContext {
            smpte: Some(SmpteTiming {
                fps: 25,
                ticks_per_frame: 40,
            }),
            tempo_changes: vec![TempoChange::new(0, 1_000_000)],
            ..Default::default()
        };
        let map = TempoMap::from_context(&ctx);
        // 1000 ticks per second
        assert_eq!(map.micros_at_tick(1000), 1_000_000);
        assert_eq!(map.micros_at_tick(1), 1_000);
    }

    #[test]
    fn tempo_change_reports_bpm() {
        assert!((TempoChange::new(0, 500_000).bpm - 120.0).abs() < 1e-9);
    }
}
