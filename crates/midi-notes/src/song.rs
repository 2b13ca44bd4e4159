use crate::context::{
    KeySignature, MidiFileContext, SmpteTiming, TempoChange, TempoMap, TimeSignature,
};
use crate::{Error, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use voice_split::{GoldStandard, Note};

/// Where a note's ground-truth voice label comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    #[default]
    Channel,
    Track,
}

/// A parsed song: its notes, timing context, and true voices.
#[derive(Debug, Clone)]
pub struct Song {
    pub name: String,
    /// Sorted by onset tick, then pitch, then offset tick; `id` is the index.
    pub notes: Vec<Note>,
    pub context: MidiFileContext,
    pub gold: GoldStandard,
}

impl Song {
    pub fn parse(name: impl Into<String>, bytes: &[u8], labels: LabelSource) -> Result<Self> {
        let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
        let (notes, context) = extract_notes(&smf, labels);
        let gold = GoldStandard::from_notes(&notes);
        let name = name.into();

        debug!(
            song = %name,
            notes = notes.len(),
            tracks = context.track_count,
            true_voices = gold.voices().len(),
            "parsed song"
        );

        Ok(Self {
            name,
            notes,
            context,
            gold,
        })
    }

    /// Read and parse a file, naming the song after the file stem.
    pub fn read(path: &Path, labels: LabelSource) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, &bytes, labels)
    }

    /// The notes as a stream of onset groups, earliest first.
    pub fn onset_groups(&self) -> Vec<Vec<Note>> {
        voice_split::onset_groups(&self.notes)
    }
}

struct RawNote {
    onset_tick: u64,
    offset_tick: u64,
    pitch: u8,
    velocity: u8,
    label: usize,
}

/// Pair note-on/note-off events across all tracks and resolve their times.
pub fn extract_notes(smf: &Smf, labels: LabelSource) -> (Vec<Note>, MidiFileContext) {
    let (ppq, smpte) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => (
            480,
            Some(SmpteTiming {
                fps: fps.as_int(),
                ticks_per_frame,
            }),
        ),
    };

    let format = match smf.header.format {
        midly::Format::SingleTrack => 0,
        midly::Format::Parallel => 1,
        midly::Format::Sequential => 2,
    };

    let mut raw = Vec::new();
    let mut tempo_changes = Vec::new();
    let mut time_signatures = Vec::new();
    let mut key_signatures = Vec::new();
    let mut total_ticks: u64 = 0;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        // (channel, pitch) -> open notes as (onset_tick, velocity), newest last
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push(TempoChange::new(current_tick, tempo.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, _, _)) => {
                    time_signatures.push(TimeSignature {
                        tick: current_tick,
                        numerator: num,
                        denominator: 1u8.checked_shl(denom_pow as u32).unwrap_or(0),
                    });
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(sharps, minor)) => {
                    key_signatures.push(KeySignature {
                        tick: current_tick,
                        sharps,
                        minor,
                    });
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((current_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            let key = (ch, key.as_int());
                            if let Some((onset, velocity)) =
                                pending.get_mut(&key).and_then(|stack| stack.pop())
                            {
                                raw.push(RawNote {
                                    onset_tick: onset,
                                    offset_tick: current_tick,
                                    pitch: key.1,
                                    velocity,
                                    label: label_for(labels, ch, track_index),
                                });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        total_ticks = total_ticks.max(current_tick);

        // Close anything still sounding at the track's last tick
        for (&(ch, pitch), stack) in &pending {
            for &(onset, velocity) in stack {
                raw.push(RawNote {
                    onset_tick: onset,
                    offset_tick: current_tick,
                    pitch,
                    velocity,
                    label: label_for(labels, ch, track_index),
                });
            }
        }
    }

    raw.sort_by(|a, b| {
        a.onset_tick
            .cmp(&b.onset_tick)
            .then(a.pitch.cmp(&b.pitch))
            .then(a.offset_tick.cmp(&b.offset_tick))
            .then(a.label.cmp(&b.label))
            .then(a.velocity.cmp(&b.velocity))
    });

    // Format 1 files may repeat conductor events in several tracks
    tempo_changes.sort_by_key(|t| t.tick);
    tempo_changes
        .dedup_by(|a, b| a.tick == b.tick && a.microseconds_per_beat == b.microseconds_per_beat);
    time_signatures.sort_by_key(|t| t.tick);
    time_signatures.dedup_by(|a, b| a.tick == b.tick);
    key_signatures.sort_by_key(|k| k.tick);
    key_signatures.dedup_by(|a, b| a.tick == b.tick);

    let context = MidiFileContext {
        ppq,
        smpte,
        format,
        track_count: smf.tracks.len(),
        tempo_changes,
        time_signatures,
        key_signatures,
        total_ticks,
    };

    let tempo = TempoMap::from_context(&context);
    let notes = raw
        .into_iter()
        .enumerate()
        .map(|(id, n)| Note {
            id,
            pitch: n.pitch,
            velocity: n.velocity,
            onset_micros: tempo.micros_at_tick(n.onset_tick),
            onset_tick: n.onset_tick,
            offset_micros: tempo.micros_at_tick(n.offset_tick),
            offset_tick: n.offset_tick,
            label: n.label,
        })
        .collect();

    (notes, context)
}

fn label_for(labels: LabelSource, channel: u8, track_index: usize) -> usize {
    match labels {
        LabelSource::Channel => channel as usize,
        LabelSource::Track => track_index,
    }
}
