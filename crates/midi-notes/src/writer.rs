use crate::context::{MidiFileContext, DEFAULT_MICROS_PER_QUARTER};
use crate::{Error, Result};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Fps, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use voice_split::Note;

/// Options for MIDI export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Include the tempo/signature track. Default: true.
    pub include_tempo_map: bool,
    /// Prefix for voice track names, followed by the voice index.
    pub track_name_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_tempo_map: true,
            track_name_prefix: "Voice".to_string(),
        }
    }
}

/// Write voices to Standard MIDI File format 1 bytes.
///
/// Track 0: tempo changes, time and key signatures (from context).
/// Tracks 1+: one per voice, lowest voice first, each on its own channel.
pub fn voices_to_midi(
    voices: &[Vec<Note>],
    context: &MidiFileContext,
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    let names: Vec<String> = (0..voices.len())
        .map(|index| format!("{} {}", options.track_name_prefix, index + 1))
        .collect();

    let mut tracks: Vec<Track> = Vec::with_capacity(voices.len() + 1);
    if options.include_tempo_map {
        tracks.push(build_tempo_track(context)?);
    }
    for (index, voice) in voices.iter().enumerate() {
        tracks.push(build_voice_track(voice, voice_channel(index), names[index].as_bytes())?);
    }

    let smf = Smf {
        header: Header::new(Format::Parallel, timing(context)?),
        tracks,
    };

    let mut buf = Vec::new();
    smf.write(&mut buf).map_err(|e| Error::MidiWrite(e.to_string()))?;

    debug!(voices = voices.len(), bytes = buf.len(), "encoded voices");
    Ok(buf)
}

/// Encode voices and write them to `path`.
pub fn write_voices(
    path: &Path,
    voices: &[Vec<Note>],
    context: &MidiFileContext,
    options: &ExportOptions,
) -> Result<()> {
    let bytes = voices_to_midi(voices, context, options)?;
    std::fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Channel for the voice at `index`, skipping the percussion channel.
fn voice_channel(index: usize) -> u8 {
    let channel = if index >= 9 { index + 1 } else { index };
    channel.min(15) as u8
}

fn timing(context: &MidiFileContext) -> Result<Timing> {
    match context.smpte {
        Some(smpte) => {
            let fps = Fps::from_int(smpte.fps)
                .ok_or_else(|| Error::MidiWrite(format!("unsupported frame rate {}", smpte.fps)))?;
            Ok(Timing::Timecode(fps, smpte.ticks_per_frame))
        }
        None => u15::try_from(context.ppq).map(Timing::Metrical).ok_or_else(|| {
            Error::MidiWrite(format!("ticks per quarter {} out of range", context.ppq))
        }),
    }
}

/// Turn (absolute tick, event) pairs into a delta-timed track.
fn sequence<'a>(mut events: Vec<(u64, TrackEventKind<'a>)>) -> Result<Track<'a>> {
    events.sort_by_key(|(tick, _)| *tick);

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u64;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: delta(tick - last_tick)?,
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track)
}

fn delta(ticks: u64) -> Result<u28> {
    u32::try_from(ticks)
        .ok()
        .and_then(u28::try_from)
        .ok_or_else(|| Error::MidiWrite(format!("delta of {ticks} ticks is too large")))
}

fn build_tempo_track(context: &MidiFileContext) -> Result<Track<'static>> {
    let mut events = Vec::new();

    for change in &context.tempo_changes {
        let tempo = u24::try_from(change.microseconds_per_beat).ok_or_else(|| {
            Error::MidiWrite(format!("tempo {} out of range", change.microseconds_per_beat))
        })?;
        events.push((change.tick, TrackEventKind::Meta(MetaMessage::Tempo(tempo))));
    }
    if context.tempo_changes.is_empty() {
        events.push((
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(DEFAULT_MICROS_PER_QUARTER))),
        ));
    }

    for ts in &context.time_signatures {
        let denom_pow = ts.denominator.max(1).ilog2() as u8;
        events.push((
            ts.tick,
            TrackEventKind::Meta(MetaMessage::TimeSignature(ts.numerator, denom_pow, 24, 8)),
        ));
    }

    for ks in &context.key_signatures {
        events.push((
            ks.tick,
            TrackEventKind::Meta(MetaMessage::KeySignature(ks.sharps, ks.minor)),
        ));
    }

    sequence(events)
}

fn build_voice_track<'a>(voice: &[Note], channel: u8, name: &'a [u8]) -> Result<Track<'a>> {
    let channel = u4::new(channel);
    // (tick, is_note_on, event): note-offs sort ahead of note-ons at a tick
    let mut notes: Vec<(u64, bool, TrackEventKind<'a>)> = Vec::with_capacity(voice.len() * 2);
    for note in voice {
        let key = u7::new(note.pitch.min(127));
        notes.push((
            note.onset_tick,
            true,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::new(note.velocity.clamp(1, 127)),
                },
            },
        ));
        notes.push((
            note.offset_tick,
            false,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            },
        ));
    }
    notes.sort_by_key(|(tick, is_on, _)| (*tick, *is_on));

    let mut events = Vec::with_capacity(notes.len() + 1);
    events.push((0, TrackEventKind::Meta(MetaMessage::TrackName(name))));
    events.extend(notes.into_iter().map(|(tick, _, kind)| (tick, kind)));

    // Stable sort keeps the name first and the note-off ordering intact
    sequence(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::tests::two_channel_midi;
    use crate::song::{LabelSource, Song};
    use pretty_assertions::assert_eq;

    fn note(id: usize, pitch: u8, onset_tick: u64, offset_tick: u64) -> Note {
        Note {
            id,
            pitch,
            velocity: 100,
            onset_micros: onset_tick * 1000,
            onset_tick,
            offset_micros: offset_tick * 1000,
            offset_tick,
            label: 0,
        }
    }

    fn midi_events(track: &Track) -> Vec<(u32, MidiMessage)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for event in track {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { message, .. } = event.kind {
                out.push((tick, message));
            }
        }
        out
    }

    #[test]
    fn writes_format_one_with_tempo_track() {
        let voices = vec![vec![note(0, 60, 0, 480), note(1, 64, 480, 960)]];
        let bytes =
            voices_to_midi(&voices, &MidiFileContext::default(), &ExportOptions::default())
                .unwrap();

        let smf = Smf::parse(&bytes).expect("generated MIDI should parse");
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);
        assert!(smf.tracks[0].iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
        )));
    }

    #[test]
    fn voice_tracks_are_named_from_one() {
        let voices = vec![vec![note(0, 40, 0, 480)], vec![note(1, 64, 0, 480)]];
        let bytes =
            voices_to_midi(&voices, &MidiFileContext::default(), &ExportOptions::default())
                .unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let names: Vec<&[u8]> = smf.tracks[1..]
            .iter()
            .filter_map(|track| {
                track.iter().find_map(|e| match e.kind {
                    TrackEventKind::Meta(MetaMessage::TrackName(name)) => Some(name),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(names, vec![&b"Voice 1"[..], &b"Voice 2"[..]]);
    }

    #[test]
    fn note_off_precedes_note_on_at_same_tick() {
        let voices = vec![vec![note(0, 60, 0, 480), note(1, 62, 480, 960)]];
        let bytes =
            voices_to_midi(&voices, &MidiFileContext::default(), &ExportOptions::default())
                .unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let events = midi_events(&smf.tracks[1]);
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].0, 480);
        assert!(matches!(events[1].1, MidiMessage::NoteOff { key, .. } if key.as_int() == 60));
        assert!(matches!(events[2].1, MidiMessage::NoteOn { key, .. } if key.as_int() == 62));
    }

    #[test]
    fn channels_skip_percussion() {
        assert_eq!(voice_channel(0), 0);
        assert_eq!(voice_channel(8), 8);
        assert_eq!(voice_channel(9), 10);
        assert_eq!(voice_channel(14), 15);
        assert_eq!(voice_channel(40), 15);
    }

    #[test]
    fn can_omit_tempo_track() {
        let options = ExportOptions {
            include_tempo_map: false,
            ..Default::default()
        };
        let voices = vec![vec![note(0, 60, 0, 480)], vec![note(1, 72, 0, 480)]];
        let bytes = voices_to_midi(&voices, &MidiFileContext::default(), &options).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
    }

    #[test]
    fn reparsed_voices_keep_ticks_and_context() {
        let song = Song::parse("two", &two_channel_midi(), LabelSource::Channel).unwrap();
        let voices: Vec<Vec<Note>> = song.gold.voices().to_vec();

        let bytes = voices_to_midi(&voices, &song.context, &ExportOptions::default()).unwrap();
        let again = Song::parse("again", &bytes, LabelSource::Track).unwrap();

        let spans = |notes: &[Note]| -> Vec<(u8, u64, u64)> {
            notes
                .iter()
                .map(|n| (n.pitch, n.onset_tick, n.offset_tick))
                .collect()
        };
        assert_eq!(spans(&again.notes), spans(&song.notes));
        assert_eq!(again.context.time_signatures, song.context.time_signatures);
        assert_eq!(again.context.key_signatures, song.context.key_signatures);
        // Track 1 holds the first voice (channel 0 melody)
        assert_eq!(again.gold.voices().len(), 2);
    }
}
