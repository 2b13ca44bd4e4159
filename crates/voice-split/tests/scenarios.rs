//! End-to-end splitting scenarios on small hand-built songs.
//!
//! Times use 480 ticks per quarter at 120 BPM, so one quarter note is
//! 500 000 microseconds.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use voice_split::{
    evaluate, split_voices, GoldStandard, ModelParameters, Note, SearchLimits, VoiceSplitter,
    FORBIDDEN_SCORE,
};

const PPQ: u64 = 480;
const MICROS_PER_QUARTER: u64 = 500_000;

fn tick_note(id: usize, pitch: u8, onset_tick: u64, duration_ticks: u64, label: usize) -> Note {
    let offset_tick = onset_tick + duration_ticks;
    Note {
        id,
        pitch,
        velocity: 100,
        onset_micros: onset_tick * MICROS_PER_QUARTER / PPQ,
        onset_tick,
        offset_micros: offset_tick * MICROS_PER_QUARTER / PPQ,
        offset_tick,
        label,
    }
}

fn split(notes: &[Note]) -> Vec<Vec<u8>> {
    let (best, _) = split_voices(notes, &ModelParameters::default(), &SearchLimits::default())
        .expect("search should not collapse");
    best.voice_notes()
        .iter()
        .map(|voice| voice.iter().map(|n| n.pitch).collect())
        .collect()
}

#[test]
fn simultaneous_notes_open_one_voice_each() {
    let notes = vec![tick_note(0, 60, 0, 480, 0), tick_note(1, 72, 0, 480, 1)];
    assert_eq!(split(&notes), vec![vec![60], vec![72]]);
}

#[test]
fn stepwise_line_stays_in_one_voice() {
    let notes = vec![
        tick_note(0, 60, 0, 480, 0),
        tick_note(1, 61, 480, 480, 0),
        tick_note(2, 62, 960, 480, 0),
    ];
    assert_eq!(split(&notes), vec![vec![60, 61, 62]]);
}

#[test]
fn two_lines_keep_their_registers() {
    let notes = vec![
        tick_note(0, 60, 0, 480, 0),
        tick_note(1, 72, 0, 480, 1),
        tick_note(2, 62, 480, 480, 0),
        tick_note(3, 70, 480, 480, 1),
    ];
    assert_eq!(split(&notes), vec![vec![60, 62], vec![72, 70]]);
}

#[test]
fn split_of_two_lines_scores_perfectly() {
    let notes = vec![
        tick_note(0, 48, 0, 480, 1),
        tick_note(1, 67, 0, 240, 0),
        tick_note(2, 69, 240, 240, 0),
        tick_note(3, 50, 480, 480, 1),
        tick_note(4, 71, 480, 480, 0),
        tick_note(5, 52, 960, 480, 1),
        tick_note(6, 72, 960, 480, 0),
    ];
    let mut splitter = VoiceSplitter::new(ModelParameters::default()).unwrap();
    splitter.run(voice_split::onset_groups(&notes));

    let gold = GoldStandard::from_notes(&notes);
    let score = evaluate(splitter.best_assignment().unwrap(), &gold);
    assert_eq!(score.true_positives, 5);
    assert_eq!(score.f1, 1.0);
}

#[test]
fn repeated_runs_are_identical() {
    let notes: Vec<Note> = (0..24)
        .map(|i| {
            let pitch = [60u8, 64, 67, 72][i % 4] + (i / 8) as u8;
            tick_note(i, pitch, (i as u64 / 2) * 240, 240 + (i as u64 % 3) * 120, 0)
        })
        .collect();

    let run = || {
        let (best, stats) =
            split_voices(&notes, &ModelParameters::default(), &SearchLimits::default()).unwrap();
        let ids: Vec<Vec<usize>> = best
            .voice_notes()
            .iter()
            .map(|voice| voice.iter().map(|n| n.id).collect())
            .collect();
        (best.score(), ids, stats)
    };

    let first = run();
    let second = run();
    assert_eq!(first.0.to_bits(), second.0.to_bits());
    assert_eq!(first.1, second.1);
    assert_eq!(first.2, second.2);
}

#[test]
fn forbidden_links_never_reach_the_best_hypothesis() {
    // A tiny pitch deviation makes any pitch change impossible to continue
    let params = ModelParameters {
        pitch_std: 1e-3,
        ..Default::default()
    };
    let notes = vec![
        tick_note(0, 30, 0, 480, 0),
        tick_note(1, 110, 480, 480, 0),
        tick_note(2, 110, 960, 480, 0),
    ];

    let (best, _) = split_voices(&notes, &params, &SearchLimits::default()).unwrap();
    assert!(best.score() > FORBIDDEN_SCORE);
    let pitches: Vec<Vec<u8>> = best
        .voice_notes()
        .iter()
        .map(|voice| voice.iter().map(|n| n.pitch).collect())
        .collect();
    assert_eq!(pitches, vec![vec![30], vec![110, 110]]);
}

/// (pitch offset within the register, length in eighth notes)
fn track() -> impl Strategy<Value = Vec<(u8, u64)>> {
    prop::collection::vec((0u8..=4, 1u64..=3), 1..10)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn recovers_pitch_separated_tracks(tracks in prop::collection::vec(track(), 1..=3)) {
        let mut notes = Vec::new();
        let mut expected = Vec::new();
        for (label, track) in tracks.iter().enumerate() {
            let register = 36 + 24 * label as u8;
            let mut onset = 0;
            let mut ids = Vec::new();
            for &(offset, length) in track {
                let id = notes.len();
                notes.push(tick_note(id, register + offset, onset * 240, length * 240, label));
                ids.push(id);
                onset += length;
            }
            expected.push(ids);
        }

        let params = ModelParameters::default();
        let mut splitter = VoiceSplitter::new(params.clone()).unwrap();
        for group in voice_split::onset_groups(&notes) {
            splitter.step(&group);
            prop_assert!(splitter.hypotheses().len() <= params.beam_width);
        }

        let best = splitter.best_hypothesis().unwrap();
        let got: Vec<Vec<usize>> = best
            .voice_notes()
            .iter()
            .map(|voice| voice.iter().map(|n| n.id).collect())
            .collect();
        prop_assert_eq!(got, expected);
    }
}
