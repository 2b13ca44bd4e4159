//! Text output for run, extract, and tune.

use crate::runner::Decoded;
use voice_split::{EvaluationReport, ModelParameters, Note};

pub fn song_line(decoded: &Decoded) -> String {
    let s = &decoded.score;
    format!(
        "{}: voices={} P={:.4} R={:.4} F1={:.4} V={:.4} (tp={} fp={} fn={})",
        decoded.name,
        decoded.voices.len(),
        s.precision,
        s.recall,
        s.f1,
        s.voice_consistency,
        s.true_positives,
        s.false_positives,
        s.false_negatives,
    )
}

/// One line per voice: consistent notes over total notes.
pub fn voice_lines(decoded: &Decoded) -> Vec<String> {
    decoded
        .voices
        .iter()
        .zip(&decoded.consistent_counts)
        .enumerate()
        .map(|(index, (voice, consistent))| {
            format!("  voice {}: {}/{} notes", index + 1, consistent, voice.len())
        })
        .collect()
}

pub fn summary_line(params: &ModelParameters, report: &EvaluationReport) -> String {
    format!(
        "{} = V={:.4} P={:.4} R={:.4} F1={:.4} over {} songs",
        params, report.voice_consistency, report.precision, report.recall, report.f1, report.songs,
    )
}

/// `songID voiceID onsetMicros offsetMicros pitch velocity`, in onset
/// order across voices. Voice ids count from 1, lowest voice first.
pub fn extract_lines(song_index: usize, voices: &[Vec<Note>]) -> Vec<String> {
    let mut rows: Vec<(usize, &Note)> = voices
        .iter()
        .enumerate()
        .flat_map(|(index, voice)| voice.iter().map(move |note| (index + 1, note)))
        .collect();
    rows.sort_by_key(|(voice, note)| (note.onset_micros, *voice, note.pitch));

    rows.into_iter()
        .map(|(voice, note)| {
            format!(
                "{} {} {} {} {} {}",
                song_index, voice, note.onset_micros, note.offset_micros, note.pitch, note.velocity
            )
        })
        .collect()
}
