//! Scoring a split against ground truth.
//!
//! A "link" is a pair of notes that are adjacent within one voice. A guessed
//! link is correct when the two notes are also adjacent within their true
//! voice. Precision and recall are computed over links, per song, then
//! averaged across songs.

use crate::chain::VoiceChain;
use crate::note::Note;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The true partition of a song's notes, one onset-ordered list per label.
#[derive(Debug, Clone, Default)]
pub struct GoldStandard {
    voices: Vec<Vec<Note>>,
    /// note id -> (voice index, position within voice)
    positions: HashMap<usize, (usize, usize)>,
}

impl GoldStandard {
    /// Partition notes by their `label`, labels in ascending order.
    pub fn from_notes(notes: &[Note]) -> Self {
        let mut by_label: BTreeMap<usize, Vec<Note>> = BTreeMap::new();
        for note in notes {
            by_label.entry(note.label).or_default().push(*note);
        }
        Self::from_voices(by_label.into_values().collect())
    }

    /// Use the given voices as-is (each is sorted by onset first).
    pub fn from_voices(mut voices: Vec<Vec<Note>>) -> Self {
        let mut positions = HashMap::new();
        for (voice_index, voice) in voices.iter_mut().enumerate() {
            voice.sort_by(|a, b| {
                a.onset_micros
                    .cmp(&b.onset_micros)
                    .then(a.pitch.cmp(&b.pitch))
                    .then(a.id.cmp(&b.id))
            });
            for (position, note) in voice.iter().enumerate() {
                positions.insert(note.id, (voice_index, position));
            }
        }
        Self { voices, positions }
    }

    pub fn voices(&self) -> &[Vec<Note>] {
        &self.voices
    }

    /// Number of adjacent pairs across all true voices.
    pub fn link_count(&self) -> usize {
        self.voices.iter().map(|v| v.len().saturating_sub(1)).sum()
    }

    /// Whether `later` directly follows `earlier` in the same true voice.
    pub fn is_true_link(&self, earlier: &Note, later: &Note) -> bool {
        match (self.positions.get(&earlier.id), self.positions.get(&later.id)) {
            (Some(&(voice_a, pos_a)), Some(&(voice_b, pos_b))) => {
                voice_a == voice_b && pos_a + 1 == pos_b
            }
            _ => false,
        }
    }
}

/// Link counts and derived scores for one song.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongScore {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean over guessed voices of the share of notes carrying the
    /// voice's majority label.
    pub voice_consistency: f64,
}

/// Compare guessed voices with the truth.
pub fn evaluate(voices: &[Arc<VoiceChain>], gold: &GoldStandard) -> SongScore {
    let mut true_positives = 0;
    let mut false_positives = 0;
    let mut consistency_sum = 0.0;

    for voice in voices {
        let len = voice.len();
        let correct = voice.link_correctness(gold);
        true_positives += correct;
        false_positives += len.saturating_sub(1).saturating_sub(correct);
        consistency_sum += voice.majority_label_count() as f64 / len as f64;
    }

    let false_negatives = gold.link_count().saturating_sub(true_positives);
    let precision = ratio(true_positives, true_positives + false_positives);
    let recall = ratio(true_positives, true_positives + false_negatives);
    let voice_consistency = if voices.is_empty() {
        0.0
    } else {
        consistency_sum / voices.len() as f64
    };

    SongScore {
        true_positives,
        false_positives,
        false_negatives,
        precision,
        recall,
        f1: f1_score(precision, recall),
        voice_consistency,
    }
}

/// Averages across songs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub songs: usize,
    pub precision: f64,
    pub recall: f64,
    /// F1 of the mean precision and mean recall.
    pub f1: f64,
    pub voice_consistency: f64,
}

pub fn aggregate(scores: &[SongScore]) -> EvaluationReport {
    if scores.is_empty() {
        return EvaluationReport::default();
    }
    let count = scores.len() as f64;
    let precision = scores.iter().map(|s| s.precision).sum::<f64>() / count;
    let recall = scores.iter().map(|s| s.recall).sum::<f64>() / count;
    let voice_consistency = scores.iter().map(|s| s.voice_consistency).sum::<f64>() / count;

    EvaluationReport {
        songs: scores.len(),
        precision,
        recall,
        f1: f1_score(precision, recall),
        voice_consistency,
    }
}

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
