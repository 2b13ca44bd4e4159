use crate::chain::VoiceChain;
use crate::note::Note;
use std::cmp::Ordering;
use std::sync::Arc;

/// One candidate assignment: every voice so far and its cumulative score.
///
/// Hypotheses order best-first: higher log-probability sorts earlier, and
/// among equal scores the one with fewer voices wins. Equality is equality
/// of rank, not of content.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    voices: Vec<Arc<VoiceChain>>,
    score: f64,
}

impl Hypothesis {
    /// The search start: no voices, score 0.
    pub fn initial() -> Self {
        Self {
            voices: Vec::new(),
            score: 0.0,
        }
    }

    pub fn new(voices: Vec<Arc<VoiceChain>>, score: f64) -> Self {
        Self { voices, score }
    }

    pub fn voices(&self) -> &[Arc<VoiceChain>] {
        &self.voices
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Each voice's notes in temporal order, voices lowest first.
    pub fn voice_notes(&self) -> Vec<Vec<Note>> {
        self.voices.iter().map(|voice| voice.notes()).collect()
    }
}

impl Ord for Hypothesis {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.voices.len().cmp(&other.voices.len()))
    }
}

impl PartialOrd for Hypothesis {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Hypothesis {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hypothesis {}

/// Best-first list holding at most `width` hypotheses.
///
/// Inserting keeps the list sorted; a newcomer lands after anything it
/// ties with, so earlier arrivals win ties.
#[derive(Debug, Clone)]
pub struct Beam {
    width: usize,
    entries: Vec<Hypothesis>,
}

impl Beam {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            entries: Vec::with_capacity(width.min(1024)),
        }
    }

    pub fn insert(&mut self, hypothesis: Hypothesis) {
        let at = self.entries.partition_point(|entry| entry <= &hypothesis);
        if at >= self.width {
            return;
        }
        self.entries.insert(at, hypothesis);
        self.entries.truncate(self.width);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> Option<&Hypothesis> {
        self.entries.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hypothesis> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Hypothesis> {
        self.entries
    }
}

impl Extend<Hypothesis> for Beam {
    fn extend<I: IntoIterator<Item = Hypothesis>>(&mut self, iter: I) {
        for hypothesis in iter {
            self.insert(hypothesis);
        }
    }
}
