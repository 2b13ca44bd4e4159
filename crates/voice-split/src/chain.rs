//! Persistent voice histories.
//!
//! A voice is a singly-linked list of notes read newest-first. Extending a
//! voice allocates one node pointing at the old head, so every hypothesis in
//! the beam can share the history it has in common with its siblings.

use crate::eval::GoldStandard;
use crate::note::Note;
use crate::params::ModelParameters;
use std::collections::HashMap;
use std::sync::Arc;

/// One node of a voice: its most recent note and the voice before it.
#[derive(Debug)]
pub struct VoiceChain {
    note: Note,
    previous: Option<Arc<VoiceChain>>,
}

impl VoiceChain {
    /// Start a new voice containing a single note.
    pub fn start(note: Note) -> Arc<Self> {
        Arc::new(Self {
            note,
            previous: None,
        })
    }

    /// Append a note, returning the new head. The old head is untouched.
    pub fn extend(self: &Arc<Self>, note: Note) -> Arc<Self> {
        Arc::new(Self {
            note,
            previous: Some(Arc::clone(self)),
        })
    }

    /// The head this one was extended from, if any.
    ///
    /// Nothing is freed here; the unlinked node lives as long as some
    /// hypothesis still holds it.
    pub fn unextend(&self) -> Option<&Arc<Self>> {
        self.previous.as_ref()
    }

    pub fn most_recent_note(&self) -> &Note {
        &self.note
    }

    /// Notes from newest to oldest.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { next: Some(self) }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    // A chain always holds at least one note.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Notes in temporal order, oldest first.
    pub fn notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.iter().copied().collect();
        notes.reverse();
        notes
    }

    /// Weighted mean of the most recent pitches, each step back weighing
    /// half as much as the one after it.
    pub fn weighted_recent_pitch(&self, params: &ModelParameters) -> f64 {
        let mut weight = 1.0;
        let mut total_weight = 0.0;
        let mut sum = 0.0;
        for note in self.iter().take(params.pitch_history_length) {
            sum += note.pitch as f64 * weight;
            total_weight += weight;
            weight *= 0.5;
        }
        sum / total_weight
    }

    /// Whether a note starting at `onset_micros` and lasting
    /// `duration_micros` may follow this voice's most recent note.
    ///
    /// The overlap with the previous note must be at most half of that
    /// note's duration and strictly shorter than the candidate itself.
    pub fn can_accept_note_at(&self, onset_micros: u64, duration_micros: u64) -> bool {
        let recent = &self.note;
        let overlap = recent.offset_micros as i128 - onset_micros as i128;
        let half_recent = recent.duration_micros() as f64 / 2.0;
        overlap as f64 <= half_recent && overlap < duration_micros as i128
    }

    /// Count adjacent note pairs in this voice that are also adjacent in
    /// the ground-truth voice they belong to.
    pub fn link_correctness(&self, gold: &GoldStandard) -> usize {
        let mut count = 0;
        let mut node = self;
        while let Some(previous) = node.previous.as_deref() {
            if gold.is_true_link(&previous.note, &node.note) {
                count += 1;
            }
            node = previous;
        }
        count
    }

    /// Size of the largest group of notes sharing one true label.
    pub fn majority_label_count(&self) -> usize {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for note in self.iter() {
            *counts.entry(note.label).or_default() += 1;
        }
        counts.values().copied().max().unwrap_or(0)
    }
}

// Unlink iteratively so dropping a long voice cannot overflow the stack.
impl Drop for VoiceChain {
    fn drop(&mut self) {
        let mut previous = self.previous.take();
        while let Some(node) = previous {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => previous = inner.previous.take(),
                Err(_) => break,
            }
        }
    }
}

pub struct ChainIter<'a> {
    next: Option<&'a VoiceChain>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Note;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.previous.as_deref();
        Some(&node.note)
    }
}
