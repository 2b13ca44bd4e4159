use serde::{Deserialize, Serialize};

/// A closed note with absolute timing.
///
/// Times are microseconds from the start of the song, already resolved
/// from ticks by the note source. Ticks are carried along so voices can
/// be written back out at their original positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    /// Position of the note in its song's sorted note list.
    pub id: usize,
    pub pitch: u8,
    pub velocity: u8,
    pub onset_micros: u64,
    pub onset_tick: u64,
    pub offset_micros: u64,
    pub offset_tick: u64,
    /// Ground-truth voice (channel or track). Only evaluation reads this.
    pub label: usize,
}

impl Note {
    pub fn duration_micros(&self) -> u64 {
        self.offset_micros.saturating_sub(self.onset_micros)
    }

    pub fn duration_ticks(&self) -> u64 {
        self.offset_tick.saturating_sub(self.onset_tick)
    }
}

/// Group notes sharing an identical onset time, in onset order.
///
/// Within a group notes are ordered by pitch (then id) so that repeated
/// runs over the same input visit assignments in the same order.
pub fn onset_groups(notes: &[Note]) -> Vec<Vec<Note>> {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| {
        a.onset_micros
            .cmp(&b.onset_micros)
            .then(a.pitch.cmp(&b.pitch))
            .then(a.id.cmp(&b.id))
    });

    let mut groups: Vec<Vec<Note>> = Vec::new();
    for note in sorted {
        match groups.last_mut() {
            Some(group) if group.last().map(|n| n.onset_micros) == Some(note.onset_micros) => {
                group.push(note)
            }
            _ => groups.push(vec![note]),
        }
    }
    groups
}

#[cfg(test)]
pub(crate) fn test_note(id: usize, pitch: u8, onset_micros: u64, offset_micros: u64) -> Note {
    Note {
        id,
        pitch,
        velocity: 100,
        onset_micros,
        onset_tick: onset_micros / 1000,
        offset_micros,
        offset_tick: offset_micros / 1000,
        label: 0,
    }
}
