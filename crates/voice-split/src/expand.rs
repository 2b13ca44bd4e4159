//! Expansion of one hypothesis by one onset group.
//!
//! Every legal way of assigning the group's notes to voices is enumerated
//! depth-first, one decision level per note. Branches mutate a scratch list
//! of voice heads and are reverted through an undo log, so only finished
//! assignments pay for a copy of the head list. The traversal uses an
//! explicit stack; large chords cannot exhaust the call stack.

use crate::chain::VoiceChain;
use crate::hypothesis::{Beam, Hypothesis};
use crate::note::Note;
use crate::params::ModelParameters;
use crate::score::arg_max_first;
use crate::transition::TransitionScorer;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A point in time after which expansion stops early.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(budget),
        }
    }

    pub fn never() -> Self {
        Self { expires_at: None }
    }

    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Children of one parent for one group.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Best-first, at most `beam_width` long.
    pub children: Vec<Hypothesis>,
    /// The deadline passed before every branch was explored.
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transition {
    /// Open a voice before `position`.
    NewVoice { position: usize },
    /// Extend the voice at `position`, which was the parent's voice `slot`.
    Extend { position: usize, slot: usize },
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    transition: Transition,
    log_prob: f64,
}

struct Frame {
    branches: Vec<Branch>,
    cursor: usize,
    score: f64,
    applied: bool,
}

impl Frame {
    fn new(branches: Vec<Branch>, score: f64) -> Self {
        Self {
            branches,
            cursor: 0,
            score,
            applied: false,
        }
    }
}

/// Voice heads under construction for one parent.
///
/// `origins[p]` is the parent voice the head at position `p` descends
/// from, or `None` for a voice opened within this group. `taken[slot]`
/// marks parent voices that already received a note from this group.
struct Scratch {
    heads: Vec<Arc<VoiceChain>>,
    origins: Vec<Option<usize>>,
    taken: Vec<bool>,
    undo_log: Vec<Transition>,
}

impl Scratch {
    fn new(parent: &Hypothesis) -> Self {
        let count = parent.voice_count();
        Self {
            heads: parent.voices().to_vec(),
            origins: (0..count).map(Some).collect(),
            taken: vec![false; count],
            undo_log: Vec::new(),
        }
    }

    fn apply(&mut self, transition: Transition, note: Note) {
        match transition {
            Transition::NewVoice { position } => {
                self.heads.insert(position, VoiceChain::start(note));
                self.origins.insert(position, None);
            }
            Transition::Extend { position, slot } => {
                let extended = self.heads[position].extend(note);
                self.heads[position] = extended;
                self.taken[slot] = true;
            }
        }
        self.undo_log.push(transition);
    }

    fn revert(&mut self) {
        let Some(transition) = self.undo_log.pop() else {
            return;
        };
        match transition {
            Transition::NewVoice { position } => {
                self.heads.remove(position);
                self.origins.remove(position);
            }
            Transition::Extend { position, slot } => {
                if let Some(previous) = self.heads[position].unextend().cloned() {
                    self.heads[position] = previous;
                }
                self.taken[slot] = false;
            }
        }
    }
}

pub struct BeamExpander<'a> {
    params: &'a ModelParameters,
    scorer: TransitionScorer<'a>,
}

impl<'a> BeamExpander<'a> {
    pub fn new(params: &'a ModelParameters) -> Self {
        Self {
            params,
            scorer: TransitionScorer::new(params),
        }
    }

    /// Enumerate the children of `parent` for `group`, keeping the best
    /// `beam_width`. Stops early, keeping what it has, once `deadline`
    /// passes.
    pub fn expand(&self, group: &[Note], parent: &Hypothesis, deadline: &Deadline) -> Expansion {
        self.expand_until(group, parent, || deadline.expired())
    }

    /// As [`expand`](Self::expand), polling `stop` before each branch.
    fn expand_until<F>(&self, group: &[Note], parent: &Hypothesis, mut stop: F) -> Expansion
    where
        F: FnMut() -> bool,
    {
        if group.is_empty() {
            return Expansion {
                children: vec![parent.clone()],
                aborted: false,
            };
        }

        let open = open_voice_slots(group, parent);
        let mut scratch = Scratch::new(parent);
        let mut children = Beam::new(self.params.beam_width);
        let mut aborted = false;

        let mut stack = vec![Frame::new(
            self.branches(&group[0], &open[0], &scratch),
            parent.score(),
        )];

        while !stack.is_empty() {
            let level = stack.len() - 1;
            let frame = &mut stack[level];

            if frame.applied {
                scratch.revert();
                frame.applied = false;
            }

            if stop() {
                aborted = true;
                break;
            }

            let Some(branch) = frame.branches.get(frame.cursor).copied() else {
                stack.pop();
                continue;
            };
            frame.cursor += 1;
            frame.applied = true;
            let score = frame.score + branch.log_prob;
            scratch.apply(branch.transition, group[level]);

            let next = level + 1;
            if next == group.len() {
                children.insert(Hypothesis::new(scratch.heads.clone(), score));
            } else {
                let branches = self.branches(&group[next], &open[next], &scratch);
                stack.push(Frame::new(branches, score));
            }
        }

        Expansion {
            children: children.into_vec(),
            aborted,
        }
    }

    /// Candidate transitions for `note` given the current scratch state.
    ///
    /// New voices only go where the new-voice score is maximal (every tied
    /// position is kept). Existing voices are any open parent voice not yet
    /// taken by an earlier note of this group, lowest position first.
    fn branches(&self, note: &Note, open: &[usize], scratch: &Scratch) -> Vec<Branch> {
        let heads = &scratch.heads;
        let mut branches = Vec::new();

        let new_voice: Vec<f64> = (0..=heads.len())
            .map(|position| self.scorer.score_new_voice(note, heads, position))
            .collect();
        if let Some(best) = arg_max_first(&new_voice) {
            let max = new_voice[best];
            for (position, &log_prob) in new_voice.iter().enumerate().skip(best) {
                if log_prob == max {
                    branches.push(Branch {
                        transition: Transition::NewVoice { position },
                        log_prob,
                    });
                }
            }
        }

        for (position, origin) in scratch.origins.iter().enumerate() {
            let Some(slot) = *origin else { continue };
            if scratch.taken[slot] || open.binary_search(&slot).is_err() {
                continue;
            }
            branches.push(Branch {
                transition: Transition::Extend { position, slot },
                log_prob: self.scorer.score_existing(note, heads, position),
            });
        }

        branches
    }
}

/// For each note, the parent voices it may extend, ascending.
///
/// Computed once per group against the group's shared onset time.
fn open_voice_slots(group: &[Note], parent: &Hypothesis) -> Vec<Vec<usize>> {
    let onset = group.first().map_or(0, |n| n.onset_micros);
    group
        .iter()
        .map(|note| {
            parent
                .voices()
                .iter()
                .enumerate()
                .filter(|(_, voice)| voice.can_accept_note_at(onset, note.duration_micros()))
                .map(|(slot, _)| slot)
                .collect()
        })
        .collect()
}
