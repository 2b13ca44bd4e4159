use crate::chain::VoiceChain;
use crate::expand::{BeamExpander, Deadline};
use crate::hypothesis::{Beam, Hypothesis};
use crate::note::{onset_groups, Note};
use crate::params::{ModelParameters, SearchLimits};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters for the degradations the search tolerates silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Onset groups that went through expansion.
    pub steps: usize,
    /// Onset groups ignored because the beam was over the safety cap.
    pub skipped_steps: usize,
    /// Parent expansions cut short by the time budget.
    pub aborted_expansions: usize,
    /// Children produced before merging, across all steps.
    pub children_generated: usize,
}

/// Beam-search driver: feeds onset groups through the beam one at a time.
#[derive(Debug, Clone)]
pub struct VoiceSplitter {
    params: ModelParameters,
    limits: SearchLimits,
    beam: Vec<Hypothesis>,
    stats: SearchStats,
}

impl VoiceSplitter {
    pub fn new(params: ModelParameters) -> Result<Self> {
        Self::with_limits(params, SearchLimits::default())
    }

    pub fn with_limits(params: ModelParameters, limits: SearchLimits) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            limits,
            beam: vec![Hypothesis::initial()],
            stats: SearchStats::default(),
        })
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Current beam, best first.
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.beam
    }

    /// Advance the beam by one onset group.
    ///
    /// Groups must arrive in nondecreasing onset order. When the beam is
    /// already over the safety cap the group is skipped and the beam is
    /// left as it was.
    pub fn step(&mut self, group: &[Note]) {
        if group.is_empty() {
            return;
        }

        if self.beam.len() > self.limits.beam_safety_cap {
            warn!(
                beam = self.beam.len(),
                cap = self.limits.beam_safety_cap,
                onset_micros = group[0].onset_micros,
                "beam over safety cap, skipping onset group"
            );
            self.stats.skipped_steps += 1;
            return;
        }

        let deadline = Deadline::after(self.limits.expansion_budget);
        let expander = BeamExpander::new(&self.params);

        // Parents share nothing mutable; results come back in beam order.
        let expansions: Vec<_> = self
            .beam
            .par_iter()
            .map(|parent| expander.expand(group, parent, &deadline))
            .collect();

        let mut next = Beam::new(self.params.beam_width);
        let mut generated = 0;
        let mut aborted = 0;
        for expansion in expansions {
            generated += expansion.children.len();
            if expansion.aborted {
                aborted += 1;
            }
            next.extend(expansion.children);
        }

        if aborted > 0 {
            warn!(
                aborted,
                group_size = group.len(),
                onset_micros = group[0].onset_micros,
                "expansion time budget exceeded, keeping partial results"
            );
        }
        debug!(
            group_size = group.len(),
            parents = self.beam.len(),
            generated,
            kept = next.len(),
            "beam step"
        );

        self.stats.steps += 1;
        self.stats.children_generated += generated;
        self.stats.aborted_expansions += aborted;
        self.beam = next.into_vec();
    }

    /// Feed every group in order.
    pub fn run<I, G>(&mut self, groups: I)
    where
        I: IntoIterator<Item = G>,
        G: AsRef<[Note]>,
    {
        for group in groups {
            self.step(group.as_ref());
        }
    }

    /// The top hypothesis, or [`Error::EmptyBeam`] if the search collapsed.
    pub fn best_hypothesis(&self) -> Result<&Hypothesis> {
        self.beam.first().ok_or(Error::EmptyBeam)
    }

    /// Voices of the top hypothesis, lowest first.
    pub fn best_assignment(&self) -> Result<&[Arc<VoiceChain>]> {
        self.best_hypothesis().map(Hypothesis::voices)
    }
}

/// Split a flat note list into voices in one call.
pub fn split_voices(
    notes: &[Note],
    params: &ModelParameters,
    limits: &SearchLimits,
) -> Result<(Hypothesis, SearchStats)> {
    let mut splitter = VoiceSplitter::with_limits(params.clone(), limits.clone())?;
    splitter.run(onset_groups(notes));
    let best = splitter.best_hypothesis()?.clone();
    Ok((best, splitter.stats))
}
