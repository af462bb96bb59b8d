use crate::catalog::MasterFrame;
use crate::combine::{ChipOutcome, SkipReason};
use crate::identity::{FrameKind, Identity, MasterName};

/// Per-chip results of one identity task.
#[derive(Clone, Debug)]
pub struct IdentityOutcome {
    pub identity: Identity,
    pub chips: Vec<ChipOutcome>,
}

impl IdentityOutcome {
    pub fn produced(&self) -> impl Iterator<Item = &MasterFrame> {
        self.chips.iter().filter_map(|c| match c {
            ChipOutcome::Produced(m) => Some(m),
            ChipOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (MasterName, &SkipReason)> {
        self.chips.iter().filter_map(|c| match c {
            ChipOutcome::Skipped { chip, reason } => {
                Some((MasterName::new(self.identity.clone(), *chip), reason))
            }
            ChipOutcome::Produced(_) => None,
        })
    }
}

/// Outcome of one kind's batch (all new dark or flat identities).
#[derive(Clone, Debug)]
pub struct BatchReport {
    pub kind: FrameKind,
    pub outcomes: Vec<IdentityOutcome>,
}

impl BatchReport {
    pub fn empty(kind: FrameKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
        }
    }

    /// Identities that were attempted in this batch.
    pub fn identities(&self) -> usize {
        self.outcomes.len()
    }

    pub fn produced(&self) -> impl Iterator<Item = &MasterFrame> {
        self.outcomes.iter().flat_map(|o| o.produced())
    }

    pub fn skipped(&self) -> impl Iterator<Item = (MasterName, &SkipReason)> {
        self.outcomes.iter().flat_map(|o| o.skipped())
    }

    /// Flats recorded without a qualifying dark; candidates for a redo.
    pub fn unresolved(&self) -> impl Iterator<Item = &MasterFrame> {
        self.produced().filter(|m| m.missing_dark())
    }

    /// Identities for which nothing was written; they stay new for the next run.
    pub fn empty_identities(&self) -> impl Iterator<Item = &Identity> {
        self.outcomes
            .iter()
            .filter(|o| o.produced().next().is_none())
            .map(|o| &o.identity)
    }
}

/// Summary of a full synthesis run.
#[derive(Clone, Debug)]
pub struct SynthesisReport {
    /// Identities dropped by the purge-and-redo policy before planning.
    pub purged: Vec<Identity>,
    pub darks: BatchReport,
    pub flats: BatchReport,
    /// Raw catalog rows rejected at ingest.
    pub rejected_rows: usize,
}

impl SynthesisReport {
    pub fn produced(&self) -> usize {
        self.darks.produced().count() + self.flats.produced().count()
    }
}
