use crate::catalog::{MasterCatalog, RawCatalog, RawFrame};
use crate::identity::{Chip, Grouping, Identity};

/// Identities present in the raw catalog but not yet mastered, newest first.
///
/// This is a plain set difference: an identity already in the master catalog
/// is never reprocessed unless it was purged first.
pub fn new_identities(
    raw: &RawCatalog,
    masters: &MasterCatalog,
    grouping: Grouping,
) -> Vec<Identity> {
    let mastered = masters.identities(raw.kind());
    let mut new: Vec<Identity> = raw
        .identities(grouping)
        .into_iter()
        .filter(|id| !mastered.contains(id))
        .collect();
    new.sort_by_key(|id| std::cmp::Reverse(id.encode()));
    new
}

/// Immutable work unit for one identity: its raw frames split by chip.
#[derive(Clone, Debug)]
pub struct IdentityTask<'a> {
    pub identity: Identity,
    /// One entry per chip of the mosaic, chips in ascending order.
    pub chips: Vec<(Chip, Vec<&'a RawFrame>)>,
}

impl<'a> IdentityTask<'a> {
    pub fn build(raw: &'a RawCatalog, identity: Identity) -> Self {
        let members = raw.members(&identity);
        let chips = Chip::all()
            .map(|chip| {
                let frames = members.iter().copied().filter(|f| f.chip == chip).collect();
                (chip, frames)
            })
            .collect();
        Self { identity, chips }
    }

    pub fn frame_count(&self) -> usize {
        self.chips.iter().map(|(_, frames)| frames.len()).sum()
    }
}
