//! Quality classification of masters and the purge-and-redo rule.

use std::collections::BTreeSet;

use ndarray::Array2;
use tracing::info;

use crate::catalog::{FlatKind, MasterCatalog, Quality, RawNote};
use crate::consts::{MIN_DARK_FRAMES, MIN_DOME_FLAT_FRAMES, RAW_FLAT_LOWER_LIMIT, RAW_FLAT_OVER_LIMIT};
use crate::identity::Identity;
use crate::stack::mean::nan_sum;
use crate::stack::median::nan_median;

/// A master dark needs at least three contributing frames.
pub fn classify_dark(source_count: usize) -> Quality {
    if source_count < MIN_DARK_FRAMES {
        Quality::Bad
    } else {
        Quality::Good
    }
}

/// Brightness summary of a combined flat plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatStats {
    /// Median of the finite pixels, `None` when every pixel is NaN.
    pub median: Option<f64>,
    /// Sum of the finite pixels.
    pub sum: f64,
}

impl FlatStats {
    pub fn of(plane: &Array2<f32>) -> Self {
        Self {
            median: nan_median(plane.iter().copied()),
            sum: nan_sum(plane.iter().copied()),
        }
    }
}

/// A master flat is bad when it is too faint, has no positive signal, or is
/// a dome flat built from a single frame.
pub fn classify_flat(
    stats: &FlatStats,
    source_count: usize,
    kind: FlatKind,
    quality_threshold: f64,
) -> Quality {
    let too_faint = stats.median.map_or(true, |m| m < quality_threshold);
    let no_signal = stats.sum <= 0.0;
    let thin_dome = kind == FlatKind::Dome && source_count < MIN_DOME_FLAT_FRAMES;
    if too_faint || no_signal || thin_dome {
        Quality::Bad
    } else {
        Quality::Good
    }
}

/// Dome flats carry the marker token in their field name.
pub fn flat_kind_of(field: Option<&str>, dome_marker: &str) -> FlatKind {
    match field {
        Some(f) if f.contains(dome_marker) => FlatKind::Dome,
        _ => FlatKind::Sky,
    }
}

/// Grade a raw flat exposure by its median level.
pub fn grade_raw_flat(median: f64) -> RawNote {
    if median < RAW_FLAT_LOWER_LIMIT {
        RawNote::Lower
    } else if median > RAW_FLAT_OVER_LIMIT {
        RawNote::Over
    } else {
        RawNote::Good
    }
}

/// Catalog left after a purge, plus the identities that were dropped.
#[derive(Clone, Debug)]
pub struct PurgeOutcome {
    pub catalog: MasterCatalog,
    pub purged: Vec<Identity>,
}

/// Drop every record of each identity with at least one flat whose dark
/// selection failed, so the whole identity is synthesized again.
pub fn purge_bad(mut catalog: MasterCatalog) -> PurgeOutcome {
    let doomed: BTreeSet<Identity> = catalog
        .records()
        .iter()
        .filter(|r| r.missing_dark())
        .map(|r| r.identity().clone())
        .collect();

    if !doomed.is_empty() {
        let before = catalog.len();
        catalog.retain(|r| !doomed.contains(r.identity()));
        info!(
            identities = doomed.len(),
            records = before - catalog.len(),
            "Purged masters without a qualifying dark"
        );
    }

    PurgeOutcome {
        catalog,
        purged: doomed.into_iter().collect(),
    }
}
