use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog::store::{load_master_catalog, load_raw_catalog, save_master_catalog};
use crate::catalog::{MasterCatalog, RawCatalog, RawFrame, RawNote};
use crate::combine::{combine_dark, combine_flat, ChipOutcome, FlatParams};
use crate::config::SynthesisConfig;
use crate::error::Result;
use crate::identity::{Chip, FrameKind, Grouping, Identity};
use crate::io::store::FrameStore;
use crate::policy::purge_bad;

use super::plan::{new_identities, IdentityTask};
use super::progress::{ProgressReporter, SynthesisStage};
use super::report::{BatchReport, IdentityOutcome, SynthesisReport};

/// Raw dark notes eligible for combination.
pub const DARK_NOTES: &[RawNote] = &[RawNote::Good, RawNote::Lower, RawNote::Over];

/// Which master kinds a run synthesizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Target {
    Darks,
    Flats,
    #[default]
    All,
}

impl Target {
    pub fn includes(self, kind: FrameKind) -> bool {
        matches!(
            (self, kind),
            (Self::All, _) | (Self::Darks, FrameKind::Dark) | (Self::Flats, FrameKind::Flat)
        )
    }
}

/// Combine every new dark identity. The master catalog is only read.
pub fn synthesize_darks(
    raw: &RawCatalog,
    masters: &MasterCatalog,
    config: &SynthesisConfig,
    store: &dyn FrameStore,
    reporter: &dyn ProgressReporter,
) -> Result<BatchReport> {
    run_batch(
        raw,
        masters,
        Grouping::PerNight,
        config.worker_count,
        SynthesisStage::CombiningDarks,
        reporter,
        |identity, chip, frames| combine_dark(identity, chip, frames, store),
    )
}

/// Combine every new flat identity, selecting darks from `masters`.
pub fn synthesize_flats(
    raw: &RawCatalog,
    masters: &MasterCatalog,
    config: &SynthesisConfig,
    store: &dyn FrameStore,
    reporter: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let params = FlatParams {
        masters,
        selection: config.dark_selection,
        saturation_threshold: config.flats.saturation_threshold,
        quality_threshold: config.flats.quality_threshold,
        dome_marker: &config.flats.dome_marker,
    };
    run_batch(
        raw,
        masters,
        config.flats.grouping,
        config.worker_count,
        SynthesisStage::CombiningFlats,
        reporter,
        |identity, chip, frames| combine_flat(identity, chip, frames, store, &params),
    )
}

fn run_batch<F>(
    raw: &RawCatalog,
    masters: &MasterCatalog,
    grouping: Grouping,
    worker_count: Option<usize>,
    stage: SynthesisStage,
    reporter: &dyn ProgressReporter,
    combine: F,
) -> Result<BatchReport>
where
    F: Fn(&Identity, Chip, &[&RawFrame]) -> ChipOutcome + Sync,
{
    let kind = raw.kind();
    let identities = new_identities(raw, masters, grouping);
    info!(%kind, new = identities.len(), "New identities planned");
    if identities.is_empty() {
        return Ok(BatchReport::empty(kind));
    }

    let tasks: Vec<IdentityTask<'_>> = identities
        .into_iter()
        .map(|identity| IdentityTask::build(raw, identity))
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count.unwrap_or(0))
        .build()?;

    reporter.begin_stage(stage, Some(tasks.len()));
    let done = AtomicUsize::new(0);
    let outcomes: Vec<IdentityOutcome> = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| {
                let chips: Vec<ChipOutcome> = task
                    .chips
                    .iter()
                    .map(|(chip, frames)| combine(&task.identity, *chip, frames.as_slice()))
                    .collect();
                let outcome = IdentityOutcome {
                    identity: task.identity.clone(),
                    chips,
                };
                info!(
                    identity = %outcome.identity,
                    frames = task.frame_count(),
                    produced = outcome.produced().count(),
                    skipped = outcome.skipped().count(),
                    "Identity combined"
                );
                reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                outcome
            })
            .collect()
    });
    reporter.finish_stage();

    Ok(BatchReport { kind, outcomes })
}

/// Append a batch's new masters to the catalog, in identity then chip order.
/// Returns the number of records appended.
pub fn append_batch(masters: &mut MasterCatalog, batch: &BatchReport) -> Result<usize> {
    let mut appended = 0;
    for record in batch.produced() {
        masters.push(record.clone())?;
        appended += 1;
    }
    Ok(appended)
}

/// Run incremental synthesis: purge (when `redo_bad`), darks, then flats.
///
/// The master catalog is loaded once and written by this function alone,
/// after each batch that changed it.
pub fn run_synthesis(
    config: &SynthesisConfig,
    target: Target,
    store: &dyn FrameStore,
    reporter: &dyn ProgressReporter,
) -> Result<SynthesisReport> {
    config.validate()?;
    let catalog_path = &config.catalogs.masters;

    reporter.begin_stage(SynthesisStage::LoadingCatalogs, None);
    let mut masters = load_master_catalog(catalog_path)?;
    reporter.finish_stage();

    let mut dirty = false;
    let mut purged = Vec::new();
    if config.redo_bad {
        reporter.begin_stage(SynthesisStage::Purging, None);
        let outcome = purge_bad(masters);
        masters = outcome.catalog;
        dirty |= !outcome.purged.is_empty();
        purged = outcome.purged;
        reporter.finish_stage();
    }

    let mut rejected_rows = 0;

    let darks = if target.includes(FrameKind::Dark) {
        let (raw, ingest) = load_raw_catalog(&config.catalogs.darks, FrameKind::Dark, DARK_NOTES)?;
        rejected_rows += ingest.rejected.len();
        let batch = synthesize_darks(&raw, &masters, config, store, reporter)?;
        dirty |= append_batch(&mut masters, &batch)? > 0;
        batch
    } else {
        BatchReport::empty(FrameKind::Dark)
    };
    if dirty {
        write_catalog(catalog_path, &masters, reporter)?;
        dirty = false;
    }

    let flats = if target.includes(FrameKind::Flat) {
        let (raw, ingest) = load_raw_catalog(
            &config.catalogs.flats,
            FrameKind::Flat,
            &config.flats.accepted_notes,
        )?;
        rejected_rows += ingest.rejected.len();
        let batch = synthesize_flats(&raw, &masters, config, store, reporter)?;
        dirty |= append_batch(&mut masters, &batch)? > 0;
        batch
    } else {
        BatchReport::empty(FrameKind::Flat)
    };
    if dirty {
        write_catalog(catalog_path, &masters, reporter)?;
    }

    for master in flats.unresolved() {
        warn!(name = %master.name, "Master flat has no qualifying dark");
    }

    let report = SynthesisReport {
        purged,
        darks,
        flats,
        rejected_rows,
    };
    info!(
        new_darks = report.darks.identities(),
        new_flats = report.flats.identities(),
        produced = report.produced(),
        "Synthesis complete"
    );
    Ok(report)
}

fn write_catalog(
    path: &std::path::Path,
    masters: &MasterCatalog,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    reporter.begin_stage(SynthesisStage::WritingCatalog, None);
    save_master_catalog(path, masters)?;
    reporter.finish_stage();
    Ok(())
}
