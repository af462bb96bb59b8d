//! Per-chip master synthesis: load, mask, subtract dark, combine, classify, write.

use std::fmt;

use tracing::{debug, warn};

use crate::catalog::{
    DarkMatch, DarkProvenance, DarkQuery, DarkSelection, MasterCatalog, MasterFrame, RawFrame,
};
use crate::consts::NO_DARK_TIME_DIFF;
use crate::error::Result;
use crate::frame::{Frame, MasterMetadata};
use crate::identity::{Chip, Identity, MasterName};
use crate::io::store::FrameStore;
use crate::policy::{classify_dark, classify_flat, flat_kind_of, FlatStats};
use crate::stack::mask::mask_saturated;
use crate::stack::{combine_planes, Statistic};

/// Why a chip of an identity produced no master.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// The raw catalog has no frame for this chip.
    NoFrames,
    /// None of the chip's frames could be read.
    Unreadable { frames: usize },
    /// Every readable frame was saturation-masked.
    AllMasked { frames: usize },
    /// Combination or writing failed.
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFrames => write!(f, "no raw frames"),
            Self::Unreadable { frames } => write!(f, "{frames} frame(s) unreadable"),
            Self::AllMasked { frames } => write!(f, "{frames} frame(s) saturated"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Result of synthesizing one chip of one identity.
#[derive(Clone, Debug)]
pub enum ChipOutcome {
    Produced(MasterFrame),
    Skipped { chip: Chip, reason: SkipReason },
}

impl ChipOutcome {
    pub fn chip(&self) -> Chip {
        match self {
            Self::Produced(m) => m.chip,
            Self::Skipped { chip, .. } => *chip,
        }
    }
}

/// Parameters for flat synthesis that do not vary between chips.
#[derive(Clone, Copy, Debug)]
pub struct FlatParams<'a> {
    /// Snapshot of the master catalog used for dark selection.
    pub masters: &'a MasterCatalog,
    pub selection: DarkSelection,
    pub saturation_threshold: f32,
    pub quality_threshold: f64,
    pub dome_marker: &'a str,
}

/// Value-plane statistic for an identity: mean for trailing windows, median otherwise.
pub fn statistic_for(identity: &Identity) -> Statistic {
    match identity {
        Identity::Flat {
            window: Some(_), ..
        } => Statistic::Mean,
        _ => Statistic::Median,
    }
}

/// Combine the raw darks of one chip into a master dark.
pub fn combine_dark(
    identity: &Identity,
    chip: Chip,
    raws: &[&RawFrame],
    store: &dyn FrameStore,
) -> ChipOutcome {
    try_combine_dark(identity, chip, raws, store).unwrap_or_else(|e| failed(identity, chip, e))
}

/// Combine the raw flats of one chip into a master flat.
pub fn combine_flat(
    identity: &Identity,
    chip: Chip,
    raws: &[&RawFrame],
    store: &dyn FrameStore,
    params: &FlatParams<'_>,
) -> ChipOutcome {
    try_combine_flat(identity, chip, raws, store, params)
        .unwrap_or_else(|e| failed(identity, chip, e))
}

fn try_combine_dark(
    identity: &Identity,
    chip: Chip,
    raws: &[&RawFrame],
    store: &dyn FrameStore,
) -> Result<ChipOutcome> {
    if raws.is_empty() {
        return Ok(skip(chip, SkipReason::NoFrames));
    }
    let (frames, used) = load_frames(raws, store);
    if frames.is_empty() {
        return Ok(skip(chip, SkipReason::Unreadable { frames: raws.len() }));
    }

    let planes = combine_planes(&frames, statistic_for(identity))?;
    let name = MasterName::new(identity.clone(), chip);
    let source_count = frames.len();
    let exposure_time = identity.exposure_time().unwrap_or(used[0].exposure_time);
    let date = frames[0].date_obs().map(str::to_string);
    let metadata = MasterMetadata {
        chip: chip.number(),
        exposure_time,
        jd: mean_jd(&used),
        source_count,
        source_header: frames[0].header.clone(),
        ..Default::default()
    };
    let file = store.save_master(&name, &planes, &metadata)?;
    debug!(name = %name, source_count, "Master dark combined");

    Ok(ChipOutcome::Produced(MasterFrame {
        name,
        chip,
        band: None,
        exposure_time,
        jd: metadata.jd,
        date,
        file,
        source_count,
        note: classify_dark(source_count),
        flat: None,
    }))
}

fn try_combine_flat(
    identity: &Identity,
    chip: Chip,
    raws: &[&RawFrame],
    store: &dyn FrameStore,
    params: &FlatParams<'_>,
) -> Result<ChipOutcome> {
    let Some(representative) = raws.first() else {
        return Ok(skip(chip, SkipReason::NoFrames));
    };
    let (mut frames, used) = load_frames(raws, store);
    if frames.is_empty() {
        return Ok(skip(chip, SkipReason::Unreadable { frames: raws.len() }));
    }

    // Masked frames stay in the stack as NaN and still count as sources.
    for (frame, raw) in frames.iter_mut().zip(&used) {
        if mask_saturated(frame, params.saturation_threshold) {
            debug!(frame = %raw.name, "Saturated frame masked");
        }
    }
    if !frames.iter().any(Frame::has_finite) {
        return Ok(skip(
            chip,
            SkipReason::AllMasked {
                frames: raws.len(),
            },
        ));
    }

    let query = DarkQuery {
        jd: representative.jd,
        exposure_time: representative.exposure_time,
        chip,
    };
    let dark = subtract_dark(
        &mut frames,
        params.masters.select_dark(&query, &params.selection),
        store,
    );
    if dark.is_none() {
        warn!(identity = %identity, chip = chip.number(), "No dark found, flat left unsubtracted");
    }

    let planes = combine_planes(&frames, statistic_for(identity))?;
    let name = MasterName::new(identity.clone(), chip);
    let source_count = frames.len();
    let date = frames[0].date_obs().map(str::to_string);
    let field = representative.field.clone();
    let flat_kind = flat_kind_of(field.as_deref(), params.dome_marker);
    let stats = FlatStats::of(&planes.value);
    let note = classify_flat(&stats, source_count, flat_kind, params.quality_threshold);
    let (dark_file, time_diff) = match dark {
        Some((file, diff)) => (Some(file), diff),
        None => (None, NO_DARK_TIME_DIFF),
    };

    let metadata = MasterMetadata {
        chip: chip.number(),
        exposure_time: representative.exposure_time,
        jd: mean_jd(&used),
        source_count,
        band: representative.band.clone(),
        field: field.clone(),
        dark_time_diff: Some(time_diff),
        source_header: frames[0].header.clone(),
    };
    let file = store.save_master(&name, &planes, &metadata)?;
    debug!(
        name = %name,
        source_count,
        median = stats.median,
        note = %note,
        "Master flat combined"
    );

    Ok(ChipOutcome::Produced(MasterFrame {
        name,
        chip,
        band: representative.band.clone(),
        exposure_time: representative.exposure_time,
        jd: metadata.jd,
        date,
        file,
        source_count,
        note,
        flat: Some(DarkProvenance {
            file: dark_file,
            time_diff,
            field,
            flat_kind,
        }),
    }))
}

/// Subtract the matched master dark from every frame. Returns the dark file
/// and time difference, or `None` when no usable dark exists.
fn subtract_dark(
    frames: &mut [Frame],
    matched: DarkMatch,
    store: &dyn FrameStore,
) -> Option<(std::path::PathBuf, f64)> {
    let DarkMatch::Found {
        file, time_diff, ..
    } = matched
    else {
        return None;
    };

    let dark = match store.load(&file) {
        Ok(dark) => dark,
        Err(e) => {
            warn!(dark = %file.display(), error = %e, "Master dark unreadable");
            return None;
        }
    };
    if frames.iter().any(|f| f.dim() != dark.dim()) {
        warn!(dark = %file.display(), shape = ?dark.dim(), "Master dark shape mismatch");
        return None;
    }

    for frame in frames.iter_mut() {
        frame.data -= &dark.data;
    }
    debug!(dark = %file.display(), time_diff, "Dark subtracted");
    Some((file, time_diff))
}

/// Load raw frames, dropping unreadable ones and ones whose shape differs
/// from the first readable frame.
fn load_frames<'a>(
    raws: &[&'a RawFrame],
    store: &dyn FrameStore,
) -> (Vec<Frame>, Vec<&'a RawFrame>) {
    let mut frames: Vec<Frame> = Vec::with_capacity(raws.len());
    let mut used = Vec::with_capacity(raws.len());

    for &raw in raws {
        match store.load(&raw.file) {
            Ok(frame) => {
                if let Some(first) = frames.first() {
                    if first.dim() != frame.dim() {
                        warn!(
                            frame = %raw.name,
                            expected = ?first.dim(),
                            actual = ?frame.dim(),
                            "Raw frame shape differs, excluded"
                        );
                        continue;
                    }
                }
                frames.push(frame);
                used.push(raw);
            }
            Err(e) => warn!(frame = %raw.name, file = %raw.file.display(), error = %e, "Raw frame unreadable, excluded"),
        }
    }
    (frames, used)
}

fn mean_jd(raws: &[&RawFrame]) -> f64 {
    raws.iter().map(|r| r.jd).sum::<f64>() / raws.len() as f64
}

fn skip(chip: Chip, reason: SkipReason) -> ChipOutcome {
    debug!(chip = chip.number(), reason = %reason, "Chip skipped");
    ChipOutcome::Skipped { chip, reason }
}

fn failed(identity: &Identity, chip: Chip, e: crate::error::MasterError) -> ChipOutcome {
    warn!(identity = %identity, chip = chip.number(), error = %e, "Chip synthesis failed");
    ChipOutcome::Skipped {
        chip,
        reason: SkipReason::Failed(e.to_string()),
    }
}
