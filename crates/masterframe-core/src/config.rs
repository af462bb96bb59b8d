use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::{DarkSelection, RawNote};
use crate::consts::{DEFAULT_DOME_MARKER, DEFAULT_QUALITY_THRESHOLD, DEFAULT_SATURATION_THRESHOLD};
use crate::error::{MasterError, Result};
use crate::identity::Grouping;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Root directory for master artifacts (`<root>/dark`, `<root>/flat`).
    pub save_location: PathBuf,
    #[serde(default)]
    pub catalogs: CatalogPaths,
    /// Worker threads; `None` uses one per core.
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default)]
    pub verbose: bool,
    /// Purge and redo flat identities whose dark selection failed.
    #[serde(default = "default_true")]
    pub redo_bad: bool,
    /// Gzip master artifacts after writing.
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default)]
    pub flats: FlatConfig,
    #[serde(default)]
    pub dark_selection: DarkSelection,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            save_location: PathBuf::from("master"),
            catalogs: CatalogPaths::default(),
            worker_count: None,
            verbose: false,
            redo_bad: true,
            compress: true,
            flats: FlatConfig::default(),
            dark_selection: DarkSelection::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == Some(0) {
            return Err(MasterError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        let tolerance = self.dark_selection.tolerance;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(MasterError::InvalidConfig(format!(
                "dark_selection.tolerance must be positive, got {tolerance}"
            )));
        }
        if self.flats.grouping.window_days() == 0 {
            return Err(MasterError::InvalidConfig(
                "trailing window must cover at least one night".into(),
            ));
        }
        let saturation = self.flats.saturation_threshold;
        if saturation.is_nan() || saturation <= 0.0 {
            return Err(MasterError::InvalidConfig(
                "flats.saturation_threshold must be positive".into(),
            ));
        }
        if self.flats.dome_marker.is_empty() {
            return Err(MasterError::InvalidConfig(
                "flats.dome_marker must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPaths {
    /// Raw dark frames, one row per exposure and chip.
    pub darks: PathBuf,
    /// Raw flat frames, one row per exposure and chip.
    pub flats: PathBuf,
    /// Master darks and flats.
    pub masters: PathBuf,
}

impl Default for CatalogPaths {
    fn default() -> Self {
        Self {
            darks: PathBuf::from("cal_lists/dark_list.csv"),
            flats: PathBuf::from("cal_lists/flat_list.csv"),
            masters: PathBuf::from("cal_lists/master_list.csv"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    pub grouping: Grouping,
    /// Pixel level (counts) above which a pixel counts as saturated.
    pub saturation_threshold: f32,
    /// Median level (counts) below which a master flat is bad.
    pub quality_threshold: f64,
    /// Field-name token of dome flats.
    pub dome_marker: String,
    /// Raw notes eligible for combination.
    pub accepted_notes: Vec<RawNote>,
}

impl Default for FlatConfig {
    fn default() -> Self {
        Self {
            grouping: Grouping::PerNight,
            saturation_threshold: DEFAULT_SATURATION_THRESHOLD,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            dome_marker: DEFAULT_DOME_MARKER.to_string(),
            accepted_notes: vec![RawNote::Good, RawNote::Lower, RawNote::Over],
        }
    }
}

fn default_true() -> bool {
    true
}
