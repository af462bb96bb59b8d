use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_DARK_TOLERANCE, NO_DARK_TIME_DIFF};
use crate::error::{MasterError, Result};
use crate::identity::{Chip, FrameKind, Identity, MasterName};

/// Quality note of a master frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Bad,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

/// Light source of a master flat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatKind {
    Dome,
    Sky,
}

impl fmt::Display for FlatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dome => write!(f, "dome"),
            Self::Sky => write!(f, "sky"),
        }
    }
}

/// Provenance of the dark subtracted from a master flat.
#[derive(Clone, Debug, PartialEq)]
pub struct DarkProvenance {
    /// `None` when no dark qualified.
    pub file: Option<PathBuf>,
    /// Signed time difference (flat - dark) in days, or -999 when no dark qualified.
    pub time_diff: f64,
    pub field: Option<String>,
    pub flat_kind: FlatKind,
}

/// One synthesized master frame. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct MasterFrame {
    pub name: MasterName,
    pub chip: Chip,
    pub band: Option<String>,
    pub exposure_time: f64,
    /// Mean julian date of the constituent raw frames.
    pub jd: f64,
    /// `DATE-OBS` of the representative raw frame.
    pub date: Option<String>,
    /// Compressed two-plane artifact (value + uncertainty).
    pub file: PathBuf,
    pub source_count: usize,
    pub note: Quality,
    /// Set for flats only.
    pub flat: Option<DarkProvenance>,
}

impl MasterFrame {
    pub fn kind(&self) -> FrameKind {
        self.name.identity.kind()
    }

    pub fn identity(&self) -> &Identity {
        &self.name.identity
    }

    /// True for a flat whose dark selection failed.
    pub fn missing_dark(&self) -> bool {
        self.flat
            .as_ref()
            .is_some_and(|p| p.time_diff == NO_DARK_TIME_DIFF)
    }
}

/// Dark lookup parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkSelection {
    /// Only consider darks whose note is `good`.
    pub strict: bool,
    /// Maximum |time difference| in days (exclusive).
    pub tolerance: f64,
}

impl Default for DarkSelection {
    fn default() -> Self {
        Self {
            strict: true,
            tolerance: DEFAULT_DARK_TOLERANCE,
        }
    }
}

/// The exposure a dark is wanted for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DarkQuery {
    pub jd: f64,
    pub exposure_time: f64,
    pub chip: Chip,
}

/// Result of a dark lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum DarkMatch {
    Found {
        name: MasterName,
        file: PathBuf,
        /// Signed `query.jd - dark.jd` in days.
        time_diff: f64,
    },
    None,
}

impl DarkMatch {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Found { file, .. } => Some(file),
            Self::None => None,
        }
    }

    /// Signed time difference, or the -999 sentinel when nothing matched.
    pub fn time_diff(&self) -> f64 {
        match self {
            Self::Found { time_diff, .. } => *time_diff,
            Self::None => NO_DARK_TIME_DIFF,
        }
    }
}

impl fmt::Display for DarkMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found {
                file, time_diff, ..
            } => write!(f, "{} ({time_diff:+.4} d)", file.display()),
            Self::None => write!(f, "none ({NO_DARK_TIME_DIFF})"),
        }
    }
}

/// Append-only table of master frames, in catalog order.
#[derive(Clone, Debug, Default)]
pub struct MasterCatalog {
    records: Vec<MasterFrame>,
    names: HashSet<MasterName>,
}

impl MasterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, refusing a second record under an existing name.
    pub fn from_records(records: Vec<MasterFrame>) -> Result<Self> {
        let mut catalog = Self::new();
        for record in records {
            catalog.push(record)?;
        }
        Ok(catalog)
    }

    pub fn records(&self) -> &[MasterFrame] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &MasterName) -> bool {
        self.names.contains(name)
    }

    pub fn get(&self, name: &MasterName) -> Option<&MasterFrame> {
        if !self.contains(name) {
            return None;
        }
        self.records.iter().find(|r| &r.name == name)
    }

    /// Append one record. A duplicate name is an error.
    pub fn push(&mut self, record: MasterFrame) -> Result<()> {
        if !self.names.insert(record.name.clone()) {
            return Err(MasterError::InvalidRow {
                name: record.name.to_string(),
                reason: "duplicate master name".into(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Identities already mastered for `kind`.
    pub fn identities(&self, kind: FrameKind) -> BTreeSet<Identity> {
        self.records
            .iter()
            .filter(|r| r.kind() == kind)
            .map(|r| r.identity().clone())
            .collect()
    }

    pub fn contains_identity(&self, identity: &Identity) -> bool {
        self.records.iter().any(|r| r.identity() == identity)
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&MasterFrame) -> bool) {
        self.records.retain(keep);
        self.names = self.records.iter().map(|r| r.name.clone()).collect();
    }

    /// Find the master dark closest in time to `query`.
    ///
    /// Candidates are darks of the same chip whose exposure time matches after
    /// rounding to whole seconds (and whose note is `good` when strict). The
    /// smallest |Δt| wins; on a tie the earlier record in catalog order wins.
    /// Nothing is returned when the best |Δt| is not below the tolerance.
    pub fn select_dark(&self, query: &DarkQuery, selection: &DarkSelection) -> DarkMatch {
        let wanted_exposure = query.exposure_time.round() as i64;

        let mut best: Option<(&MasterFrame, f64)> = None;
        for dark in self.records.iter().filter(|r| r.kind() == FrameKind::Dark) {
            if selection.strict && dark.note != Quality::Good {
                continue;
            }
            if dark.chip != query.chip || dark.exposure_time.round() as i64 != wanted_exposure {
                continue;
            }
            let diff = query.jd - dark.jd;
            if !diff.is_finite() {
                continue;
            }
            match best {
                Some((_, best_diff)) if diff.abs() >= best_diff.abs() => {}
                _ => best = Some((dark, diff)),
            }
        }

        match best {
            Some((dark, diff)) if diff.abs() < selection.tolerance => DarkMatch::Found {
                name: dark.name.clone(),
                file: dark.file.clone(),
                time_diff: diff,
            },
            _ => DarkMatch::None,
        }
    }
}

/// CSV representation of a master record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MasterRow {
    pub name: String,
    pub kind: FrameKind,
    pub chip: u8,
    pub band: Option<String>,
    #[serde(rename = "exptime")]
    pub exposure_time: f64,
    pub jd: f64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "filename")]
    pub file: String,
    #[serde(rename = "nimages")]
    pub source_count: usize,
    pub note: Quality,
    pub dark_file: Option<String>,
    pub time_diff: Option<f64>,
    pub field: Option<String>,
    #[serde(rename = "flat_type")]
    pub flat_kind: Option<FlatKind>,
}

impl From<&MasterFrame> for MasterRow {
    fn from(m: &MasterFrame) -> Self {
        let flat = m.flat.as_ref();
        Self {
            name: m.name.to_string(),
            kind: m.kind(),
            chip: m.chip.number(),
            band: m.band.clone(),
            exposure_time: m.exposure_time,
            jd: m.jd,
            date: m.date.clone(),
            file: m.file.display().to_string(),
            source_count: m.source_count,
            note: m.note,
            dark_file: flat.map(|p| match &p.file {
                Some(file) => file.display().to_string(),
                None => "none".to_string(),
            }),
            time_diff: flat.map(|p| p.time_diff),
            field: flat.and_then(|p| p.field.clone()),
            flat_kind: flat.map(|p| p.flat_kind),
        }
    }
}

impl TryFrom<MasterRow> for MasterFrame {
    type Error = MasterError;

    fn try_from(row: MasterRow) -> Result<Self> {
        let name: MasterName = row.name.parse()?;
        let invalid = |reason: &str| MasterError::InvalidRow {
            name: row.name.clone(),
            reason: reason.to_string(),
        };

        if name.identity.kind() != row.kind {
            return Err(invalid("kind does not match name"));
        }
        let chip = Chip::new(row.chip).ok_or_else(|| invalid("excluded chip"))?;
        if chip != name.chip {
            return Err(invalid("chip does not match name"));
        }

        let flat = match row.kind {
            FrameKind::Dark => None,
            FrameKind::Flat => Some(DarkProvenance {
                file: row
                    .dark_file
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty() && *f != "none")
                    .map(PathBuf::from),
                time_diff: row.time_diff.unwrap_or(NO_DARK_TIME_DIFF),
                field: row.field.clone(),
                flat_kind: row.flat_kind.unwrap_or(FlatKind::Sky),
            }),
        };

        Ok(Self {
            name,
            chip,
            band: row.band,
            exposure_time: row.exposure_time,
            jd: row.jd,
            date: row.date.filter(|d| !d.trim().is_empty()),
            file: PathBuf::from(row.file),
            source_count: row.source_count,
            note: row.note,
            flat,
        })
    }
}
