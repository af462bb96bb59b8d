use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MasterError, Result};
use crate::identity::{night_of, Chip, FrameKind, Grouping, Identity};

/// Quality tag attached to a raw frame by the catalog scanner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawNote {
    #[default]
    Good,
    Lower,
    Over,
    Bad,
}

impl fmt::Display for RawNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Lower => write!(f, "lower"),
            Self::Over => write!(f, "over"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

impl FromStr for RawNote {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim() {
            "good" => Ok(Self::Good),
            "lower" => Ok(Self::Lower),
            "over" => Ok(Self::Over),
            "bad" => Ok(Self::Bad),
            other => Err(format!("unknown note '{other}'")),
        }
    }
}

/// Validated metadata for one raw calibration exposure.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub name: String,
    pub chip: Chip,
    /// Filter band, required for flats.
    pub band: Option<String>,
    pub exposure_time: f64,
    /// Julian date of the exposure.
    pub jd: f64,
    pub file: PathBuf,
    pub note: RawNote,
    /// Field / target name, used to tell dome flats from sky flats.
    pub field: Option<String>,
}

impl RawFrame {
    pub fn night(&self) -> i64 {
        night_of(self.jd)
    }

    /// Every identity this frame contributes to under `grouping`.
    ///
    /// Darks and per-night flats belong to exactly one identity. Under a
    /// trailing window a flat is identified by its own night; it is also a
    /// member of later anchors, see [`RawCatalog::members`].
    pub fn identity(&self, kind: FrameKind, grouping: Grouping) -> Option<Identity> {
        match kind {
            FrameKind::Dark => Some(Identity::dark(self.night(), self.exposure_time)),
            FrameKind::Flat => self
                .band
                .as_deref()
                .map(|band| Identity::flat(band, self.night(), grouping)),
        }
    }

    fn belongs_to(&self, identity: &Identity) -> bool {
        match identity {
            Identity::Dark { .. } => {
                Identity::dark(self.night(), self.exposure_time) == *identity
            }
            Identity::Flat {
                band,
                night,
                window,
            } => {
                let grouping = match window {
                    Some(days) => Grouping::TrailingWindow { days: *days },
                    None => Grouping::PerNight,
                };
                self.band.as_deref() == Some(band.as_str()) && grouping.covers(*night, self.night())
            }
        }
    }
}

/// One CSV row as written by the external scanner. Numeric columns are kept
/// as text because the scanner writes `bad` for unreadable headers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawRow {
    pub name: String,
    pub chip: String,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(rename = "exptime")]
    pub exposure_time: String,
    pub jd: String,
    #[serde(rename = "filename")]
    pub file: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
}

impl RawRow {
    /// Validate the row into a [`RawFrame`] for a catalog of `kind`.
    pub fn validate(self, kind: FrameKind) -> Result<RawFrame> {
        let reject = |reason: &str| MasterError::InvalidRow {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        let chip = Chip::parse_cell(&self.chip).ok_or_else(|| reject("excluded chip"))?;
        let exposure_time = parse_finite(&self.exposure_time)
            .filter(|e| *e >= 0.0)
            .ok_or_else(|| reject("invalid exposure time"))?;
        let jd = parse_finite(&self.jd)
            .filter(|jd| *jd > 0.0)
            .ok_or_else(|| reject("invalid julian date"))?;
        let note = match self.note.as_deref() {
            None | Some("") => RawNote::Good,
            Some(n) => n.parse::<RawNote>().map_err(|e| reject(&e))?,
        };
        let band = non_empty(self.band.as_deref());
        if kind == FrameKind::Flat && band.is_none() {
            return Err(reject("missing band"));
        }
        if self.file.trim().is_empty() || self.file.trim() == "bad" {
            return Err(reject("missing file reference"));
        }

        Ok(RawFrame {
            name: self.name.trim().to_string(),
            chip,
            band,
            exposure_time,
            jd,
            file: PathBuf::from(self.file.trim()),
            note,
            field: non_empty(self.field.as_deref()),
        })
    }
}

/// Outcome of loading raw rows into a catalog.
#[derive(Clone, Debug, Default)]
pub struct IngestReport {
    pub accepted: usize,
    /// `(row name, reason)` for every rejected row.
    pub rejected: Vec<(String, String)>,
}

/// Append-only table of raw calibration frames of one kind, in catalog order.
#[derive(Clone, Debug)]
pub struct RawCatalog {
    kind: FrameKind,
    frames: Vec<RawFrame>,
}

impl RawCatalog {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            frames: Vec::new(),
        }
    }

    /// Validate scanner rows, keeping those whose note is in `accepted_notes`.
    pub fn ingest(
        kind: FrameKind,
        rows: impl IntoIterator<Item = RawRow>,
        accepted_notes: &[RawNote],
    ) -> (Self, IngestReport) {
        let mut catalog = Self::new(kind);
        let mut report = IngestReport::default();

        for row in rows {
            let name = row.name.clone();
            match row.validate(kind) {
                Ok(frame) if accepted_notes.contains(&frame.note) => {
                    catalog.push(frame);
                    report.accepted += 1;
                }
                Ok(frame) => report
                    .rejected
                    .push((name, format!("note '{}' not accepted", frame.note))),
                Err(MasterError::InvalidRow { reason, .. }) => {
                    report.rejected.push((name, reason))
                }
                Err(e) => report.rejected.push((name, e.to_string())),
            }
        }

        (catalog, report)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn frames(&self) -> &[RawFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push(frame);
    }

    /// Distinct identities present in the catalog.
    pub fn identities(&self, grouping: Grouping) -> BTreeSet<Identity> {
        self.frames
            .iter()
            .filter_map(|f| f.identity(self.kind, grouping))
            .collect()
    }

    /// Frames (all chips) that are combined under `identity`, in catalog order.
    pub fn members(&self, identity: &Identity) -> Vec<&RawFrame> {
        self.frames
            .iter()
            .filter(|f| f.belongs_to(identity))
            .collect()
    }
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn non_empty(cell: Option<&str>) -> Option<String> {
    cell.map(str::trim)
        .filter(|s| !s.is_empty() && *s != "bad")
        .map(str::to_string)
}
