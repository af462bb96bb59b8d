//! Structured grouping keys for raw calibration frames and master names.
//!
//! An [`Identity`] names one group of raw frames that is combined into one
//! master per chip. The textual encoding is the key used by the master
//! catalog:
//!
//! | kind                 | encoding                           |
//! |----------------------|------------------------------------|
//! | dark                 | `dark_<night>_<exptime>s`          |
//! | flat, per night      | `flat_<band>_<night>`              |
//! | flat, trailing window| `flat_<band>_<night>_w<days>`      |
//!
//! `night` is the integer julian day (`floor(jd)`). A master record is named
//! `<identity>-m<chip>`, see [`MasterName`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::CHIP_COUNT;
use crate::error::{MasterError, Result};

/// One sensor segment of the mosaic, numbered 1..=10.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chip(u8);

impl Chip {
    pub fn new(number: u8) -> Option<Self> {
        (1..=CHIP_COUNT).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// All chips of the mosaic in ascending order.
    pub fn all() -> impl Iterator<Item = Chip> {
        (1..=CHIP_COUNT).map(Chip)
    }

    /// Parse a catalog cell. Sentinels such as `bad`, `0` or `99` yield `None`.
    pub fn parse_cell(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        let number = match cell.parse::<u8>() {
            Ok(n) => n,
            Err(_) => {
                let v = cell.parse::<f64>().ok()?;
                if v.fract() != 0.0 || !(0.0..=255.0).contains(&v) {
                    return None;
                }
                v as u8
            }
        };
        Self::new(number)
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calibration frame type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Dark,
    Flat,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

impl FromStr for FrameKind {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "dark" => Ok(Self::Dark),
            "flat" => Ok(Self::Flat),
            other => Err(MasterError::InvalidIdentity(format!(
                "unknown frame kind '{other}'"
            ))),
        }
    }
}

/// How raw flats are grouped into identities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// One identity per band and night, combined with the median.
    #[default]
    PerNight,
    /// One identity per band and anchor night, aggregating every raw flat of
    /// the `days` nights ending at the anchor. Combined with the mean.
    TrailingWindow { days: u32 },
}

impl Grouping {
    /// Window length in nights (1 for per-night grouping).
    pub fn window_days(&self) -> u32 {
        match self {
            Self::PerNight => 1,
            Self::TrailingWindow { days } => *days,
        }
    }

    /// Whether a raw frame taken on `night` belongs to the group anchored at `anchor`.
    pub fn covers(&self, anchor: i64, night: i64) -> bool {
        let days = self.window_days() as i64;
        night <= anchor && night > anchor - days
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerNight => write!(f, "Per Night"),
            Self::TrailingWindow { days } => write!(f, "Trailing Window ({days} nights)"),
        }
    }
}

/// Integer julian day used as the night bucket.
pub fn night_of(jd: f64) -> i64 {
    jd.floor() as i64
}

/// Group key for raw frames that are combined together.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Dark {
        night: i64,
        exposure_ms: u64,
    },
    Flat {
        band: String,
        night: i64,
        /// `Some(days)` for trailing-window grouping.
        window: Option<u32>,
    },
}

impl Identity {
    pub fn dark(night: i64, exposure_time: f64) -> Self {
        Self::Dark {
            night,
            exposure_ms: exposure_to_ms(exposure_time),
        }
    }

    pub fn flat(band: &str, night: i64, grouping: Grouping) -> Self {
        let window = match grouping {
            Grouping::PerNight => None,
            Grouping::TrailingWindow { days } => Some(days),
        };
        Self::Flat {
            band: band.to_string(),
            night,
            window,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Dark { .. } => FrameKind::Dark,
            Self::Flat { .. } => FrameKind::Flat,
        }
    }

    pub fn night(&self) -> i64 {
        match self {
            Self::Dark { night, .. } | Self::Flat { night, .. } => *night,
        }
    }

    pub fn exposure_time(&self) -> Option<f64> {
        match self {
            Self::Dark { exposure_ms, .. } => Some(*exposure_ms as f64 / 1000.0),
            Self::Flat { .. } => None,
        }
    }

    pub fn band(&self) -> Option<&str> {
        match self {
            Self::Flat { band, .. } => Some(band),
            Self::Dark { .. } => None,
        }
    }

    /// Encoded key, the inverse of [`Identity::from_str`].
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark { night, exposure_ms } => {
                write!(f, "dark_{night}_{}s", *exposure_ms as f64 / 1000.0)
            }
            Self::Flat {
                band,
                night,
                window: None,
            } => write!(f, "flat_{band}_{night}"),
            Self::Flat {
                band,
                night,
                window: Some(days),
            } => write!(f, "flat_{band}_{night}_w{days}"),
        }
    }
}

impl FromStr for Identity {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MasterError::InvalidIdentity(s.to_string());

        if let Some(rest) = s.strip_prefix("dark_") {
            let (night, exposure) = rest.split_once('_').ok_or_else(invalid)?;
            let night = night.parse::<i64>().map_err(|_| invalid())?;
            let exposure = exposure
                .strip_suffix('s')
                .and_then(|e| e.parse::<f64>().ok())
                .filter(|e| e.is_finite() && *e >= 0.0)
                .ok_or_else(invalid)?;
            return Ok(Self::dark(night, exposure));
        }

        if let Some(rest) = s.strip_prefix("flat_") {
            let mut parts: Vec<&str> = rest.split('_').collect();
            let window = match parts.last() {
                Some(last) if parts.len() >= 3 && last.starts_with('w') => {
                    let days = last[1..].parse::<u32>().map_err(|_| invalid())?;
                    parts.pop();
                    Some(days)
                }
                _ => None,
            };
            let night = parts
                .pop()
                .and_then(|n| n.parse::<i64>().ok())
                .ok_or_else(invalid)?;
            let band = parts.join("_");
            if band.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Flat {
                band,
                night,
                window,
            });
        }

        Err(invalid())
    }
}

/// Name of one master record: an identity plus the chip it covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MasterName {
    pub identity: Identity,
    pub chip: Chip,
}

impl MasterName {
    pub fn new(identity: Identity, chip: Chip) -> Self {
        Self { identity, chip }
    }
}

impl fmt::Display for MasterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-m{}", self.identity, self.chip)
    }
}

impl FromStr for MasterName {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self> {
        let (identity, chip) = s
            .rsplit_once("-m")
            .ok_or_else(|| MasterError::InvalidIdentity(s.to_string()))?;
        let chip = Chip::parse_cell(chip)
            .ok_or_else(|| MasterError::InvalidIdentity(s.to_string()))?;
        Ok(Self {
            identity: identity.parse()?,
            chip,
        })
    }
}

fn exposure_to_ms(exposure_time: f64) -> u64 {
    (exposure_time * 1000.0).round().max(0.0) as u64
}
