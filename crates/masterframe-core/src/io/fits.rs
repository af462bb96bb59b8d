//! FITS access through cfitsio (`fitsio`).
//!
//! Images are always read as `f32` with BZERO/BSCALE applied by cfitsio and
//! written as 32-bit float HDUs. Header cards are kept in a small typed model
//! ([`FitsHeader`]) so that masters can forward the cards of their source
//! frames and the CLI can report them. Gzipped files are read transparently.

use std::ffi::{CStr, CString};
use std::fmt;
use std::fs;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::{sys, FitsFile};
use ndarray::Array2;

use crate::consts::MAX_FRAME_PIXELS;
use crate::error::{MasterError, Result};
use crate::frame::Frame;

/// cfitsio card buffer length (FLEN_CARD), terminator included.
const CARD_LEN: usize = 81;

/// Keywords owned by the file layout. They are read like any other card but
/// never copied onto another HDU.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "PCOUNT", "GCOUNT", "BZERO", "BSCALE", "BLANK", "EXTEND",
    "EXTNAME", "CHECKSUM", "DATASUM", "END",
];

/// True for keywords describing the data layout rather than the observation.
pub fn is_structural(key: &str) -> bool {
    key.starts_with("NAXIS") || STRUCTURAL_KEYS.contains(&key)
}

/// Value of a header card.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered keyword/value cards of one HDU.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyword, replacing an existing card in place.
    pub fn set(&mut self, key: &str, value: HeaderValue) {
        let key = key.to_ascii_uppercase();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(HeaderValue::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// One header-data unit. `data` is `None` for a data-less primary HDU.
#[derive(Clone, Debug)]
pub struct Hdu {
    pub header: FitsHeader,
    pub data: Option<Array2<f32>>,
}

/// Read every image HDU of a FITS file. A table extension ends the sequence.
pub fn read_fits(path: &Path) -> Result<Vec<Hdu>> {
    let (mut fptr, limit) = open(path)?;

    let mut count: c_int = 0;
    let mut status: c_int = 0;
    // SAFETY: `fptr` is an open file for the duration of the call.
    unsafe {
        sys::ffthdu(fptr.as_raw(), &mut count, &mut status);
    }
    check(status)?;

    let mut hdus = Vec::with_capacity(count.max(0) as usize);
    for index in 0..count.max(0) as usize {
        let hdu = fptr.hdu(index)?;
        match read_hdu(&mut fptr, &hdu, limit)? {
            Some(read) => hdus.push(read),
            None => break,
        }
    }
    Ok(hdus)
}

/// Read the primary image of a FITS file, with its header cards.
pub fn read_primary(path: &Path) -> Result<Frame> {
    let (mut fptr, limit) = open(path)?;
    let hdu = fptr.primary_hdu()?;
    let read = read_hdu(&mut fptr, &hdu, limit)?
        .ok_or_else(|| MasterError::InvalidFits("primary HDU is not an image".into()))?;
    let data = read
        .data
        .ok_or_else(|| MasterError::InvalidFits("primary HDU has no image".into()))?;
    Ok(Frame::with_header(data, read.header))
}

/// Write HDUs as a FITS file: the first is the primary, the rest IMAGE
/// extensions named by their `EXTNAME` card. An existing file is replaced.
pub fn write_fits(path: &Path, hdus: &[Hdu]) -> Result<()> {
    let (primary, extensions) = hdus.split_first().ok_or(MasterError::EmptySequence)?;
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut fptr = match &primary.data {
        Some(data) => {
            let (height, width) = data.dim();
            let description = ImageDescription {
                data_type: ImageType::Float,
                dimensions: &[height, width],
            };
            FitsFile::create(path)
                .with_custom_primary(&description)
                .open()?
        }
        None => FitsFile::create(path).open()?,
    };

    let hdu = fptr.primary_hdu()?;
    if let Some(data) = &primary.data {
        hdu.write_image(&mut fptr, &pixels(data))?;
    }
    write_cards(&mut fptr, &hdu, &primary.header)?;

    for extension in extensions {
        let data = extension
            .data
            .as_ref()
            .ok_or_else(|| MasterError::InvalidFits("image extension without data".into()))?;
        let name = extension.header.get_str("EXTNAME").unwrap_or("IMAGE");
        let (height, width) = data.dim();
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: &[height, width],
        };
        let hdu = fptr.create_image(name.to_string(), &description)?;
        hdu.write_image(&mut fptr, &pixels(data))?;
        write_cards(&mut fptr, &hdu, &extension.header)?;
    }
    Ok(())
}

/// Open a file for reading. For uncompressed files the byte length bounds the
/// image size a header may declare.
fn open(path: &Path) -> Result<(FitsFile, Option<u64>)> {
    let len = fs::metadata(path)?.len();
    let is_gzip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    let fptr = FitsFile::open(path)?;
    Ok((fptr, (!is_gzip).then_some(len)))
}

/// Read the image and cards of `hdu`. Returns `None` for table HDUs.
fn read_hdu(fptr: &mut FitsFile, hdu: &FitsHdu, limit: Option<u64>) -> Result<Option<Hdu>> {
    let (shape, pixel_bytes) = match &hdu.info {
        HduInfo::ImageInfo { shape, image_type } => (shape.clone(), bytes_per_pixel(image_type)),
        _ => return Ok(None),
    };

    let data = if shape.is_empty() {
        None
    } else {
        let (height, width) = image_dims(&shape)?;
        let bytes = (height * width) as u64 * pixel_bytes;
        if limit.is_some_and(|len| bytes > len) {
            return Err(MasterError::InvalidFits(format!(
                "header declares {width}x{height} pixels, more than the file holds"
            )));
        }
        let pixels: Vec<f32> = hdu.read_image(fptr)?;
        Some(
            Array2::from_shape_vec((height, width), pixels)
                .map_err(|e| MasterError::InvalidFits(e.to_string()))?,
        )
    };

    // `hdu` is the current HDU of `fptr` after selecting or reading it.
    let header = read_cards(fptr)?;
    Ok(Some(Hdu { header, data }))
}

/// Validate an image shape (`[.., NAXIS2, NAXIS1]`) and return `(height, width)`.
fn image_dims(shape: &[usize]) -> Result<(usize, usize)> {
    let (height, width, outer): (usize, usize, &[usize]) = match shape {
        [] => return Err(MasterError::InvalidDimensions { width: 0, height: 0 }),
        [width] => (1, *width, &[]),
        [outer @ .., height, width] => (*height, *width, outer),
    };
    let invalid = MasterError::InvalidDimensions { width, height };
    if width == 0 || height == 0 || outer.iter().any(|&n| n != 1) {
        return Err(invalid);
    }
    match width.checked_mul(height) {
        Some(pixels) if pixels <= MAX_FRAME_PIXELS => Ok((height, width)),
        _ => Err(invalid),
    }
}

fn bytes_per_pixel(image_type: &ImageType) -> u64 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 1,
        ImageType::Short | ImageType::UnsignedShort => 2,
        ImageType::Long | ImageType::UnsignedLong | ImageType::Float => 4,
        ImageType::LongLong | ImageType::Double => 8,
    }
}

/// Every valued card of the current HDU. Commentary cards are skipped.
fn read_cards(fptr: &mut FitsFile) -> Result<FitsHeader> {
    let mut header = FitsHeader::new();
    let mut count: c_int = 0;
    let mut more: c_int = 0;
    let mut status: c_int = 0;

    // SAFETY: `fptr` stays open while the raw handle is in use, and each
    // buffer holds a full card including its terminator.
    unsafe {
        let raw = fptr.as_raw();
        sys::ffghsp(raw, &mut count, &mut more, &mut status);
        check(status)?;
        for n in 1..=count {
            let mut key = [0 as c_char; CARD_LEN];
            let mut value = [0 as c_char; CARD_LEN];
            let mut comment = [0 as c_char; CARD_LEN];
            sys::ffgkyn(
                raw,
                n,
                key.as_mut_ptr(),
                value.as_mut_ptr(),
                comment.as_mut_ptr(),
                &mut status,
            );
            check(status)?;
            let key = CStr::from_ptr(key.as_ptr()).to_string_lossy();
            let value = CStr::from_ptr(value.as_ptr()).to_string_lossy();
            if !key.is_empty() && !value.trim().is_empty() {
                header.set(&key, parse_value(&value));
            }
        }
    }
    Ok(header)
}

/// Write the non-structural cards of `header` onto `hdu`. Non-finite floats
/// become undefined cards.
fn write_cards(fptr: &mut FitsFile, hdu: &FitsHdu, header: &FitsHeader) -> Result<()> {
    for (key, value) in header.iter().filter(|(key, _)| !is_structural(key)) {
        match value {
            HeaderValue::Integer(i) => hdu.write_key(fptr, key, *i)?,
            HeaderValue::Float(f) if f.is_finite() => hdu.write_key(fptr, key, *f)?,
            HeaderValue::Float(_) => write_raw_card(fptr, key, None)?,
            HeaderValue::Text(s) => hdu.write_key(fptr, key, s.clone())?,
            HeaderValue::Logical(b) => write_raw_card(fptr, key, Some(*b))?,
        }
    }
    Ok(())
}

/// Logical (`Some`) or undefined (`None`) card on the current HDU.
fn write_raw_card(fptr: &mut FitsFile, key: &str, value: Option<bool>) -> Result<()> {
    let key = CString::new(key).map_err(|e| MasterError::InvalidFits(e.to_string()))?;
    let mut status: c_int = 0;
    // SAFETY: `fptr` is open and `key` outlives the call.
    unsafe {
        let raw = fptr.as_raw();
        match value {
            Some(flag) => sys::ffpkyl(raw, key.as_ptr(), c_int::from(flag), ptr::null(), &mut status),
            None => sys::ffpkyu(raw, key.as_ptr(), ptr::null(), &mut status),
        };
    }
    check(status)
}

fn check(status: c_int) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(MasterError::InvalidFits(format!("cfitsio status {status}")))
    }
}

fn pixels(data: &Array2<f32>) -> Vec<f32> {
    data.iter().copied().collect()
}

/// Type a raw card value as cfitsio returns it (strings keep their quotes).
fn parse_value(raw: &str) -> HeaderValue {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    text.push('\'');
                } else {
                    break;
                }
            } else {
                text.push(c);
            }
        }
        return HeaderValue::Text(text.trim_end().to_string());
    }

    let value = trimmed.split('/').next().unwrap_or("").trim();
    match value {
        "T" => HeaderValue::Logical(true),
        "F" => HeaderValue::Logical(false),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                HeaderValue::Integer(i)
            } else if let Ok(f) = value.replace('D', "E").parse::<f64>() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::Text(value.to_string())
            }
        }
    }
}
