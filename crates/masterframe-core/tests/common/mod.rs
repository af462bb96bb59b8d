use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;

use masterframe_core::catalog::{
    DarkProvenance, FlatKind, MasterFrame, Quality, RawCatalog, RawFrame, RawNote,
};
use masterframe_core::error::{MasterError, Result};
use masterframe_core::frame::{Frame, MasterMetadata, MasterPlanes};
use masterframe_core::identity::{Chip, FrameKind, Identity, MasterName};
use masterframe_core::io::fits::{write_fits, FitsHeader, Hdu};
use masterframe_core::io::store::FrameStore;

pub fn make_frame(h: usize, w: usize, fill: f32) -> Frame {
    Frame::new(Array2::from_elem((h, w), fill))
}

pub fn chip(n: u8) -> Chip {
    Chip::new(n).expect("valid chip")
}

pub fn raw_dark(name: &str, chip_no: u8, exposure_time: f64, jd: f64) -> RawFrame {
    RawFrame {
        name: name.to_string(),
        chip: chip(chip_no),
        band: None,
        exposure_time,
        jd,
        file: PathBuf::from(format!("raw/{name}.fit")),
        note: RawNote::Good,
        field: None,
    }
}

pub fn raw_flat(name: &str, chip_no: u8, band: &str, jd: f64, field: &str) -> RawFrame {
    RawFrame {
        name: name.to_string(),
        chip: chip(chip_no),
        band: Some(band.to_string()),
        exposure_time: 5.0,
        jd,
        file: PathBuf::from(format!("raw/{name}.fit")),
        note: RawNote::Good,
        field: Some(field.to_string()),
    }
}

pub fn catalog(kind: FrameKind, frames: Vec<RawFrame>) -> RawCatalog {
    let mut cat = RawCatalog::new(kind);
    for f in frames {
        cat.push(f);
    }
    cat
}

pub fn master_dark(night: i64, chip_no: u8, exposure_time: f64, jd: f64, note: Quality) -> MasterFrame {
    let name = MasterName::new(Identity::dark(night, exposure_time), chip(chip_no));
    MasterFrame {
        file: PathBuf::from(format!("master/{name}.fits.gz")),
        name,
        chip: chip(chip_no),
        band: None,
        exposure_time,
        jd,
        date: None,
        source_count: 5,
        note,
        flat: None,
    }
}

pub fn master_flat(identity: Identity, chip_no: u8, time_diff: f64) -> MasterFrame {
    let name = MasterName::new(identity, chip(chip_no));
    MasterFrame {
        file: PathBuf::from(format!("master/{name}.fits.gz")),
        band: name.identity.band().map(str::to_string),
        name,
        chip: chip(chip_no),
        exposure_time: 5.0,
        jd: 2_460_000.6,
        date: None,
        source_count: 4,
        note: Quality::Good,
        flat: Some(DarkProvenance {
            file: (time_diff != -999.0).then(|| PathBuf::from("master/dark.fits.gz")),
            time_diff,
            field: Some("twilight".into()),
            flat_kind: FlatKind::Sky,
        }),
    }
}

/// Write a single-HDU FITS file holding `data`.
pub fn write_raw_fits(path: &Path, data: Array2<f32>) {
    write_fits(
        path,
        &[Hdu {
            header: FitsHeader::new(),
            data: Some(data),
        }],
    )
    .expect("write raw FITS");
}

/// Write a FITS file from literal header cards (`END` is appended) followed
/// by raw `data` bytes. Both parts are padded to 2880-byte blocks.
pub fn write_card_fits(path: &Path, cards: &[&str], data: &[u8]) {
    let mut bytes = Vec::new();
    for text in cards.iter().copied().chain(std::iter::once("END")) {
        let mut card = text.as_bytes().to_vec();
        card.resize(80, b' ');
        bytes.extend(card);
    }
    pad_block(&mut bytes, b' ');
    bytes.extend_from_slice(data);
    pad_block(&mut bytes, 0);
    std::fs::write(path, bytes).expect("write FITS cards");
}

fn pad_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % 2880;
    if rem != 0 {
        buf.resize(buf.len() + 2880 - rem, fill);
    }
}

/// In-memory frame store. Saved masters become loadable under their returned path.
#[derive(Default)]
pub struct MemoryStore {
    frames: Mutex<HashMap<PathBuf, Frame>>,
    saved: Mutex<Vec<(MasterName, MasterPlanes, MasterMetadata)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, frame: Frame) {
        self.frames.lock().unwrap().insert(path.into(), frame);
    }

    /// Register a raw frame under the file reference of `raw`.
    pub fn insert_raw(&self, raw: &RawFrame, frame: Frame) {
        self.insert(raw.file.clone(), frame);
    }

    pub fn saved(&self) -> Vec<(MasterName, MasterPlanes, MasterMetadata)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn saved_planes(&self, name: &str) -> Option<MasterPlanes> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _, _)| n.to_string() == name)
            .map(|(_, p, _)| p.clone())
    }
}

impl FrameStore for MemoryStore {
    fn load(&self, path: &Path) -> Result<Frame> {
        self.frames
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                MasterError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("{} not in store", path.display()),
                ))
            })
    }

    fn save_master(
        &self,
        name: &MasterName,
        planes: &MasterPlanes,
        metadata: &MasterMetadata,
    ) -> Result<PathBuf> {
        let path = PathBuf::from(format!("master/{name}.fits.gz"));
        self.insert(path.clone(), Frame::new(planes.value.clone()));
        self.saved
            .lock()
            .unwrap()
            .push((name.clone(), planes.clone(), metadata.clone()));
        Ok(path)
    }
}
