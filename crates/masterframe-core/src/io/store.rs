use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::Result;
use crate::frame::{Frame, MasterMetadata, MasterPlanes};
use crate::identity::MasterName;

use super::fits::{is_structural, read_primary, write_fits, FitsHeader, Hdu, HeaderValue};

/// Where raw frames are read from and master artifacts are written to.
///
/// Implementations must be safe to share between worker threads; each call
/// to [`FrameStore::save_master`] writes a distinct, name-derived location.
pub trait FrameStore: Send + Sync {
    /// Load the primary image of a raw frame or of a master artifact.
    fn load(&self, path: &Path) -> Result<Frame>;

    /// Persist a two-plane master artifact and return its committed path.
    fn save_master(
        &self,
        name: &MasterName,
        planes: &MasterPlanes,
        metadata: &MasterMetadata,
    ) -> Result<PathBuf>;
}

/// Filesystem store writing FITS masters to `<save_location>/<kind>/<name>.fits[.gz]`.
#[derive(Clone, Debug)]
pub struct FitsStore {
    save_location: PathBuf,
    compress: bool,
}

impl FitsStore {
    pub fn new(save_location: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            save_location: save_location.into(),
            compress,
        }
    }

    pub fn save_location(&self) -> &Path {
        &self.save_location
    }
}

impl FrameStore for FitsStore {
    fn load(&self, path: &Path) -> Result<Frame> {
        read_primary(path)
    }

    fn save_master(
        &self,
        name: &MasterName,
        planes: &MasterPlanes,
        metadata: &MasterMetadata,
    ) -> Result<PathBuf> {
        let dir = self.save_location.join(name.identity.kind().to_string());
        fs::create_dir_all(&dir)?;
        let fits_path = dir.join(format!("{name}.fits"));

        let header = master_header(metadata);
        let mut sigma_header = header.clone();
        sigma_header.set("EXTNAME", HeaderValue::Text("UNCERT".into()));
        write_fits(
            &fits_path,
            &[
                Hdu {
                    header,
                    data: Some(planes.value.clone()),
                },
                Hdu {
                    header: sigma_header,
                    data: Some(planes.sigma.clone()),
                },
            ],
        )?;

        if !self.compress {
            debug!(path = %fits_path.display(), "Master written");
            return Ok(fits_path);
        }

        let gz_path = with_suffix(&fits_path, ".gz");
        let part_path = with_suffix(&fits_path, ".gz.part");
        compress_file(&fits_path, &part_path)?;
        fs::rename(&part_path, &gz_path)?;
        fs::remove_file(&fits_path)?;
        debug!(path = %gz_path.display(), "Master written and compressed");
        Ok(gz_path)
    }
}

/// Header cards shared by the value and uncertainty planes of a master: the
/// source frame's cards (`DATE-OBS`, `TELESCOP`, ...) overlaid with the
/// master's own.
pub fn master_header(metadata: &MasterMetadata) -> FitsHeader {
    let mut header = FitsHeader::new();
    for (key, value) in metadata.source_header.iter() {
        if is_plain_keyword(key) && !is_structural(key) {
            header.set(key, value.clone());
        }
    }
    header.set("CHIP", HeaderValue::Integer(metadata.chip as i64));
    header.set("EXPTIME", HeaderValue::Float(metadata.exposure_time));
    header.set("JDSTART", HeaderValue::Float(metadata.jd));
    header.set("MASTER", HeaderValue::Logical(true));
    header.set("NIMAGES", HeaderValue::Integer(metadata.source_count as i64));
    if let Some(band) = &metadata.band {
        header.set("COLOUR", HeaderValue::Text(band.clone()));
    }
    if let Some(field) = &metadata.field {
        header.set("FIELD", HeaderValue::Text(field.clone()));
    }
    if let Some(diff) = metadata.dark_time_diff {
        header.set("DARKTDIF", HeaderValue::Float(diff));
    }
    header
}

/// Standard eight-character keyword; anything else is not forwarded.
fn is_plain_keyword(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 8
        && key
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

fn compress_file(src: &Path, dst: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
