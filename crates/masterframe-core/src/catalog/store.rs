use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identity::FrameKind;

use super::master::{MasterCatalog, MasterFrame, MasterRow};
use super::raw::{IngestReport, RawCatalog, RawNote, RawRow};

/// Load a raw frame catalog CSV, validating every row.
pub fn load_raw_catalog(
    path: &Path,
    kind: FrameKind,
    accepted_notes: &[RawNote],
) -> Result<(RawCatalog, IngestReport)> {
    let mut rdr = csv::Reader::from_path(path)?;
    let rows = rdr
        .deserialize::<RawRow>()
        .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

    let (catalog, report) = RawCatalog::ingest(kind, rows, accepted_notes);
    for (name, reason) in &report.rejected {
        debug!(%name, %reason, "Raw row rejected");
    }
    if !report.rejected.is_empty() {
        warn!(
            catalog = %path.display(),
            rejected = report.rejected.len(),
            "Raw catalog rows excluded"
        );
    }
    info!(
        catalog = %path.display(),
        %kind,
        frames = catalog.len(),
        "Raw catalog loaded"
    );
    Ok((catalog, report))
}

/// Load the master catalog. A missing file is an empty catalog.
pub fn load_master_catalog(path: &Path) -> Result<MasterCatalog> {
    let mut rdr = match csv::Reader::from_path(path) {
        Ok(rdr) => rdr,
        Err(e) if is_not_found(&e) => {
            info!(catalog = %path.display(), "No master catalog yet, starting empty");
            return Ok(MasterCatalog::new());
        }
        Err(e) => return Err(e.into()),
    };

    let records = rdr
        .deserialize::<MasterRow>()
        .map(|row| MasterFrame::try_from(row?))
        .collect::<Result<Vec<_>>>()?;
    let catalog = MasterCatalog::from_records(records)?;
    info!(catalog = %path.display(), records = catalog.len(), "Master catalog loaded");
    Ok(catalog)
}

/// Rewrite the master catalog. The file is replaced atomically.
pub fn save_master_catalog(path: &Path, catalog: &MasterCatalog) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temporary_sibling(path);
    {
        let mut wtr = csv::Writer::from_path(&tmp)?;
        for record in catalog.records() {
            wtr.serialize(MasterRow::from(record))?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp, path)?;
    info!(catalog = %path.display(), records = catalog.len(), "Master catalog saved");
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn is_not_found(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound)
}
