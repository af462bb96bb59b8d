pub mod master;
pub mod raw;
pub mod store;

pub use master::{
    DarkMatch, DarkProvenance, DarkQuery, DarkSelection, FlatKind, MasterCatalog, MasterFrame,
    Quality,
};
pub use raw::{IngestReport, RawCatalog, RawFrame, RawNote, RawRow};
