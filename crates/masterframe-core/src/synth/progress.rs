/// Synthesis stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesisStage {
    LoadingCatalogs,
    Purging,
    CombiningDarks,
    CombiningFlats,
    WritingCatalog,
}

impl std::fmt::Display for SynthesisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadingCatalogs => write!(f, "Loading catalogs"),
            Self::Purging => write!(f, "Purging bad masters"),
            Self::CombiningDarks => write!(f, "Combining darks"),
            Self::CombiningFlats => write!(f, "Combining flats"),
            Self::WritingCatalog => write!(f, "Writing catalog"),
        }
    }
}

/// Thread-safe progress reporting for synthesis runs.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (identities to combine), if known.
    fn begin_stage(&self, _stage: SynthesisStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed so far.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
