mod driver;
mod plan;
mod progress;
mod report;

pub use driver::{
    append_batch, run_synthesis, synthesize_darks, synthesize_flats, Target,
    DARK_NOTES,
};
pub use plan::{new_identities, IdentityTask};
pub use progress::{NoOpReporter, ProgressReporter, SynthesisStage};
pub use report::{BatchReport, IdentityOutcome, SynthesisReport};
