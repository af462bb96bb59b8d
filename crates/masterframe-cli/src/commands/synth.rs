use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use masterframe_core::config::SynthesisConfig;
use masterframe_core::identity::Grouping;
use masterframe_core::io::store::FitsStore;
use masterframe_core::synth::{run_synthesis, ProgressReporter, SynthesisStage, Target};

use crate::summary::{print_config_summary, print_synthesis_report};

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Dark,
    Flat,
    All,
}

impl From<KindArg> for Target {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Dark => Target::Darks,
            KindArg::Flat => Target::Flats,
            KindArg::All => Target::All,
        }
    }
}

#[derive(Args)]
pub struct SynthArgs {
    /// Synthesis config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Which master kinds to synthesize
    #[arg(long, value_enum, default_value = "all")]
    pub kind: KindArg,

    /// Root directory for master artifacts
    #[arg(long)]
    pub save_location: Option<PathBuf>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Group flats over a trailing window of this many nights
    #[arg(long)]
    pub window: Option<u32>,

    /// Maximum |flat - dark| time difference in days
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Also accept darks noted bad
    #[arg(long)]
    pub lax: bool,

    /// Keep flats recorded without a dark instead of redoing them
    #[arg(long)]
    pub no_redo: bool,

    /// Leave master artifacts uncompressed
    #[arg(long)]
    pub no_compress: bool,
}

pub fn run(args: &SynthArgs, mut config: SynthesisConfig, verbose: bool) -> Result<()> {
    apply_overrides(&mut config, args, verbose);
    config.validate().context("Invalid synthesis config")?;

    print_config_summary(&config);

    let store = FitsStore::new(&config.save_location, config.compress);
    let reporter = BarReporter::new();
    let report = run_synthesis(&config, args.kind.into(), &store, &reporter)?;

    print_synthesis_report(&report);
    Ok(())
}

fn apply_overrides(config: &mut SynthesisConfig, args: &SynthArgs, verbose: bool) {
    if let Some(ref dir) = args.save_location {
        config.save_location = dir.clone();
    }
    if args.workers.is_some() {
        config.worker_count = args.workers;
    }
    if let Some(days) = args.window {
        config.flats.grouping = Grouping::TrailingWindow { days };
    }
    if let Some(tolerance) = args.tolerance {
        config.dark_selection.tolerance = tolerance;
    }
    if args.lax {
        config.dark_selection.strict = false;
    }
    if args.no_redo {
        config.redo_bad = false;
    }
    if args.no_compress {
        config.compress = false;
    }
    config.verbose |= verbose;
}

/// Drives one progress bar per combining stage.
struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: SynthesisStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{msg:20} [{bar:40}] {pos}/{len} identities")
                {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(stage.to_string());
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn advance(&self, items_done: usize) {
        // Workers report out of order.
        self.with_bar(|bar| {
            if items_done as u64 > bar.position() {
                bar.set_position(items_done as u64);
            }
        });
    }

    fn finish_stage(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}
