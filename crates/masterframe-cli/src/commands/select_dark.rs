use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use masterframe_core::catalog::store::load_master_catalog;
use masterframe_core::catalog::{DarkMatch, DarkQuery, DarkSelection};
use masterframe_core::consts::DEFAULT_DARK_TOLERANCE;
use masterframe_core::identity::Chip;

#[derive(Args)]
pub struct SelectDarkArgs {
    /// Master catalog (CSV)
    #[arg(long, default_value = "cal_lists/master_list.csv")]
    pub catalog: PathBuf,

    /// Julian date of the flat
    #[arg(long)]
    pub jd: f64,

    /// Exposure time of the flat in seconds
    #[arg(long)]
    pub exptime: f64,

    /// Chip number (1-10)
    #[arg(long)]
    pub chip: u8,

    /// Maximum |flat - dark| time difference in days
    #[arg(long, default_value_t = DEFAULT_DARK_TOLERANCE)]
    pub tolerance: f64,

    /// Also accept darks noted bad
    #[arg(long)]
    pub lax: bool,
}

pub fn run(args: &SelectDarkArgs) -> Result<()> {
    let chip = Chip::new(args.chip).ok_or_else(|| anyhow!("Chip must be 1-10, got {}", args.chip))?;
    let masters = load_master_catalog(&args.catalog)?;

    let query = DarkQuery {
        jd: args.jd,
        exposure_time: args.exptime,
        chip,
    };
    let selection = DarkSelection {
        strict: !args.lax,
        tolerance: args.tolerance,
    };

    match masters.select_dark(&query, &selection) {
        DarkMatch::Found {
            name,
            file,
            time_diff,
        } => {
            println!("Dark:       {name}");
            println!("File:       {}", file.display());
            println!("Time diff:  {time_diff:+.4} d");
        }
        DarkMatch::None => {
            println!("No dark within {} d", args.tolerance);
        }
    }
    Ok(())
}
