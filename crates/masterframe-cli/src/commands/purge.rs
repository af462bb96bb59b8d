use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use masterframe_core::catalog::store::{load_master_catalog, save_master_catalog};
use masterframe_core::policy::purge_bad;

#[derive(Args)]
pub struct PurgeArgs {
    /// Master catalog (CSV)
    #[arg(long, default_value = "cal_lists/master_list.csv")]
    pub catalog: PathBuf,

    /// Only list what would be purged
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: &PurgeArgs) -> Result<()> {
    let masters = load_master_catalog(&args.catalog)?;
    let before = masters.len();
    let outcome = purge_bad(masters);

    if outcome.purged.is_empty() {
        println!("Nothing to purge");
        return Ok(());
    }
    for identity in &outcome.purged {
        println!("  {identity}");
    }
    let removed = before - outcome.catalog.len();

    if args.dry_run {
        println!(
            "Would purge {} identities ({removed} records)",
            outcome.purged.len()
        );
    } else {
        save_master_catalog(&args.catalog, &outcome.catalog)?;
        println!(
            "Purged {} identities ({removed} records)",
            outcome.purged.len()
        );
    }
    Ok(())
}
