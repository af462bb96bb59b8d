use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;
use masterframe_core::catalog::store::{load_master_catalog, load_raw_catalog};
use masterframe_core::catalog::{MasterCatalog, RawCatalog};
use masterframe_core::config::SynthesisConfig;
use masterframe_core::identity::{FrameKind, Grouping};
use masterframe_core::policy::purge_bad;
use masterframe_core::synth::{new_identities, IdentityTask, DARK_NOTES};

#[derive(Args)]
pub struct PlanArgs {
    /// Synthesis config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Print the identities a synthesis run would combine, without writing anything.
pub fn run(config: SynthesisConfig) -> Result<()> {
    config.validate()?;

    let mut masters = load_master_catalog(&config.catalogs.masters)?;
    if config.redo_bad {
        let outcome = purge_bad(masters);
        for identity in &outcome.purged {
            println!("Redo (no dark): {identity}");
        }
        masters = outcome.catalog;
    }

    let (darks, _) = load_raw_catalog(&config.catalogs.darks, FrameKind::Dark, DARK_NOTES)?;
    print_plan(&darks, &masters, Grouping::PerNight);

    let (flats, _) = load_raw_catalog(
        &config.catalogs.flats,
        FrameKind::Flat,
        &config.flats.accepted_notes,
    )?;
    print_plan(&flats, &masters, config.flats.grouping);
    Ok(())
}

fn print_plan(raw: &RawCatalog, masters: &MasterCatalog, grouping: Grouping) {
    let header = Style::new().cyan().bold();
    let dim = Style::new().dim();

    let identities = new_identities(raw, masters, grouping);
    println!();
    println!(
        "  {} {}",
        header.apply_to(format!("New {} identities", raw.kind())),
        dim.apply_to(format!("({})", identities.len()))
    );
    for identity in identities {
        let task = IdentityTask::build(raw, identity);
        let chips = task.chips.iter().filter(|(_, f)| !f.is_empty()).count();
        println!(
            "    {:<28}{}",
            task.identity.to_string(),
            dim.apply_to(format!("{} frames, {chips} chips", task.frame_count()))
        );
    }
}
