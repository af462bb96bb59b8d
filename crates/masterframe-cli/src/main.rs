mod commands;
mod summary;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use masterframe_core::config::SynthesisConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "masterframe", about = "Master dark and flat synthesis for the mosaic camera")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize every new master dark and flat
    Synth(commands::synth::SynthArgs),
    /// List the identities the next run would synthesize
    Plan(commands::plan::PlanArgs),
    /// Look up the master dark a flat would be corrected with
    SelectDark(commands::select_dark::SelectDarkArgs),
    /// Drop flats recorded without a qualifying dark
    Purge(commands::purge::PurgeArgs),
    /// Show FITS file metadata
    Info(commands::info::InfoArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
}

impl Commands {
    /// Config file named on the command line, for commands that take one.
    fn config_path(&self) -> Option<&Path> {
        match self {
            Self::Synth(args) => args.config.as_deref(),
            Self::Plan(args) => args.config.as_deref(),
            _ => None,
        }
    }
}

/// Log level from the `--verbose` flag or the config's `verbose` setting.
fn log_level(cli_verbose: bool, config: &SynthesisConfig) -> &'static str {
    if cli_verbose || config.verbose {
        "debug"
    } else {
        "warn"
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The config is read first so that its `verbose` setting shapes logging.
    let config = commands::load_config(cli.command.config_path())?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level(cli.verbose, &config)))
        .init();

    match &cli.command {
        Commands::Synth(args) => commands::synth::run(args, config, cli.verbose),
        Commands::Plan(_) => commands::plan::run(config),
        Commands::SelectDark(args) => commands::select_dark::run(args),
        Commands::Purge(args) => commands::purge::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_verbose_enables_debug_logging() {
        let mut config = SynthesisConfig::default();
        assert_eq!(log_level(false, &config), "warn");
        assert_eq!(log_level(true, &config), "debug");

        config.verbose = true;
        assert_eq!(log_level(false, &config), "debug");
    }

    #[test]
    fn config_path_follows_command() {
        let cli = Cli::parse_from(["masterframe", "synth", "--config", "run.toml"]);
        assert_eq!(cli.command.config_path(), Some(Path::new("run.toml")));

        let cli = Cli::parse_from(["masterframe", "plan"]);
        assert_eq!(cli.command.config_path(), None);

        let cli = Cli::parse_from(["masterframe", "config"]);
        assert_eq!(cli.command.config_path(), None);
    }
}
