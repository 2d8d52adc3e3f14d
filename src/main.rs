mod cli;
mod cli_utils;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::Path;

use cli::{Cli, Commands};
use trellis::config::TrellisConfig;
use trellis::logging;

/// Config file picked up from the working directory when `--config` is absent
const LOCAL_CONFIG: &str = "trellis.toml";

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.log_level.as_deref());

    match &cli.command {
        Commands::Cache(args) => {
            let config = load_config(cli.config.as_deref())?;
            commands::cache::cache(args, &config)
        }
        Commands::Config(args) => commands::config::run(&args.command, cli.config.as_deref()),
    }
}

fn load_config(path: Option<&str>) -> Result<TrellisConfig> {
    if let Some(path) = path {
        return TrellisConfig::from_file(path);
    }

    if Path::new(LOCAL_CONFIG).is_file() {
        tracing::debug!("Using config: {}", LOCAL_CONFIG);
        return TrellisConfig::from_file(LOCAL_CONFIG);
    }

    Ok(TrellisConfig::default())
}
