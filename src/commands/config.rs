use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ConfigCommands;
use trellis::config::TrellisConfig;

pub fn run(command: &ConfigCommands, config_path: Option<&str>) -> Result<()> {
    match command {
        ConfigCommands::Example => example(),
        ConfigCommands::Validate { path } => {
            let path = path
                .as_deref()
                .or(config_path)
                .context("No config file given (pass a path or --config)")?;
            validate(path)
        }
    }
}

fn example() -> Result<()> {
    println!("{}", TrellisConfig::example()?);
    Ok(())
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = TrellisConfig::from_file(path)?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Caching: {}", if config.cache.enabled { "enabled" } else { "disabled" });
    println!("  - Backend: {:?}", config.cache.backend);
    println!("  - Cache directory: {}", config.cache_dir().display());
    if let Some(env_hash) = &config.cache.env_hash {
        println!("  - Environment hash: {}", env_hash);
    }
    println!(
        "  - Execution mode: {} (batch threshold {})",
        config.runner.mode, config.runner.batch_threshold
    );

    Ok(())
}
