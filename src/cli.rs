use clap::{Parser, Subcommand};

/// Trellis - cached pipeline execution
///
/// Inspects and maintains the durable signature cache written by trellis
/// pipelines.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and maintain trellis pipeline caches", long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short = 'c', long, global = true, env = "TRELLIS_CONFIG")]
    pub config: Option<String>,

    /// Log level when RUST_LOG is unset (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "TRELLIS_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect or clear the durable cache
    Cache(CacheArgs),

    /// Configuration utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    /// Cache directory (overrides `cache.dir` from the config file)
    #[arg(long, env = "TRELLIS_CACHE_DIR")]
    pub cache_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry count and blob usage
    Stats,

    /// List cached keys
    List {
        /// Include signature hashes and timestamps
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the stored signature and output for one key
    Show {
        /// Cache key (`output` or `output::item`)
        key: String,
    },

    /// Remove every cached signature and output
    Clear,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print an example configuration file
    Example,

    /// Validate a configuration file
    Validate {
        /// Config file to validate (defaults to --config)
        path: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_show() {
        let cli = Cli::try_parse_from(["trellis", "cache", "--cache-dir", "/tmp/c", "show", "foo_out"])
            .unwrap();
        match cli.command {
            Commands::Cache(args) => {
                assert_eq!(args.cache_dir.as_deref(), Some("/tmp/c"));
                assert!(matches!(args.command, CacheCommands::Show { ref key } if key == "foo_out"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["trellis", "cache", "stats", "-c", "trellis.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("trellis.toml"));
    }
}
