use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all Graphene binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments.
    ///
    /// `RUST_LOG` wins over the flags when it is set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Print configuration either as pretty debug output or JSON
    pub fn show_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let rendered =
                serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
            println!("{rendered}");
        } else {
            println!("{config:#?}");
        }
        Ok(())
    }

    /// Sanity checks that figment cannot express
    pub fn validate_config(config: &Configuration) -> Result<()> {
        config
            .reader
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid reader.bind address '{}'", config.reader.bind))?;

        if config.reader.request_timeout.is_zero() {
            anyhow::bail!("reader.request_timeout must be greater than zero");
        }
        if config.reader.max_concurrent_evaluations == 0 {
            anyhow::bail!("reader.max_concurrent_evaluations must be at least 1");
        }
        if config.reader.max_data_points == 0 {
            anyhow::bail!("reader.max_data_points must be at least 1");
        }
        if config.storage.native_step.as_secs() == 0 {
            anyhow::bail!("storage.native_step must be at least one second");
        }
        if config.stats.enabled && config.stats.interval.is_zero() {
            anyhow::bail!("stats.interval must be greater than zero");
        }
        if config.throttling.enabled && !(config.throttling.default_rate > 0.0) {
            anyhow::bail!("throttling.default_rate must be positive");
        }
        if let Some((tenant, _)) = config
            .throttling
            .tenants
            .iter()
            .find(|(_, rate)| !(**rate > 0.0))
        {
            anyhow::bail!("throttling rate for tenant '{tenant}' must be positive");
        }

        log::info!("Configuration is valid");
        Ok(())
    }
}
