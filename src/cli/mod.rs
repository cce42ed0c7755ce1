//! Command-line interface for sitetree.
//!
//! Every command loads the [`AppConfig`], wires a [`SiteContext`] and calls
//! into the library; none of them carry logic of their own.
//!
//! # Commands
//!
//! - `tree` - Print the page tree of a repository (cached, forced or async)
//! - `invalidate` - Mark a repository's cached tree stale
//! - `remove` - Request removal of a page
//! - `sweep` - Run reconciliation jobs once
//! - `serve` - Run the reconciliation jobs on their timers until interrupted
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - Debug logging
//! - `--quiet` / `-q` - Errors only
//! - `--config` / `-c` - Configuration file (also `SITETREE_CONFIG`)
//!
//! `RUST_LOG`, when set, overrides the level chosen by the flags.
//!
//! # Examples
//!
//! ```bash
//! sitetree tree ubuntu.com
//! sitetree tree ubuntu.com --branch staging --no-cache
//! sitetree remove ubuntu.com /about/press --json
//! sitetree sweep promotions
//! sitetree serve
//! ```

mod remove;
mod serve;
mod sweep;
mod tree;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::site_repository::SiteContext;

pub use remove::RemoveCommand;
pub use serve::ServeCommand;
pub use sweep::{SweepCommand, SweepTarget};
pub use tree::{InvalidateCommand, TreeCommand};

/// Site-tree synchronization engine.
#[derive(Parser, Debug)]
#[command(
    name = "sitetree",
    about = "Clone template repositories, derive their page trees and keep the page store in sync",
    version,
    long_about = None
)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    ///
    /// Defaults to `<config dir>/sitetree/config.toml`. A missing file means
    /// built-in defaults plus environment overrides.
    #[arg(short, long, global = true, env = "SITETREE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the page tree of a repository as JSON
    Tree(TreeCommand),

    /// Mark the cached tree of a repository as stale
    Invalidate(InvalidateCommand),

    /// Request removal of a page
    Remove(RemoveCommand),

    /// Run reconciliation jobs once and report what they changed
    Sweep(SweepCommand),

    /// Run the reconciliation jobs on their timers until Ctrl-C
    Serve(ServeCommand),
}

/// Settings derived from the global flags.
///
/// Split from [`Cli`] so tests can drive [`Cli::execute_with_config`] without
/// going through argument parsing.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Configuration file override
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the global tracing subscriber. Logs go to stderr so stdout
    /// stays machine-readable.
    ///
    /// Safe to call more than once; later calls are ignored.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(&self.log_level)
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }

    /// Load the application configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration file exists but is invalid.
    pub async fn load_app_config(&self) -> Result<AppConfig> {
        AppConfig::load(self.config_path.as_deref()).await
    }

    /// Load the configuration and wire the shared context.
    ///
    /// # Errors
    ///
    /// Fails if the configuration, database or manifest cannot be loaded.
    pub async fn context(&self) -> Result<Arc<SiteContext>> {
        let config = self.load_app_config().await?;
        Ok(Arc::new(SiteContext::from_config(config).await?))
    }
}

impl Cli {
    /// Run the parsed command.
    ///
    /// # Errors
    ///
    /// Returns whatever error stopped the command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            config_path: self.config.clone(),
        }
    }

    /// Run the command with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns whatever error stopped the command.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Tree(cmd) => cmd.execute(&config).await,
            Commands::Invalidate(cmd) => cmd.execute(&config).await,
            Commands::Remove(cmd) => cmd.execute(&config).await,
            Commands::Sweep(cmd) => cmd.execute(&config).await,
            Commands::Serve(cmd) => cmd.execute(&config).await,
        }
    }
}
