//! `serve` command: run the scheduled jobs until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::watch;

use super::CliConfig;
use crate::tasks::Scheduler;

/// Run tree refresh, deletion sweep and promotion sweep on their configured
/// intervals until Ctrl-C.
#[derive(Args, Debug)]
pub struct ServeCommand {}

impl ServeCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails if the context cannot be built or the signal handler cannot be
    /// installed.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = config.context().await?;
        tracing::info!(?ctx, "starting scheduler");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = Scheduler::new(ctx).spawn(&shutdown_rx);

        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        tracing::info!("shutting down");
        // Errs only when every job has already stopped.
        let _ = shutdown_tx.send(true);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(target: "tasks", "scheduled job ended abnormally: {e}");
            }
        }
        Ok(())
    }
}
