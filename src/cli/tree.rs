//! `tree` and `invalidate` commands.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use super::CliConfig;
use crate::site_repository::{SiteContext, SiteRepository};
use crate::tasks::TreeWorkerPool;

/// Print the page tree of a repository.
///
/// The output is the JSON body `{"name": <uri>, "templates": <tree>}`. When no
/// tree can be produced the placeholder tree is printed and the command still
/// succeeds; the failure is in the logs.
#[derive(Args, Debug)]
pub struct TreeCommand {
    /// Repository name (e.g. `ubuntu.com`) or full clone URL
    uri: String,

    /// Branch to read (defaults to the configured default branch)
    #[arg(short, long)]
    branch: Option<String>,

    /// Skip the cache and regenerate
    #[arg(long, conflicts_with = "background")]
    no_cache: bool,

    /// Regenerate on the worker pool and wait a bounded time for the result
    #[arg(long = "async", id = "background")]
    background: bool,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

impl TreeCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails only if the context cannot be built or the output cannot be
    /// serialized.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = config.context().await?;
        let repository = repository(&ctx, self.uri, self.branch);

        let response = if self.background {
            let tasks = &ctx.config.tasks;
            let pool = TreeWorkerPool::start(tasks.workers, tasks.queue_capacity);
            let response = repository.get_tree_async(&pool).await;
            // Let an unfinished job land in the cache before the process exits.
            pool.shutdown().await;
            response
        } else {
            repository.get_tree_sync(self.no_cache).await
        };

        let json = if self.compact {
            serde_json::to_string(&response)
        } else {
            serde_json::to_string_pretty(&response)
        }
        .context("Failed to serialize tree")?;
        println!("{json}");
        Ok(())
    }
}

/// Mark the cached tree of a repository as stale.
#[derive(Args, Debug)]
pub struct InvalidateCommand {
    /// Repository name or full clone URL
    uri: String,

    /// Branch whose cache entry to invalidate
    #[arg(short, long)]
    branch: Option<String>,
}

impl InvalidateCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails if the cache backend rejects the write.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = config.context().await?;
        let repository = repository(&ctx, self.uri, self.branch);
        repository.invalidate_cache().await?;
        println!("{} {}", "Invalidated".green().bold(), repository.cache_key());
        Ok(())
    }
}

fn repository(ctx: &Arc<SiteContext>, uri: String, branch: Option<String>) -> SiteRepository {
    match branch {
        Some(branch) => SiteRepository::new(Arc::clone(ctx), uri, branch),
        None => SiteRepository::on_default_branch(Arc::clone(ctx), uri),
    }
}
