//! Background reconciliation jobs.
//!
//! Three independent timers:
//!
//! - **Tree refresh**: regenerate every manifest site, skipping any that is
//!   already being regenerated. Also refreshes the lock registry against the
//!   manifest.
//! - **Deletion sweep**: delete `TO_DELETE` pages whose name is gone from the
//!   project's live tree.
//! - **Promotion sweep**: mark `NEW` pages `AVAILABLE` once the live tree
//!   contains them.
//!
//! A failure in one repository is logged and the sweep moves on.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SiteManifest;
use crate::constants::DEFAULT_PROJECT_NAME;
use crate::models::{Project, Webpage, WebpageStatus};
use crate::site_repository::{SiteContext, SiteRepository};

/// Tally of one job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Repositories or projects handled
    pub processed: usize,
    /// Rows or trees changed
    pub changed: usize,
    /// Repositories skipped because they were busy or have no repository
    pub skipped: usize,
    /// Repositories that failed
    pub failed: usize,
}

/// Which job to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Regenerate manifest sites
    TreeRefresh,
    /// Delete confirmed removals
    DeletionSweep,
    /// Promote confirmed new pages
    PromotionSweep,
}

impl Job {
    /// Every job.
    pub const ALL: [Self; 3] = [Self::TreeRefresh, Self::DeletionSweep, Self::PromotionSweep];

    const fn name(self) -> &'static str {
        match self {
            Self::TreeRefresh => "tree_refresh",
            Self::DeletionSweep => "deletion_sweep",
            Self::PromotionSweep => "promotion_sweep",
        }
    }
}

/// Runs the reconciliation jobs against a shared [`SiteContext`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    ctx: Arc<SiteContext>,
}

impl Scheduler {
    /// Scheduler over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<SiteContext>) -> Self {
        Self { ctx }
    }

    /// Run `job` once.
    pub async fn run(&self, job: Job) -> SweepReport {
        tracing::info!(target: "tasks", job = job.name(), "running scheduled job");
        let report = match job {
            Job::TreeRefresh => self.refresh_trees().await,
            Job::DeletionSweep => self.sweep_deletions().await,
            Job::PromotionSweep => self.sweep_promotions().await,
        };
        tracing::info!(
            target: "tasks",
            job = job.name(),
            processed = report.processed,
            changed = report.changed,
            skipped = report.skipped,
            failed = report.failed,
            "scheduled job finished"
        );
        report
    }

    /// Regenerate every site in the manifest without using the cache.
    pub async fn refresh_trees(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let manifest = match SiteManifest::load(&self.ctx.config.manifest_path()).await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!(target: "tasks", "cannot load site manifest: {e:#}");
                report.failed += 1;
                return report;
            }
        };

        self.ctx.locks.register(&manifest.sites);
        let keep: HashSet<String> = manifest.sites.iter().cloned().collect();
        self.ctx.locks.prune(&keep);

        for site in &manifest.sites {
            let repository = SiteRepository::on_default_branch(Arc::clone(&self.ctx), site.clone());
            match repository.regenerate_if_idle().await {
                Ok(Some(_)) => {
                    report.processed += 1;
                    report.changed += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(target: "tasks", uri = %site, "tree refresh failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Delete `TO_DELETE` pages that no longer exist in their project's tree.
    pub async fn sweep_deletions(&self) -> SweepReport {
        self.sweep(WebpageStatus::ToDelete, |page, live| !live.contains(&page.name), |ctx, page| async move {
            ctx.store.delete_webpage(page.id).await
        })
        .await
    }

    /// Promote `NEW` pages that exist in their project's tree.
    pub async fn sweep_promotions(&self) -> SweepReport {
        self.sweep(WebpageStatus::New, |page, live| live.contains(&page.name), |ctx, page| async move {
            ctx.store.update_status(page.id, WebpageStatus::Available).await
        })
        .await
    }

    async fn sweep<S, A, F>(&self, status: WebpageStatus, select: S, apply: A) -> SweepReport
    where
        S: Fn(&Webpage, &HashSet<String>) -> bool,
        A: Fn(Arc<SiteContext>, Webpage) -> F,
        F: Future<Output = Result<(), crate::core::SiteError>>,
    {
        let mut report = SweepReport::default();
        let grouped = match self.ctx.store.pages_by_project(status).await {
            Ok(grouped) => grouped,
            Err(e) => {
                tracing::error!(target: "tasks", %status, "cannot list pages: {e}");
                report.failed += 1;
                return report;
            }
        };

        for (project, pages) in grouped {
            let Some(live) = self.live_names(&project, &mut report).await else {
                continue;
            };
            report.processed += 1;

            for page in pages.into_iter().filter(|p| select(p, &live)) {
                let (id, name) = (page.id, page.name.clone());
                match apply(Arc::clone(&self.ctx), page).await {
                    Ok(()) => {
                        tracing::debug!(target: "tasks", project = %project.name, page = %name, id, %status, "page reconciled");
                        report.changed += 1;
                    }
                    Err(e) => {
                        tracing::error!(target: "tasks", project = %project.name, page = %name, "reconciliation failed: {e}");
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }

    async fn live_names(&self, project: &Project, report: &mut SweepReport) -> Option<HashSet<String>> {
        if project.name == DEFAULT_PROJECT_NAME {
            report.skipped += 1;
            return None;
        }
        let repository = SiteRepository::on_default_branch(Arc::clone(&self.ctx), project.name.clone());
        match repository.get_tree(false).await {
            Ok(tree) => Some(tree.names()),
            Err(e) => {
                tracing::error!(target: "tasks", project = %project.name, "cannot derive live pages: {e}");
                report.failed += 1;
                None
            }
        }
    }

    /// Start one timer task per job. Each runs immediately, then every
    /// configured interval, until `shutdown` flips to `true`.
    #[must_use]
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let tasks = &self.ctx.config.tasks;
        [
            (Job::TreeRefresh, tasks.tree_refresh_interval()),
            (Job::DeletionSweep, tasks.deletion_sweep_interval()),
            (Job::PromotionSweep, tasks.promotion_sweep_interval()),
        ]
        .into_iter()
        .map(|(job, period)| {
            let scheduler = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run_every(job, period, shutdown).await })
        })
        .collect()
    }

    async fn run_every(self, job: Job, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run(job).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(target: "tasks", job = job.name(), "scheduled job stopped");
    }
}
