//! `sweep` command: run reconciliation jobs once.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;

use super::CliConfig;
use crate::tasks::{Job, Scheduler, SweepReport};

/// Which job `sweep` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepTarget {
    /// Regenerate every site in the manifest
    Refresh,
    /// Delete pages confirmed gone
    Deletions,
    /// Promote pages confirmed present
    Promotions,
    /// All three, in that order
    All,
}

impl SweepTarget {
    fn jobs(self) -> &'static [Job] {
        match self {
            Self::Refresh => &[Job::TreeRefresh],
            Self::Deletions => &[Job::DeletionSweep],
            Self::Promotions => &[Job::PromotionSweep],
            Self::All => &Job::ALL,
        }
    }
}

/// Run reconciliation jobs once and print what each changed.
#[derive(Args, Debug)]
pub struct SweepCommand {
    /// Job to run
    #[arg(value_enum, default_value_t = SweepTarget::All)]
    target: SweepTarget,
}

impl SweepCommand {
    /// Run the command.
    ///
    /// Failures inside a job are logged and counted, not returned.
    ///
    /// # Errors
    ///
    /// Fails only if the context cannot be built.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let scheduler = Scheduler::new(config.context().await?);
        for &job in self.target.jobs() {
            let report = scheduler.run(job).await;
            print_report(job, report);
        }
        Ok(())
    }
}

fn print_report(job: Job, report: SweepReport) {
    let label = format!("{job:?}");
    let failed = if report.failed > 0 {
        report.failed.to_string().red().bold()
    } else {
        report.failed.to_string().normal()
    };
    println!(
        "{:<16} processed {}  changed {}  skipped {}  failed {}",
        label.bold(),
        report.processed,
        report.changed.to_string().green(),
        report.skipped,
        failed
    );
}
