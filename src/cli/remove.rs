//! `remove` command: request removal of a page.
//!
//! The page is marked `TO_DELETE` and the repository's cached tree is
//! invalidated. The row itself disappears later, once the deletion sweep sees
//! the page gone from the live tree.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use super::CliConfig;
use crate::core::user_friendly_error;
use crate::site_repository::SiteRepository;

/// Request removal of a page.
#[derive(Args, Debug)]
pub struct RemoveCommand {
    /// Repository (project) the page belongs to
    uri: String,

    /// Page name, e.g. `/about/press`
    page: String,

    /// Print the updated page, or the error body, as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl RemoveCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::SiteError::PageNotFound`] for an unknown page, or
    /// the database or cache error that stopped the request.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = config.context().await?;
        let repository = SiteRepository::on_default_branch(Arc::clone(&ctx), self.uri.clone());

        match repository.remove_page(&self.page).await {
            Ok(webpage) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&webpage).context("Failed to serialize page")?);
                } else {
                    println!(
                        "{} {} in {} ({})",
                        "Removal requested for".green().bold(),
                        webpage.name,
                        self.uri,
                        webpage.status
                    );
                }
                Ok(())
            }
            Err(e) => {
                if self.json {
                    let payload = user_friendly_error(e.clone().into()).to_payload();
                    println!("{}", serde_json::to_string_pretty(&payload).context("Failed to serialize error")?);
                }
                Err(e.into())
            }
        }
    }
}
