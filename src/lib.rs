//! sitetree - site-tree synchronization engine
//!
//! Keeps local working copies of website template repositories, derives the
//! navigable page hierarchy from their templates, caches that hierarchy per
//! repository and branch, and mirrors it into a page store. Background jobs
//! reconcile the store with what the repositories actually contain.
//!
//! # Architecture Overview
//!
//! ```text
//!             ┌──────────────────────────┐
//!  tree ─────▶│ SiteRepository           │◀───── Scheduler (refresh/sweeps)
//!  remove     │  (site_repository)       │◀───── TreeWorkerPool (async path)
//!             └──┬──────┬──────┬──────┬──┘
//!                │      │      │      │
//!             cache   lock  checkout parser ──▶ store
//! ```
//!
//! - Reads go to the cache first. A miss takes the repository lock, brings
//!   the working copy to the branch tip, parses it, persists the pages and
//!   fills the cache.
//! - One lock per repository serializes everything that touches its working
//!   copy, in-process and across processes.
//! - Pages move `NEW` → `AVAILABLE` once the tree shows them, and
//!   `TO_DELETE` → deleted once the tree no longer does.
//!
//! # Modules
//!
//! ## Orchestration
//! - [`site_repository`] - Per-repository orchestrator and shared context
//! - [`tasks`] - Worker pool for the async read path and the scheduled jobs
//!
//! ## Collaborators
//! - [`cache`] - Tree cache with a Valkey backend and a filesystem fallback
//! - [`lock`] - Per-repository lock registry
//! - [`checkout`] - Working-copy lifecycle (clone, fetch, checkout, delete)
//! - [`git`] - Thin wrapper around the system `git`
//! - [`parser`] - Template parser producing the page tree
//! - [`store`] - SQLite page store and tree reconciliation
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line interface
//! - [`config`] - Application settings and the site manifest
//! - [`core`] - Error types and user-facing error formatting
//! - [`models`] - Page tree and page row types
//! - [`constants`] - Timeouts, prefixes and other fixed values
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Page tree of a repository, from the cache when possible
//! sitetree tree ubuntu.com
//!
//! # Force regeneration of a branch
//! sitetree tree ubuntu.com --branch staging --no-cache
//!
//! # Regenerate in the background, waiting at most a few seconds
//! sitetree tree ubuntu.com --async
//!
//! # Request removal of a page
//! sitetree remove ubuntu.com /about/press
//!
//! # Run the reconciliation jobs once, or forever
//! sitetree sweep all
//! sitetree serve
//! ```
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sitetree::config::AppConfig;
//! use sitetree::site_repository::{SiteContext, SiteRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None).await?;
//! let ctx = Arc::new(SiteContext::from_config(config).await?);
//! let tree = SiteRepository::on_default_branch(ctx, "ubuntu.com").get_tree(false).await?;
//! println!("{} pages", tree.names().len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod git;
pub mod lock;
pub mod models;
pub mod parser;
pub mod site_repository;
pub mod store;
pub mod tasks;

// Test utilities (available only in test builds or with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
