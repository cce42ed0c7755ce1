//! Integration test suite for sitetree
//!
//! End-to-end tests of the orchestrator, the worker pool, the scheduled jobs,
//! git working copies and the binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=lock=debug,cache=debug cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **orchestrator**: Cache-first reads, locking, retries and persistence (fakes)
//! - **async_path**: Worker pool and the bounded-wait read path (fakes)
//! - **reconciliation**: Promotion and deletion sweeps, tree refresh (fakes)
//! - **git_checkout**: Working copies cloned from local `file://` repositories
//! - **cli**: The compiled binary
//!
//! Tests that shell out to git or depend on timing are marked `#[serial]`.

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod async_path;
mod cli;
mod git_checkout;
mod orchestrator;
mod reconciliation;
