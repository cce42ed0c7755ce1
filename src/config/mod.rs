//! Configuration: application settings and the static site manifest.

mod app;
mod sites;

pub use app::{AppConfig, TaskConfig, ValkeyConfig};
pub use sites::SiteManifest;
