//! The static site manifest (`sites.yaml`).
//!
//! ```yaml
//! sites:
//!   - ubuntu.com
//!   - canonical.com
//! ```

use crate::core::SiteError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Repositories the scheduler keeps fresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteManifest {
    /// Repository URIs, in manifest order
    #[serde(default)]
    pub sites: Vec<String>,
}

impl SiteManifest {
    /// Parse manifest text. Blank entries are dropped and duplicates removed,
    /// keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::YamlError`] for malformed YAML.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: Self = serde_yaml::from_str(content).map_err(SiteError::from)?;
        let mut sites: Vec<String> = Vec::with_capacity(raw.sites.len());
        for site in raw.sites {
            let site = site.trim().to_string();
            if !site.is_empty() && !sites.contains(&site) {
                sites.push(site);
            }
        }
        Ok(Self { sites })
    }

    /// Load the manifest from disk. A missing file is an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Site manifest not found, no sites scheduled");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read site manifest {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse site manifest {}", path.display()))
    }

    /// Whether `uri` is listed.
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.sites.iter().any(|s| s == uri)
    }
}
