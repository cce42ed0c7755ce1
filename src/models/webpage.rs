//! Persisted page records.

use crate::core::SiteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a persisted page.
///
/// `New` rows were seen by the last generation but not yet confirmed by a
/// reconciliation pass. `ToDelete` rows were asked to be removed and are
/// deleted once their template is gone from the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebpageStatus {
    /// First observed, awaiting confirmation
    New,
    /// Confirmed present in the repository
    Available,
    /// Removal requested
    ToDelete,
}

impl WebpageStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Available => "AVAILABLE",
            Self::ToDelete => "TO_DELETE",
        }
    }
}

impl fmt::Display for WebpageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebpageStatus {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "AVAILABLE" => Ok(Self::Available),
            "TO_DELETE" => Ok(Self::ToDelete),
            other => Err(SiteError::DatabaseError {
                operation: "decode status".to_string(),
                reason: format!("unknown webpage status '{other}'"),
            }),
        }
    }
}

/// One project per repository; `name` is the repository URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Row id
    pub id: i64,
    /// Repository URI
    pub name: String,
}

/// A page row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webpage {
    /// Row id
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Page slug, unique within the project
    pub name: String,
    /// Public URL path of the page
    pub url: String,
    /// Page title
    pub title: Option<String>,
    /// Page description
    pub description: Option<String>,
    /// Copy document link
    pub copy_doc_link: Option<String>,
    /// Parent page, `None` for the root
    pub parent_id: Option<i64>,
    /// Owning user, managed outside this crate
    pub owner_id: Option<i64>,
    /// Lifecycle state
    pub status: WebpageStatus,
}
