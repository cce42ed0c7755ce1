//! Data models: parsed page trees and persisted records.

mod tree;
mod webpage;

pub use tree::{NodeId, PageEntry, PageMeta, PageNode, PageTree, TreeResponse};
pub use webpage::{Project, Webpage, WebpageStatus};
