//! Background work: the tree worker pool behind the async read path, and the
//! periodic reconciliation scheduler.

mod pool;
mod scheduler;

pub use pool::{JobOutcome, TreeWorkerPool};
pub use scheduler::{Job, Scheduler, SweepReport};
