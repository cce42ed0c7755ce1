//! Bounded pool of tree workers.
//!
//! Jobs go through a bounded `mpsc` queue; each carries a `oneshot` sender
//! for its outcome. Workers never queue behind an in-flight generation of the
//! same repository: they try the lock and report [`JobOutcome::Busy`]. A
//! caller that stops waiting does not cancel anything; the worker finishes and
//! the result lands in the cache.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::SiteError;
use crate::models::PageNode;
use crate::site_repository::SiteRepository;

/// What happened to a submitted job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// A fresh tree was generated and cached
    Generated(PageNode),
    /// Another generation held the repository lock
    Busy,
    /// Generation failed
    Failed(SiteError),
}

struct TreeJob {
    repository: SiteRepository,
    reply: oneshot::Sender<JobOutcome>,
}

/// Fixed set of workers draining a bounded job queue.
#[derive(Debug)]
pub struct TreeWorkerPool {
    sender: mpsc::Sender<TreeJob>,
    workers: Vec<JoinHandle<()>>,
}

impl TreeWorkerPool {
    /// Spawn `workers` tasks (at least one) behind a queue of `capacity` jobs.
    #[must_use]
    pub fn start(workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<TreeJob>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { worker(id, receiver).await })
            })
            .collect();

        Self { sender, workers }
    }

    /// Queue a regeneration of `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::RepositoryBusy`] if the queue is full or the pool
    /// has shut down.
    pub fn submit(&self, repository: SiteRepository) -> Result<oneshot::Receiver<JobOutcome>, SiteError> {
        let (reply, outcome) = oneshot::channel();
        let uri = repository.uri().to_string();
        self.sender
            .try_send(TreeJob { repository, reply })
            .map_err(|_| SiteError::RepositoryBusy { repository: uri })?;
        Ok(outcome)
    }

    /// Number of worker tasks.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, let queued ones finish, and wait for the workers.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::warn!(target: "tasks", "tree worker ended abnormally: {e}");
            }
        }
    }
}

async fn worker(id: usize, receiver: Arc<Mutex<mpsc::Receiver<TreeJob>>>) {
    tracing::debug!(target: "tasks", worker = id, "tree worker started");
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(TreeJob { repository, reply }) = job else {
            break;
        };

        let outcome = match repository.regenerate_if_idle().await {
            Ok(Some(tree)) => JobOutcome::Generated(tree),
            Ok(None) => JobOutcome::Busy,
            Err(e) => {
                tracing::error!(target: "tasks", worker = id, uri = %repository.uri(), "tree job failed: {e}");
                JobOutcome::Failed(e)
            }
        };
        // The caller may have stopped waiting.
        let _ = reply.send(outcome);
    }
    tracing::debug!(target: "tasks", worker = id, "tree worker stopped");
}
