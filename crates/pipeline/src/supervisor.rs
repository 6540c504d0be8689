//! Tracks the background tasks of each transfer so they can be cancelled
//! individually or all at once on shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Kind of background work attached to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Upload,
    Reconstruct,
}

struct TaskEntry {
    generation: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Tasks {
    next_generation: u64,
    running: HashMap<(String, TaskKind), TaskEntry>,
}

type SharedTasks = Arc<Mutex<Tasks>>;

fn lock(tasks: &SharedTasks) -> std::sync::MutexGuard<'_, Tasks> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns and supervises per-transfer tasks.
///
/// Every task gets a child token of one root token. At most one task of each
/// [`TaskKind`] runs per transfer.
pub struct TaskSupervisor {
    root: CancellationToken,
    tracker: TaskTracker,
    tasks: SharedTasks,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            tasks: Arc::default(),
        }
    }

    /// Spawns `task` for `transfer_id` unless one of the same kind is
    /// already running or the supervisor has shut down. Returns whether the
    /// task was spawned.
    pub fn spawn<F, Fut>(&self, transfer_id: &str, kind: TaskKind, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }

        let key = (transfer_id.to_string(), kind);
        let mut tasks = lock(&self.tasks);
        if tasks.running.contains_key(&key) {
            return false;
        }

        let generation = tasks.next_generation;
        tasks.next_generation += 1;
        let cancel = self.root.child_token();
        let fut = task(cancel.clone());

        let shared = Arc::clone(&self.tasks);
        let done_key = key.clone();
        let handle = self.tracker.spawn(async move {
            fut.await;
            let mut tasks = lock(&shared);
            if tasks
                .running
                .get(&done_key)
                .is_some_and(|e| e.generation == generation)
            {
                tasks.running.remove(&done_key);
            }
        });

        debug!(transfer_id, ?kind, "task spawned");
        tasks.running.insert(
            key,
            TaskEntry {
                generation,
                cancel,
                handle: Some(handle),
            },
        );
        true
    }

    pub fn is_running(&self, transfer_id: &str, kind: TaskKind) -> bool {
        lock(&self.tasks)
            .running
            .contains_key(&(transfer_id.to_string(), kind))
    }

    /// Cancels every task of `transfer_id` and waits up to `timeout` for
    /// them to finish. Returns the number of tasks cancelled.
    pub async fn cancel(&self, transfer_id: &str, timeout: Duration) -> usize {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = lock(&self.tasks);
            let keys: Vec<(String, TaskKind)> = tasks
                .running
                .keys()
                .filter(|(id, _)| id == transfer_id)
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|key| tasks.running.remove(key))
                .filter_map(|mut entry| {
                    entry.cancel.cancel();
                    entry.handle.take()
                })
                .collect()
        };

        let count = handles.len();
        for handle in handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(transfer_id, error = %e, "cancelled task panicked"),
                Err(_) => warn!(transfer_id, "cancelled task did not stop in time"),
            }
        }
        if count > 0 {
            debug!(transfer_id, tasks = count, "tasks cancelled");
        }
        count
    }

    /// Number of tasks still running.
    pub fn running(&self) -> usize {
        lock(&self.tasks).running.len()
    }

    /// Cancels every task and waits up to `timeout` for them to finish.
    /// Returns `true` if all tasks finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.root.cancel();
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }
}
