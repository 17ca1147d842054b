use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::workspace::canonical_path_key;

/// Serializes Git work per repository directory. Tokio's mutex is fair, so
/// waiters run in arrival order.
#[derive(Default)]
pub struct ProjectTaskQueue {
    lanes: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProjectTaskQueue {
    pub fn new() -> Self {
        ProjectTaskQueue::default()
    }

    fn lanes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn acquire(&self, path: &str) -> LaneTurn<'_> {
        let key = canonical_path_key(Path::new(path));
        let lane = self.lanes().entry(key.clone()).or_default().clone();
        let guard = lane.clone().lock_owned().await;
        LaneTurn {
            queue: self,
            key,
            lane: Some(lane),
            guard: Some(guard),
        }
    }

    pub async fn run<F, T>(&self, path: &str, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _turn = self.acquire(path).await;
        task.await
    }

    /// Drops the lane for `key` once nobody holds or waits on it.
    fn prune(&self, key: &str) {
        let mut lanes = self.lanes();
        if lanes.get(key).is_some_and(|lane| Arc::strong_count(lane) == 1) {
            lanes.remove(key);
        }
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        self.lanes().len()
    }
}

/// Exclusive turn on one repository lane. Releasing it hands the lane to the
/// next waiter, or forgets the lane when the queue for that path is empty.
pub struct LaneTurn<'a> {
    queue: &'a ProjectTaskQueue,
    key: String,
    lane: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LaneTurn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.lane.take();
        self.queue.prune(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_runs_in_arrival_order() {
        let queue = Arc::new(ProjectTaskQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first_guard = queue.acquire("/repo/api").await;
        let mut handles = Vec::new();
        for index in 0..3 {
            let queue = queue.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run("/repo/api/", async {
                        log.lock().unwrap().push(index);
                    })
                    .await;
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(log.lock().unwrap().is_empty());
        drop(first_guard);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn finished_lanes_are_forgotten() {
        let queue = Arc::new(ProjectTaskQueue::new());
        queue.run("/repo/api", async {}).await;
        queue.run("/repo/web", async {}).await;
        assert_eq!(queue.lane_count(), 0);

        let held = queue.acquire("/repo/api").await;
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.run("/repo/api/", async {}).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.lane_count(), 1);
        drop(held);
        waiter.await.unwrap();
        assert_eq!(queue.lane_count(), 0);
    }

    #[tokio::test]
    async fn different_paths_do_not_block_each_other() {
        let queue = ProjectTaskQueue::new();
        let _held = queue.acquire("/repo/api").await;
        let value = queue.run("/repo/web", async { 7 }).await;
        assert_eq!(value, 7);
    }
}
