//! 内存键锁：串行化同一文档的缩略图渲染。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Manages asynchronous mutexes keyed by document name.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 在给定超时时间内获取键锁，超时返回 `None`。
    pub async fn lock_with_timeout(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned()).await.ok()
    }

    /// 移除当前无人持有的锁条目。
    pub async fn prune_idle(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_lock_times_out_while_held() {
        let manager = LockManager::new();
        let guard = manager
            .lock_with_timeout("report.pdf", Duration::from_millis(50))
            .await;
        assert!(guard.is_some());

        let contended = manager
            .lock_with_timeout("report.pdf", Duration::from_millis(20))
            .await;
        assert!(contended.is_none());

        let other = manager
            .lock_with_timeout("other.pdf", Duration::from_millis(20))
            .await;
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let manager = LockManager::new();
        let held = manager
            .lock_with_timeout("held.pdf", Duration::from_millis(50))
            .await;
        drop(
            manager
                .lock_with_timeout("idle.pdf", Duration::from_millis(50))
                .await,
        );

        manager.prune_idle().await;
        assert_eq!(manager.len().await, 1);
        drop(held);
        manager.prune_idle().await;
        assert_eq!(manager.len().await, 0);
    }
}
