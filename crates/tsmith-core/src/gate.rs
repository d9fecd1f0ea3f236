//! Per-target serialization of compilations.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Allows at most one in-flight compilation per resolved target path.
///
/// Manual calls and watch-triggered recompiles of the same file queue on the
/// same lock and run one after another.
#[derive(Debug, Default, Clone)]
pub struct CompileGate {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Held for the duration of one compilation.
///
/// Dropping it releases the lock and forgets the key once nobody else
/// holds or waits on it.
#[derive(Debug)]
pub struct GateGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PathBuf,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map is left
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CompileGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key under which `path` is serialized.
    pub fn key_for(path: &Path) -> PathBuf {
        std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Wait until no other compilation of `path` is running.
    pub async fn acquire(&self, path: &Path) -> GateGuard {
        let key = Self::key_for(path);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        GateGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: self.locks.clone(),
        }
    }

    /// Whether a compilation of `path` is currently running.
    pub fn is_busy(&self, path: &Path) -> bool {
        self.locks
            .get(&Self::key_for(path))
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of targets with a running or queued compilation.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
