//! [`FileWatcher`] backed by `notify` with debouncing.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebouncedEventKind, Debouncer, new_debouncer};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{FileWatcher, Subscription, WatchEvent, WatchHandle};
use crate::error::{ToolchainError, ToolchainResult};

/// Default debounce delay in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Watches the parent directory of a file and forwards events for that file.
#[derive(Debug, Clone)]
pub struct NotifyWatcher {
    debounce: Duration,
}

impl Default for NotifyWatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }
}

impl NotifyWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self { debounce }
    }
}

struct NotifyHandle {
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl WatchHandle for NotifyHandle {
    fn close(&mut self) {
        // Dropping the debouncer stops its thread and the OS watch
        self.debouncer.take();
    }
}

impl FileWatcher for NotifyWatcher {
    fn watch(&self, path: &Path) -> ToolchainResult<Subscription> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let target = path.to_path_buf();
        let target_name = path.file_name().map(|n| n.to_os_string());

        let mut debouncer = new_debouncer(
            self.debounce,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(events) => {
                        let touched = events.iter().any(|e| {
                            e.kind == DebouncedEventKind::Any
                                && e.path.file_name().map(|n| n.to_os_string()) == target_name
                        });
                        if touched {
                            let _ = event_tx.send(WatchEvent::Changed(target.clone()));
                        }
                    }
                    Err(e) => {
                        let _ = event_tx.send(WatchEvent::Error(e.to_string()));
                    }
                }
            },
        )
        .map_err(|e| ToolchainError::watch(e.to_string()))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ToolchainError::watch(format!("{}: {}", dir.display(), e)))?;

        tracing::debug!(file = %path.display(), dir = %dir.display(), "opened file watch");
        Ok(Subscription {
            events: event_rx,
            handle: Box::new(NotifyHandle {
                debouncer: Some(debouncer),
            }),
        })
    }
}
