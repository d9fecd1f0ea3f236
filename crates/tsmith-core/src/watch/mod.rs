//! Watch sessions: recompile a file whenever it changes.
//!
//! The [`WatchSessionManager`] owns every live session, keyed by absolute
//! file path, and guarantees at most one open subscription per key.

mod notify_watcher;

pub use notify_watcher::{DEFAULT_DEBOUNCE_MS, NotifyWatcher};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::compile::{CompilationResult, CompileOrchestrator, CompileRequest};
use crate::error::{ToolchainError, ToolchainResult};
use crate::fs::FileSystem;
use crate::gate::CompileGate;

/// Capacity of the report broadcast channel.
const REPORT_CAPACITY: usize = 64;

/// Events delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched file changed.
    Changed(PathBuf),
    /// The underlying watcher reported a problem.
    Error(String),
}

/// Closes a subscription. Closing twice is a no-op.
pub trait WatchHandle: Send {
    fn close(&mut self);
}

/// An open subscription to changes of one file.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<WatchEvent>,
    pub handle: Box<dyn WatchHandle>,
}

/// File-change capability.
pub trait FileWatcher: Send + Sync {
    /// Start watching `path`. Events end when the handle is closed.
    fn watch(&self, path: &Path) -> ToolchainResult<Subscription>;
}

/// Returned when a watch session has been set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchAck {
    pub key: PathBuf,
    /// Whether an existing session for the key was replaced.
    pub replaced: bool,
}

/// Result of one watch-triggered recompile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchOutcome {
    Compiled(CompilationResult),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchReport {
    pub key: PathBuf,
    pub outcome: WatchOutcome,
}

struct WatchSession {
    handle: Box<dyn WatchHandle>,
    task: JoinHandle<()>,
}

impl WatchSession {
    fn close(mut self) {
        self.handle.close();
        self.task.abort();
    }
}

/// Owns watch sessions and schedules recompiles on change.
pub struct WatchSessionManager {
    watcher: Arc<dyn FileWatcher>,
    fs: Arc<dyn FileSystem>,
    compiler: CompileOrchestrator,
    sessions: Mutex<HashMap<PathBuf, WatchSession>>,
    reports: broadcast::Sender<WatchReport>,
}

impl WatchSessionManager {
    pub fn new(
        watcher: Arc<dyn FileWatcher>,
        fs: Arc<dyn FileSystem>,
        compiler: CompileOrchestrator,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            watcher,
            fs,
            compiler,
            sessions: Mutex::new(HashMap::new()),
            reports,
        }
    }

    /// Receive a [`WatchReport`] for every recompile from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<WatchReport> {
        self.reports.subscribe()
    }

    /// Start (or replace) the session for `request.file_path`.
    ///
    /// An existing session for the same file is closed before the new
    /// subscription is opened. Must be called from within a Tokio runtime.
    pub fn watch(&self, request: &CompileRequest) -> ToolchainResult<WatchAck> {
        let Some(file) = &request.file_path else {
            return Err(ToolchainError::InvalidRequest(
                "watch mode requires filePath".to_string(),
            ));
        };
        if !self.fs.is_file(file) {
            return Err(ToolchainError::SourceNotFound(file.clone()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ToolchainError::watch(format!("no async runtime: {}", e)))?;

        let key = CompileGate::key_for(file);
        let request = CompileRequest {
            file_path: Some(key.clone()),
            watch: false,
            ..request.clone()
        };

        let mut sessions = self.sessions.lock();
        let replaced = match sessions.remove(&key) {
            Some(old) => {
                tracing::info!(file = %key.display(), "replacing watch session");
                old.close();
                true
            }
            None => false,
        };

        let subscription = self.watcher.watch(&key)?;
        let task = runtime.spawn(run_session(
            key.clone(),
            subscription.events,
            self.compiler.clone(),
            request,
            self.reports.clone(),
        ));

        sessions.insert(
            key.clone(),
            WatchSession {
                handle: subscription.handle,
                task,
            },
        );
        tracing::info!(file = %key.display(), "watching for changes");

        Ok(WatchAck { key, replaced })
    }

    /// Stop the session for `path`. Returns whether one was active.
    pub fn stop(&self, path: &Path) -> bool {
        let key = CompileGate::key_for(path);
        let session = self.sessions.lock().remove(&key);
        match session {
            Some(session) => {
                session.close();
                tracing::info!(file = %key.display(), "stopped watching");
                true
            }
            None => false,
        }
    }

    /// Stop every session. Safe to call repeatedly; returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(PathBuf, WatchSession)> = self.sessions.lock().drain().collect();
        let count = drained.len();
        for (key, session) in drained {
            session.close();
            tracing::info!(file = %key.display(), "stopped watching");
        }
        count
    }

    /// Keys of all live sessions, sorted.
    pub fn active_sessions(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self.sessions.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Drop for WatchSessionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Event loop of one session. Each change spawns its own recompile task so a
/// slow compile never delays delivery of the next event.
async fn run_session(
    key: PathBuf,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    compiler: CompileOrchestrator,
    request: CompileRequest,
    reports: broadcast::Sender<WatchReport>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WatchEvent::Changed(path) => {
                tracing::info!(file = %key.display(), changed = %path.display(), "change detected, recompiling");
                tokio::spawn(recompile(
                    key.clone(),
                    compiler.clone(),
                    request.clone(),
                    reports.clone(),
                ));
            }
            WatchEvent::Error(message) => {
                tracing::warn!(file = %key.display(), error = %message, "watcher error");
            }
        }
    }
    tracing::debug!(file = %key.display(), "watch stream ended");
}

async fn recompile(
    key: PathBuf,
    compiler: CompileOrchestrator,
    request: CompileRequest,
    reports: broadcast::Sender<WatchReport>,
) {
    let outcome = match compiler.compile_file(&request).await {
        Ok(result) => {
            if result.success {
                tracing::info!(
                    file = %key.display(),
                    duration_ms = result.duration_ms,
                    outputs = result.output_files.len(),
                    "recompiled"
                );
            } else {
                tracing::warn!(
                    file = %key.display(),
                    errors = result.summary.error_count,
                    "recompile finished with errors"
                );
            }
            WatchOutcome::Compiled(result)
        }
        Err(e) => {
            tracing::error!(file = %key.display(), error = %e, "recompile failed");
            WatchOutcome::Failed(e.to_string())
        }
    };

    // No receivers is fine
    let _ = reports.send(WatchReport { key, outcome });
}
