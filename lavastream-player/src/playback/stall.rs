//! Stall diagnostics
//!
//! The worker marks each suspension point it enters with a [`StageGuard`];
//! the resulting stack says where a stuck track is waiting without needing
//! to capture a native backtrace from another thread. When no frame has been
//! produced for longer than the threshold, the executor reports a
//! [`DiagnosticSnapshot`] of that stack.

use super::executor::{ExecutorState, TrackExecutor};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Nested labels of the suspension points the worker is currently inside
#[derive(Default)]
pub struct StageStack {
    stages: Mutex<Vec<&'static str>>,
}

impl StageStack {
    fn lock(&self) -> MutexGuard<'_, Vec<&'static str>> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes `label`; it is popped when the guard drops
    pub fn enter(&self, label: &'static str) -> StageGuard<'_> {
        let mut stages = self.lock();
        let depth = stages.len();
        stages.push(label);
        StageGuard { stack: self, depth }
    }

    pub fn current(&self) -> Vec<&'static str> {
        self.lock().clone()
    }
}

pub struct StageGuard<'a> {
    stack: &'a StageStack,
    depth: usize,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.stack.lock().truncate(self.depth);
    }
}

/// What a track's worker was doing when it was found stuck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    pub state: ExecutorState,
    /// Outermost first
    pub stages: Vec<String>,
    pub last_produced_timecode_ms: Option<i64>,
    pub idle_ms: u64,
    pub worker: Option<String>,
}

impl fmt::Display for DiagnosticSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} for {} ms in [{}]",
            self.state,
            self.idle_ms,
            self.stages.join(" > ")
        )?;
        if let Some(worker) = &self.worker {
            write!(f, " on {}", worker)?;
        }
        Ok(())
    }
}

/// Periodically asks an executor to check itself for stalls
///
/// Stops when the executor finishes or the watchdog is dropped.
pub struct StallWatchdog {
    handle: JoinHandle<()>,
}

impl StallWatchdog {
    /// Must be called from within a tokio runtime
    pub fn spawn(executor: Arc<TrackExecutor>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if executor.is_finished() {
                    debug!(track = %executor.identifier(), "Stall watchdog done");
                    break;
                }
                executor.check_stall();
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for StallWatchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
