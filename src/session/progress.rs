//! Progress reporting
//!
//! The sink is shared across workers and must tolerate concurrent calls;
//! implementations are injected by the embedding application (CLI, GUI).

use log::info;
use std::path::Path;

/// Batch-level counters reported after every completed document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchCounters {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    /// Path of the document that just finished
    pub current: String,
}

/// Receiver for pipeline progress events
pub trait ProgressSink: Send + Sync {
    fn document_started(&self, _path: &Path) {}
    fn stage(&self, _path: &Path, _stage: &str) {}
    fn document_completed(&self, _path: &Path) {}
    fn document_failed(&self, _path: &Path, _error: &str) {}
    fn batch_progress(&self, _counters: &BatchCounters) {}
}

/// Sink that drops every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Sink that forwards events to the log facade
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn document_started(&self, path: &Path) {
        info!("processing {}", path.display());
    }

    fn stage(&self, path: &Path, stage: &str) {
        info!("{}: {stage}", path.display());
    }

    fn document_completed(&self, path: &Path) {
        info!("completed {}", path.display());
    }

    fn document_failed(&self, path: &Path, error: &str) {
        info!("failed {}: {error}", path.display());
    }

    fn batch_progress(&self, counters: &BatchCounters) {
        info!(
            "batch: {}/{} processed, {} failed",
            counters.processed + counters.failed,
            counters.total,
            counters.failed
        );
    }
}
