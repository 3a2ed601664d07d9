//! Concurrency-bounded batch driver
//!
//! Fans documents out over a bounded pool of tokio tasks. The driver does
//! no document I/O itself: it deduplicates paths, hands each one to the
//! session orchestrator, and aggregates results and counters.

use crate::edit::ChangeKind;
use crate::error::Error;
use crate::session::{process_document, BatchCounters, DocumentResult, DocumentStatus, SessionContext};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Aggregate outcome of one batch run
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Per-document results, in completion order
    pub results: Vec<DocumentResult>,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    /// The batch was interrupted before all documents ran
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Change totals by kind across every document result
    pub fn change_totals(&self) -> Vec<(ChangeKind, usize)> {
        const KINDS: [ChangeKind; 10] = [
            ChangeKind::HyperlinkUpdated,
            ChangeKind::HyperlinkRemoved,
            ChangeKind::HyperlinkStatusAdded,
            ChangeKind::ContentIdAdded,
            ChangeKind::TitleReplaced,
            ChangeKind::PossibleTitleChange,
            ChangeKind::TextReplaced,
            ChangeKind::TextOptimized,
            ChangeKind::Information,
            ChangeKind::Error,
        ];

        KINDS
            .iter()
            .map(|kind| {
                let count = self
                    .results
                    .iter()
                    .map(|r| r.changes.count_of(*kind))
                    .sum();
                (*kind, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

/// Effective session bound: the configured maximum, capped at twice the
/// machine's available parallelism, never below one.
fn effective_concurrency(configured_max: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    configured_max.clamp(1, 2 * cores)
}

/// Process a batch of documents with bounded parallelism.
///
/// Paths are deduplicated preserving first occurrence, so no two workers
/// ever open the same file concurrently. Cancelling the token prevents
/// new sessions from starting and propagates into in-flight ones.
pub async fn process_batch(
    ctx: Arc<SessionContext>,
    paths: &[PathBuf],
    cancel: CancellationToken,
) -> BatchOutcome {
    let mut seen = HashSet::new();
    let paths: Vec<PathBuf> = paths
        .iter()
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect();

    let total = paths.len();
    let bound = effective_concurrency(ctx.config.processing.max_concurrent_documents);
    info!("processing {total} document(s) with up to {bound} concurrent session(s)");

    let semaphore = Arc::new(Semaphore::new(bound));
    let results: Arc<Mutex<Vec<DocumentResult>>> = Arc::new(Mutex::new(Vec::new()));
    let processed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut tasks = JoinSet::new();

    for path in paths {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let results = Arc::clone(&results);
        let processed = Arc::clone(&processed);
        let failed = Arc::clone(&failed);
        let cancelled = Arc::clone(&cancelled);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            // A cancelled batch starts no further sessions
            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled.store(true, Ordering::SeqCst);
                    return;
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
            };
            if cancel.is_cancelled() {
                cancelled.store(true, Ordering::SeqCst);
                return;
            }

            match process_document(&ctx, &path, &cancel).await {
                Ok(result) => {
                    match result.status {
                        DocumentStatus::Failed => {
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                        DocumentStatus::Processed | DocumentStatus::Recovered => {
                            processed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    ctx.progress.batch_progress(&BatchCounters {
                        total,
                        processed: processed.load(Ordering::SeqCst),
                        failed: failed.load(Ordering::SeqCst),
                        current: path.display().to_string(),
                    });
                    results.lock().push(result);
                }
                Err(Error::Cancelled) => {
                    cancelled.store(true, Ordering::SeqCst);
                }
                Err(e) => {
                    // The orchestrator should have folded this into a
                    // result; treat it as a failed document.
                    warn!("unexpected session error for {}: {e}", path.display());
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }

    while tasks.join_next().await.is_some() {}

    let results = Arc::try_unwrap(results)
        .map(Mutex::into_inner)
        .unwrap_or_default();

    BatchOutcome {
        total,
        processed: processed.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
        cancelled: cancelled.load(Ordering::SeqCst),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_concurrency_bounds() {
        assert_eq!(effective_concurrency(0), 1);
        assert!(effective_concurrency(1) == 1);

        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_concurrency(usize::MAX), 2 * cores);
    }
}
