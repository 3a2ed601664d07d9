//! Single-document editing session
//!
//! The orchestrator runs one document through the full staged pipeline:
//! backup, open, sweep, resolve, rewrite, replace, optimize, validate,
//! save, post-validate. Any failure after the backup restores the
//! pre-image; the only error that crosses the session boundary is
//! cancellation.

pub mod backup;
pub mod batch;
pub mod progress;
pub mod validate;

pub use batch::{process_batch, BatchOutcome};
pub use progress::{BatchCounters, LogProgress, NullProgress, ProgressSink};
pub use validate::{stages, validate_in_session, validate_on_disk_with_retry};

use crate::config::Config;
use crate::document::{Document, DocumentMetadata};
use crate::edit::{
    apply_replacements, compile_rules, extract_hyperlink_records, optimize_text,
    rewrite_hyperlinks, sweep_invisible_links, unique_lookup_ids, ChangeLog, MutatorOptions,
    OptimizeOutcome,
};
use crate::error::{Error, Result};
use crate::lookup::{ApiProcessingResult, LookupCache, LookupClient};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Final state of one document session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Pipeline ran to completion and the file was saved
    Processed,
    /// A stage failed and the pre-image backup was restored
    Recovered,
    /// The document could not be processed or restored
    Failed,
}

/// The visible result of one document session
#[derive(Clone, Debug)]
pub struct DocumentResult {
    pub path: PathBuf,
    pub status: DocumentStatus,
    pub metadata: DocumentMetadata,
    pub backup_path: Option<PathBuf>,
    pub changes: ChangeLog,
    pub hyperlinks_total: usize,
    pub hyperlinks_updated: usize,
    pub optimize: Option<OptimizeOutcome>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl DocumentResult {
    fn empty(path: &Path, status: DocumentStatus) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
            metadata: DocumentMetadata::default(),
            backup_path: None,
            changes: ChangeLog::new(),
            hyperlinks_total: 0,
            hyperlinks_updated: 0,
            optimize: None,
            error: None,
            warning: None,
        }
    }
}

/// Collaborators injected into every session. Safe to share across
/// concurrent documents.
pub struct SessionContext {
    pub config: Arc<Config>,
    pub client: Arc<LookupClient>,
    pub cache: Option<Arc<LookupCache>>,
    pub progress: Arc<dyn ProgressSink>,
}

impl SessionContext {
    /// Wire up the default collaborators from configuration
    pub fn new(config: Config) -> Result<Self> {
        let client = LookupClient::new(&config.api)?;
        let cache = LookupCache::with_ttl(Duration::from_secs(config.cache.expiry_minutes * 60));
        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            cache: Some(Arc::new(cache)),
            progress: Arc::new(NullProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_client(mut self, client: Arc<LookupClient>) -> Self {
        self.client = client;
        self
    }
}

/// What the staged pipeline hands back on success
struct StageOutcome {
    metadata: DocumentMetadata,
    hyperlinks_total: usize,
    hyperlinks_updated: usize,
    optimize: Option<OptimizeOutcome>,
}

/// Run one document through the pipeline.
///
/// Always returns a [`DocumentResult`] except for cancellation, which
/// propagates after the backup has been restored.
pub async fn process_document(
    ctx: &SessionContext,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<DocumentResult> {
    ctx.progress.document_started(path);

    // Input errors: nothing was mutated, so nothing needs restoring
    if !path.is_file() {
        let mut result = DocumentResult::empty(path, DocumentStatus::Failed);
        result.error = Some(format!("file not found: {}", path.display()));
        ctx.progress
            .document_failed(path, result.error.as_deref().unwrap_or(""));
        return Ok(result);
    }

    // 1. Backup
    let backup_path = match backup::create_backup(path) {
        Ok(p) => p,
        Err(e) => {
            let mut result = DocumentResult::empty(path, DocumentStatus::Failed);
            result.error = Some(e.to_string());
            ctx.progress.document_failed(path, &e.to_string());
            return Ok(result);
        }
    };

    let mut changes = ChangeLog::new();
    match run_stages(ctx, path, cancel, &mut changes).await {
        Ok(outcome) => {
            ctx.progress.document_completed(path);
            Ok(DocumentResult {
                path: path.to_path_buf(),
                status: DocumentStatus::Processed,
                metadata: outcome.metadata,
                backup_path: Some(backup_path),
                changes,
                hyperlinks_total: outcome.hyperlinks_total,
                hyperlinks_updated: outcome.hyperlinks_updated,
                optimize: outcome.optimize,
                error: None,
                warning: None,
            })
        }
        Err(Error::Cancelled) => {
            // A session cancelled mid-mutation rolls back like any failure,
            // then the cancellation itself propagates.
            if let Err(restore_err) = rollback(&backup_path, path).await {
                warn!(
                    "rollback after cancellation failed for {}: {restore_err}",
                    path.display()
                );
            }
            ctx.progress.document_failed(path, "cancelled");
            Err(Error::Cancelled)
        }
        Err(e) => {
            warn!("session failed for {}: {e}", path.display());
            let mut result = DocumentResult::empty(path, DocumentStatus::Failed);
            result.backup_path = Some(backup_path.clone());
            result.changes = changes;

            // Input errors caught before the document was opened: nothing
            // was mutated, so there is nothing to restore.
            let failed_pre_mutation = matches!(
                &e,
                Error::Validation { stage, .. } if stage == stages::PRE_PROCESSING
            );
            if failed_pre_mutation {
                result.error = Some(e.to_string());
                ctx.progress
                    .document_failed(path, result.error.as_deref().unwrap_or(""));
                return Ok(result);
            }

            match rollback(&backup_path, path).await {
                Ok(()) => {
                    result.status = DocumentStatus::Recovered;
                    result.warning = Some(format!("restored from backup after error: {e}"));
                    info!("recovered {} from backup", path.display());
                }
                Err(restore_err) => {
                    result.error =
                        Some(format!("{e}; backup restore also failed: {restore_err}"));
                }
            }

            ctx.progress.document_failed(
                path,
                result
                    .warning
                    .as_deref()
                    .or(result.error.as_deref())
                    .unwrap_or(""),
            );
            Ok(result)
        }
    }
}

async fn rollback(backup_path: &Path, path: &Path) -> Result<()> {
    backup::restore_backup(backup_path, path)?;
    validate::validate_on_disk_with_retry(path, "rollback").await
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Fields the consuming word processor must recompute after link edits
fn field_needs_refresh(instr: &str) -> bool {
    let upper = instr.to_uppercase();
    ["TOC", "PAGE", "REF", "HYPERLINK"]
        .iter()
        .any(|k| upper.contains(k))
}

async fn run_stages(
    ctx: &SessionContext,
    path: &Path,
    cancel: &CancellationToken,
    changes: &mut ChangeLog,
) -> Result<StageOutcome> {
    let config = &ctx.config;
    let ignorable = &config.validation.ignorable_errors;

    // 2. Pre-check the file on disk
    ctx.progress.stage(path, stages::PRE_PROCESSING);
    validate_on_disk_with_retry(path, stages::PRE_PROCESSING).await?;
    ensure_not_cancelled(cancel)?;

    // 3. Open writable
    let mut doc = Document::open(path)?;
    validate_in_session(&doc, stages::INITIAL, ignorable)?;

    // 4. Snapshot relationships for rollback diagnostics
    let snapshot = doc.relationship_snapshot();
    changes.info(
        "document",
        format!("{} hyperlink relationship(s) at open", snapshot.len()),
    );

    // 5. Extract metadata
    let metadata = doc.metadata();

    // 6. Sweep invisible hyperlinks, then revalidate
    ctx.progress.stage(path, stages::POST_CLEANUP);
    let swept = sweep_invisible_links(&mut doc, changes);
    if swept > 0 {
        info!("{}: removed {swept} invisible hyperlink(s)", path.display());
    }
    validate_in_session(&doc, stages::POST_CLEANUP, ignorable)?;
    ensure_not_cancelled(cancel)?;

    // Extract hyperlink records from the cleaned document
    let mut records = extract_hyperlink_records(&doc);
    let hyperlinks_total = records.len();
    let ids = unique_lookup_ids(&records);
    changes.info(
        "document",
        format!(
            "{hyperlinks_total} hyperlink(s), {} lookup candidate(s)",
            ids.len()
        ),
    );

    // 7. Resolve via the shared client, through the cache when present
    let resolution = resolve_ids(ctx, &ids).await;
    if let Some(error) = &resolution.error {
        // Resolver trouble classifies ids as missing; it does not fail
        // the document.
        changes.info("resolver", format!("resolver unavailable: {error}"));
    }
    changes.info(
        "resolver",
        format!(
            "{} found, {} expired, {} missing",
            resolution.found.len(),
            resolution.expired.len(),
            resolution.missing.len()
        ),
    );
    ensure_not_cancelled(cancel)?;

    // 8. Rewrite hyperlinks, then revalidate
    ctx.progress.stage(path, stages::POST_HYPERLINKS);
    let options = MutatorOptions::from_config(config);
    let hyperlinks_updated =
        rewrite_hyperlinks(&mut doc, &mut records, &resolution.dictionary, &options, changes);
    validate_in_session(&doc, stages::POST_HYPERLINKS, ignorable)?;
    ensure_not_cancelled(cancel)?;

    // 9. User text replacements, then revalidate
    ctx.progress.stage(path, stages::POST_REPLACEMENTS);
    let rules = compile_rules(&config.active_replacements());
    if !rules.is_empty() {
        apply_replacements(&mut doc, &rules, config.text.track_changes, changes);
    }
    validate_in_session(&doc, stages::POST_REPLACEMENTS, ignorable)?;
    ensure_not_cancelled(cancel)?;

    // 10. Text optimization
    let optimize = if config.processing.optimize_text {
        Some(optimize_text(&mut doc, &config.text, changes))
    } else {
        None
    };

    // 11. Mark TOC/PAGE/REF/HYPERLINK fields dirty
    let marked = doc.mark_fields_dirty(&field_needs_refresh);
    if marked > 0 {
        changes.info("document", format!("{marked} field(s) marked for refresh"));
    }

    // 12. Final validation, then save
    ctx.progress.stage(path, stages::PRE_SAVE);
    validate_in_session(&doc, stages::PRE_SAVE, ignorable)?;
    validate_in_session(&doc, stages::PRE_SAVE_FINAL, ignorable)?;
    ensure_not_cancelled(cancel)?;
    doc.save(path)?;

    // 13. Close (guaranteed release)
    drop(doc);

    // 14. Post-save validation with retry
    ctx.progress.stage(path, stages::POST_SAVE);
    validate_on_disk_with_retry(path, stages::POST_SAVE).await?;

    Ok(StageOutcome {
        metadata,
        hyperlinks_total,
        hyperlinks_updated,
        optimize,
    })
}

async fn resolve_ids(ctx: &SessionContext, ids: &[String]) -> Arc<ApiProcessingResult> {
    if ids.is_empty() {
        return Arc::new(ApiProcessingResult::default());
    }

    match &ctx.cache {
        Some(cache) => {
            let mut key_parts: Vec<String> = ids.iter().map(|s| s.to_lowercase()).collect();
            key_parts.sort();
            let key = key_parts.join("\n");
            let client = Arc::clone(&ctx.client);
            let ids = ids.to_vec();
            cache
                .get_or_resolve(&key, move || async move { client.resolve_batch(&ids).await })
                .await
        }
        None => Arc::new(ctx.client.resolve_batch(ids).await),
    }
}
