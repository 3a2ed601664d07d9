//! Integration tests: full document sessions against the simulated resolver

use docx_bulk_editor::config::{Config, ReplacementRule};
use docx_bulk_editor::edit::ChangeKind;
use docx_bulk_editor::session::{
    process_batch, process_document, DocumentStatus, SessionContext,
};
use docx_bulk_editor::{Document, LookupClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn simulated_context(config: Config) -> Arc<SessionContext> {
    let ctx = SessionContext::new(config)
        .unwrap()
        .with_client(Arc::new(LookupClient::simulated()));
    Arc::new(ctx)
}

fn write_fixture(dir: &std::path::Path, name: &str, build: impl FnOnce(&mut Document)) -> PathBuf {
    let path = dir.join(name);
    let mut doc = Document::new();
    build(&mut doc);
    doc.save(&path).unwrap();
    path
}

#[tokio::test]
async fn active_link_gets_rewritten_url_and_content_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "active.docx", |doc| {
        doc.add_paragraph("intro");
        doc.append_hyperlink_paragraph("https://old.example.com/x?docid=TSRC-LIVE-000123", "Campaign Doc")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Processed);
    assert_eq!(result.hyperlinks_total, 1);
    assert_eq!(result.hyperlinks_updated, 1);
    assert_eq!(result.changes.count_of(ChangeKind::HyperlinkUpdated), 1);
    assert_eq!(result.changes.count_of(ChangeKind::ContentIdAdded), 1);

    let saved = Document::open(&path).unwrap();
    let links = saved.enumerate_hyperlinks();
    assert_eq!(links.len(), 1);
    assert_eq!(
        links[0].target.as_deref(),
        Some("https://thesource.example.com/nuxeo/thesource/#!/view?docid=TSRC-LIVE-000123")
    );
    assert_eq!(links[0].display_text, "Campaign Doc (000123)");
    assert!(!links[0].broken);
}

#[tokio::test]
async fn expired_link_gets_content_id_then_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "expired.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-EXPIRED-000222", "Old Policy")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Processed);

    let saved = Document::open(&path).unwrap();
    let links = saved.enumerate_hyperlinks();
    assert_eq!(links[0].display_text, "Old Policy (000222) - Expired");

    // Suffix uniqueness: one Expired, no Not Found, never both
    let text = &links[0].display_text;
    assert_eq!(text.matches(" - Expired").count(), 1);
    assert_eq!(text.matches(" - Not Found").count(), 0);
}

#[tokio::test]
async fn missing_link_gets_not_found_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "missing.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-MISSING-000333", "Gone Doc")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    let saved = Document::open(&path).unwrap();
    let links = saved.enumerate_hyperlinks();
    assert_eq!(links[0].display_text, "Gone Doc - Not Found");
}

#[tokio::test]
async fn already_suffixed_link_is_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "suffixed.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-MISSING-000444", "Gone - Not Found")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.changes.count_of(ChangeKind::HyperlinkStatusAdded), 0);
    let saved = Document::open(&path).unwrap();
    assert_eq!(
        saved.enumerate_hyperlinks()[0].display_text,
        "Gone - Not Found"
    );
}

#[tokio::test]
async fn invisible_link_is_swept() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "invisible.docx", |doc| {
        doc.add_paragraph("before");
        doc.append_hyperlink_paragraph("https://host/ghost", "").unwrap();
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-LIVE-000555", "Kept")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.changes.count_of(ChangeKind::HyperlinkRemoved), 1);

    let saved = Document::open(&path).unwrap();
    let links = saved.enumerate_hyperlinks();
    assert_eq!(links.len(), 1);
    assert!(links[0].display_text.starts_with("Kept"));
}

#[tokio::test]
async fn replacement_then_optimizer_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "replace.docx", |doc| {
        doc.add_paragraph("alpha beta   gamma");
    });

    let mut config = Config::default();
    config.text.replacements = vec![ReplacementRule::new("beta", "BETA")];

    let ctx = simulated_context(config);
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.changes.count_of(ChangeKind::TextReplaced), 1);
    assert!(result.changes.count_of(ChangeKind::TextOptimized) >= 1);

    let saved = Document::open(&path).unwrap();
    assert_eq!(saved.text(), "alpha BETA gamma");
}

#[tokio::test]
async fn round_trip_re_extraction_matches_written_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "roundtrip.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-LIVE-000777", "Rover")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    // Re-extract: what was written is what is read
    let saved = Document::open(&path).unwrap();
    let links = saved.enumerate_hyperlinks();
    assert_eq!(
        links[0].target.as_deref(),
        Some("https://thesource.example.com/nuxeo/thesource/#!/view?docid=TSRC-LIVE-000777")
    );
    assert_eq!(links[0].display_text, "Rover (000777)");
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "idempotent.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-LIVE-000888", "Stable")
            .unwrap();
    });

    let ctx = simulated_context(Config::default());
    process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();
    let first_bytes = std::fs::read(&path).unwrap();

    let second = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();
    let second_bytes = std::fs::read(&path).unwrap();

    assert_eq!(second.changes.count_of(ChangeKind::HyperlinkUpdated), 0);
    assert_eq!(second.changes.count_of(ChangeKind::ContentIdAdded), 0);
    assert_eq!(second.changes.count_of(ChangeKind::HyperlinkStatusAdded), 0);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn backup_is_created_next_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "backedup.docx", |doc| {
        doc.add_paragraph("text");
    });
    let original_bytes = std::fs::read(&path).unwrap();

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    let backup_path = result.backup_path.unwrap();
    assert!(backup_path.starts_with(dir.path().join("Backups")));
    assert_eq!(std::fs::read(&backup_path).unwrap(), original_bytes);
}

#[tokio::test]
async fn structural_failure_rolls_back_to_backup_bytes() {
    let dir = tempfile::tempdir().unwrap();

    // Two hyperlink elements sharing one relationship id: a structural
    // error the validator refuses at the initial stage.
    let path = {
        use docx_bulk_editor::document::{Hyperlink, Paragraph};
        let path = dir.path().join("shared-rel.docx");
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://host/a", "first")
            .unwrap();
        let mut para = Paragraph::default();
        para.add_hyperlink(Hyperlink::external(rid, "second"));
        doc.body_mut().add_paragraph(para);
        doc.save(&path).unwrap();
        path
    };
    let original_bytes = std::fs::read(&path).unwrap();

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Recovered);
    assert!(result.warning.is_some());
    assert_eq!(std::fs::read(&path).unwrap(), original_bytes);
}

#[tokio::test]
async fn invalid_package_fails_without_restore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-docx.docx");
    std::fs::write(&path, b"plain text, not a zip").unwrap();

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Failed);
    assert!(result.error.is_some());
    // The file itself is untouched
    assert_eq!(std::fs::read(&path).unwrap(), b"plain text, not a zip");
}

#[tokio::test]
async fn missing_file_fails_without_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.docx");

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Failed);
    assert!(result.backup_path.is_none());
    assert!(!dir.path().join("Backups").exists());
}

#[tokio::test]
async fn batch_processes_documents_and_dedupes_paths() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(dir.path(), "a.docx", |doc| {
        doc.append_hyperlink_paragraph("https://host/x?docid=TSRC-LIVE-000001", "A")
            .unwrap();
    });
    let b = write_fixture(dir.path(), "b.docx", |doc| {
        doc.add_paragraph("no links here");
    });
    let missing = dir.path().join("missing.docx");

    let ctx = simulated_context(Config::default());
    let paths = vec![a.clone(), b.clone(), a.clone(), missing.clone()];
    let outcome = process_batch(ctx, &paths, CancellationToken::new()).await;

    assert_eq!(outcome.total, 3); // duplicate dropped
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 3);

    let totals = outcome.change_totals();
    assert!(totals
        .iter()
        .any(|(kind, count)| *kind == ChangeKind::HyperlinkUpdated && *count == 1));
}

#[tokio::test]
async fn cancelled_batch_starts_no_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(dir.path(), "a.docx", |doc| {
        doc.add_paragraph("text");
    });

    let cancel = CancellationToken::new();
    cancel.cancel();

    let ctx = simulated_context(Config::default());
    let outcome = process_batch(ctx, &[a.clone()], cancel).await;

    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
    // The untouched file has no backup directory either
    assert!(!dir.path().join("Backups").exists());
}

#[tokio::test]
async fn metadata_is_extracted_from_core_properties() {
    use docx_bulk_editor::opc::{rel_types, Part, PartUri, CORE_PROPERTIES};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.docx");

    let mut doc = Document::new();
    doc.add_paragraph("body");
    let mut bytes = doc.to_bytes().unwrap();

    // Attach a core-properties part to the package
    let mut package = docx_bulk_editor::Package::from_bytes(&bytes).unwrap();
    let core_xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Batch Target</dc:title>
  <dc:creator>QA</dc:creator>
</cp:coreProperties>"#;
    package.add_part(Part::new(
        PartUri::new("/docProps/core.xml").unwrap(),
        CORE_PROPERTIES,
        core_xml.as_bytes().to_vec(),
    ));
    package.add_relationship(rel_types::CORE_PROPERTIES, "docProps/core.xml");
    bytes = package.to_bytes().unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let ctx = simulated_context(Config::default());
    let result = process_document(&ctx, &path, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.title.as_deref(), Some("Batch Target"));
    assert_eq!(result.metadata.author.as_deref(), Some("QA"));
}
