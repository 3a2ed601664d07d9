//! Structural integrity validation
//!
//! Two surfaces: in-session checks over an open document between pipeline
//! stages, and an on-disk probe with retry for freshly saved files.

use crate::document::{Document, FieldCharKind, ParagraphContent, RunContent};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Stage names used by the orchestrator
pub mod stages {
    pub const PRE_PROCESSING: &str = "pre-processing";
    pub const INITIAL: &str = "initial";
    pub const POST_CLEANUP: &str = "post-cleanup";
    pub const POST_HYPERLINKS: &str = "post-hyperlinks";
    pub const POST_REPLACEMENTS: &str = "post-replacements";
    pub const PRE_SAVE: &str = "pre-save";
    pub const PRE_SAVE_FINAL: &str = "pre-save-final";
    pub const POST_SAVE: &str = "post-save";
}

/// One structural finding
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub stage: String,
    pub description: String,
    pub element_id: String,
}

/// Run the structural checks over an open document and fail the stage on
/// any issue that survives the ignorable filter.
pub fn validate_in_session(doc: &Document, stage: &str, ignorable: &[String]) -> Result<()> {
    let issues = collect_issues(doc, stage);

    let remaining: Vec<ValidationIssue> = issues
        .into_iter()
        .filter(|issue| {
            let ignored = ignorable
                .iter()
                .any(|pat| contains_ci(&issue.description, pat));
            if ignored {
                debug!("ignoring validation issue at {stage}: {}", issue.description);
            }
            !ignored
        })
        .collect();

    if remaining.is_empty() {
        return Ok(());
    }

    let details = remaining
        .iter()
        .map(|i| format!("{} ({})", i.description, i.element_id))
        .collect::<Vec<_>>()
        .join("; ");
    Err(Error::Validation {
        stage: stage.to_string(),
        details,
    })
}

fn collect_issues(doc: &Document, stage: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let issue = |description: String, element_id: String| ValidationIssue {
        stage: stage.to_string(),
        description,
        element_id,
    };

    // Hyperlink relationship integrity: every referenced id resolves, and
    // no id is shared by more than one element.
    let mut references: HashMap<String, usize> = HashMap::new();
    for (index, info) in doc.enumerate_hyperlinks().iter().enumerate() {
        let element_id = format!("link-{}", index + 1);
        if let Some(rel_id) = &info.rel_id {
            *references.entry(rel_id.clone()).or_default() += 1;
            if info.broken {
                issues.push(issue(
                    format!("unresolved hyperlink relationship '{rel_id}'"),
                    element_id.clone(),
                ));
            } else if info
                .target
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(false)
            {
                issues.push(issue(
                    format!("hyperlink relationship '{rel_id}' has an empty target"),
                    element_id.clone(),
                ));
            }
        }
    }
    for (rel_id, count) in references {
        if count > 1 {
            issues.push(issue(
                format!("relationship '{rel_id}' is referenced by {count} hyperlink elements"),
                rel_id.clone(),
            ));
        }
    }

    // Paragraph-level structure: no text node under a field-code or
    // drawing ancestor, and tracked deletions carry w:delText only.
    for addr in doc.paragraph_addrs() {
        let Some(para) = doc.paragraph(&addr) else {
            continue;
        };
        let element_id = format!("{:?}", addr);

        // Open complex fields, innermost last; true once the field's
        // separator has been seen. Plain text is only legitimate after
        // the separator (the field result); inside an instruction
        // segment it is a structural violation.
        let mut open_fields: Vec<bool> = Vec::new();
        let in_instruction =
            |open_fields: &[bool]| matches!(open_fields.last(), Some(&false));

        for content in &para.content {
            match content {
                ParagraphContent::Run(run) => {
                    if run.has_drawing()
                        && run
                            .content
                            .iter()
                            .any(|c| matches!(c, RunContent::Text(t) if !t.trim().is_empty()))
                    {
                        issues.push(issue(
                            "text node alongside drawing content in one run".to_string(),
                            element_id.clone(),
                        ));
                    }

                    for rc in &run.content {
                        match rc {
                            RunContent::FieldChar(fc) => match fc.kind {
                                FieldCharKind::Begin => open_fields.push(false),
                                FieldCharKind::Separate => {
                                    if let Some(top) = open_fields.last_mut() {
                                        *top = true;
                                    }
                                }
                                FieldCharKind::End => {
                                    open_fields.pop();
                                }
                            },
                            RunContent::Text(t) => {
                                if !t.is_empty() && in_instruction(&open_fields) {
                                    issues.push(issue(
                                        "text node inside a field instruction segment"
                                            .to_string(),
                                        element_id.clone(),
                                    ));
                                }
                            }
                            _ => {}
                        }
                    }
                }
                ParagraphContent::Hyperlink(link) => {
                    if in_instruction(&open_fields) && !link.display_text().trim().is_empty() {
                        issues.push(issue(
                            "hyperlink text inside a field instruction segment".to_string(),
                            element_id.clone(),
                        ));
                    }
                }
                ParagraphContent::Insert(change) => {
                    let has_text = change
                        .runs
                        .iter()
                        .any(|r| !r.text().trim().is_empty());
                    if in_instruction(&open_fields) && has_text {
                        issues.push(issue(
                            "inserted text inside a field instruction segment".to_string(),
                            element_id.clone(),
                        ));
                    }
                }
                ParagraphContent::Delete(change) => {
                    let has_plain_text = change
                        .runs
                        .iter()
                        .flat_map(|r| r.content.iter())
                        .any(|c| matches!(c, RunContent::Text(t) if !t.is_empty()));
                    if has_plain_text {
                        issues.push(issue(
                            "plain text node inside a tracked deletion".to_string(),
                            element_id.clone(),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    issues
}

/// Open the saved file read-only and touch the body text to force lazy
/// parsing. "File in use" errors are retried up to 3 times with linear
/// backoff (100 ms x attempt).
pub async fn validate_on_disk_with_retry(path: &Path, stage: &str) -> Result<()> {
    const MAX_ATTEMPTS: u32 = 3;

    let mut attempt = 1;
    loop {
        match probe_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_file_in_use() && attempt < MAX_ATTEMPTS => {
                warn!(
                    "{stage}: file in use reading {} (attempt {attempt}/{MAX_ATTEMPTS}), retrying",
                    path.display()
                );
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(Error::Validation {
                    stage: stage.to_string(),
                    details: format!("{}: {e}", path.display()),
                })
            }
        }
    }
}

fn probe_file(path: &Path) -> Result<()> {
    let doc = Document::open(path)?;
    // Force a full body parse
    let _ = doc.text();
    Ok(())
}

fn contains_ci(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Hyperlink, Paragraph};

    #[test]
    fn test_clean_document_passes() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com", "link")
            .unwrap();
        assert!(validate_in_session(&doc, stages::INITIAL, &[]).is_ok());
    }

    #[test]
    fn test_broken_relationship_flagged_and_filterable() {
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://example.com", "visible")
            .unwrap();
        doc.delete_hyperlink_relationship(&rid);

        let err = validate_in_session(&doc, stages::INITIAL, &[]).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        // The configured ignorable filter silences it
        let ignorable = vec!["unresolved hyperlink relationship".to_string()];
        assert!(validate_in_session(&doc, stages::INITIAL, &ignorable).is_ok());
    }

    #[test]
    fn test_shared_relationship_id_flagged() {
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://example.com", "first")
            .unwrap();

        let mut para = Paragraph::default();
        para.add_hyperlink(Hyperlink::external(rid, "second"));
        doc.body_mut().add_paragraph(para);

        let err = validate_in_session(&doc, stages::PRE_SAVE, &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("referenced by 2 hyperlink elements"));
    }

    #[test]
    fn test_ignorable_filter_is_case_insensitive() {
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://example.com", "x")
            .unwrap();
        doc.delete_hyperlink_relationship(&rid);

        let ignorable = vec!["UNRESOLVED HYPERLINK".to_string()];
        assert!(validate_in_session(&doc, stages::INITIAL, &ignorable).is_ok());
    }

    #[test]
    fn test_text_inside_instruction_segment_flagged() {
        use crate::document::{FieldChar, Run, RunContent};

        let mut doc = Document::new();
        let mut para = Paragraph::default();

        let mut begin = Run::default();
        begin.content.push(RunContent::FieldChar(FieldChar {
            kind: FieldCharKind::Begin,
            dirty: false,
            extra_attrs: Vec::new(),
        }));
        para.add_run(begin);
        // Plain text where only instruction text belongs
        para.add_run(Run::new("stray"));
        let mut end = Run::default();
        end.content.push(RunContent::FieldChar(FieldChar {
            kind: FieldCharKind::End,
            dirty: false,
            extra_attrs: Vec::new(),
        }));
        para.add_run(end);
        doc.body_mut().add_paragraph(para);

        let err = validate_in_session(&doc, stages::PRE_SAVE, &[]).unwrap_err();
        assert!(err.to_string().contains("field instruction segment"));
    }

    #[test]
    fn test_field_result_text_is_legitimate() {
        use crate::document::{FieldChar, Run, RunContent};

        let field_char = |kind| {
            let mut run = Run::default();
            run.content.push(RunContent::FieldChar(FieldChar {
                kind,
                dirty: false,
                extra_attrs: Vec::new(),
            }));
            run
        };

        let mut doc = Document::new();
        let mut para = Paragraph::default();
        para.add_run(field_char(FieldCharKind::Begin));
        let mut instr = Run::default();
        instr.content.push(RunContent::InstrText(" PAGE ".to_string()));
        para.add_run(instr);
        para.add_run(field_char(FieldCharKind::Separate));
        // Computed field result
        para.add_run(Run::new("3"));
        para.add_run(field_char(FieldCharKind::End));
        para.add_run(Run::new("after the field"));
        doc.body_mut().add_paragraph(para);

        assert!(validate_in_session(&doc, stages::PRE_SAVE, &[]).is_ok());
    }

    #[test]
    fn test_text_in_drawing_run_flagged() {
        use crate::document::{Run, RunContent};
        use crate::xml::{RawXmlElement, RawXmlNode};

        let mut doc = Document::new();
        let mut para = Paragraph::default();
        let mut run = Run::new("caption");
        run.content.push(RunContent::Unknown(RawXmlNode::Element(
            RawXmlElement::new("w:drawing"),
        )));
        para.add_run(run);
        doc.body_mut().add_paragraph(para);

        let err = validate_in_session(&doc, stages::INITIAL, &[]).unwrap_err();
        assert!(err.to_string().contains("drawing content"));
    }

    #[tokio::test]
    async fn test_on_disk_validation_missing_file_fails() {
        let err = validate_on_disk_with_retry(Path::new("/nonexistent/file.docx"), stages::POST_SAVE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_on_disk_validation_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid.docx");

        let mut doc = Document::new();
        doc.add_paragraph("content");
        doc.save(&path).unwrap();

        validate_on_disk_with_retry(&path, stages::POST_SAVE)
            .await
            .unwrap();
    }
}
