//! Hyperlink resolve-and-rewrite state machine
//!
//! For each extracted hyperlink with a lookup id: rewrite the URL through
//! an atomic relationship swap, upgrade or append the trailing content-id
//! pattern, then append a status suffix. Ordering is fixed: URL first,
//! content id second, status suffix last, and all display-text edits land
//! in one replace operation per hyperlink.

use crate::config::Config;
use crate::document::{Document, HyperlinkAddr};
use crate::edit::changelog::{ChangeKind, ChangeLog};
use crate::edit::hyperlinks::{ActionTaken, HyperlinkRecord, ResolvedStatus};
use crate::error::Result;
use crate::lookup::{DocumentRecord, RecordDictionary};
use log::{debug, warn};
use regex::Regex;
use std::sync::OnceLock;

const EXPIRED_SUFFIX: &str = " - Expired";
const NOT_FOUND_SUFFIX: &str = " - Not Found";

/// Settings the mutator needs from the configuration
#[derive(Clone, Debug)]
pub struct MutatorOptions {
    /// Host the rewritten URLs point at
    pub document_base_url: String,
    pub auto_replace_titles: bool,
    pub report_title_differences: bool,
}

impl MutatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            document_base_url: config.api.document_base_url.clone(),
            auto_replace_titles: config.validation.auto_replace_titles,
            report_title_differences: config.validation.report_title_differences,
        }
    }
}

/// Rewrite every resolvable hyperlink in the document.
///
/// Individual hyperlink failures are isolated: logged, recorded as Error
/// entries, and processing continues. Returns the number of hyperlinks
/// that changed.
pub fn rewrite_hyperlinks(
    doc: &mut Document,
    records: &mut [HyperlinkRecord],
    dictionary: &RecordDictionary,
    options: &MutatorOptions,
    changes: &mut ChangeLog,
) -> usize {
    let mut updated = 0;

    for record in records.iter_mut().filter(|r| r.requires_update) {
        let outcome = match dictionary.get(&record.lookup_id).cloned() {
            Some(api_record) => rewrite_record(doc, record, &api_record, options, changes),
            None => mark_not_found(doc, record, changes),
        };

        match outcome {
            Ok(true) => {
                record.action_taken = ActionTaken::Updated;
                updated += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("hyperlink {} failed: {e}", record.id);
                changes.error(&record.id, format!("hyperlink update failed: {e}"));
            }
        }
    }

    updated
}

/// Apply the full rewrite sequence for one matched hyperlink
fn rewrite_record(
    doc: &mut Document,
    record: &mut HyperlinkRecord,
    api_record: &DocumentRecord,
    options: &MutatorOptions,
    changes: &mut ChangeLog,
) -> Result<bool> {
    let mut changed = false;

    record.document_id = api_record.document_id.clone();
    record.content_id = api_record.content_id.clone();
    record.api_title = api_record.title.clone();
    record.resolved = if api_record.is_expired() {
        ResolvedStatus::Expired
    } else if api_record.is_not_found() {
        ResolvedStatus::NotFound
    } else {
        ResolvedStatus::Active
    };

    // 1. URL rewrite via atomic relationship swap. Prefer the document id;
    //    fall back to the content id; with neither, keep the original URL.
    let target_docid = if !api_record.document_id.is_empty() {
        api_record.document_id.as_str()
    } else {
        api_record.content_id.as_str()
    };

    if !target_docid.is_empty() {
        let target = build_target_url(&options.document_base_url, target_docid);
        if target != record.original_url {
            let new_id =
                swap_relationship(doc, &record.addr, record.rel_id.as_deref(), &target)?;
            record.rel_id = Some(new_id);
            changes.record(
                ChangeKind::HyperlinkUpdated,
                &record.id,
                &record.original_url,
                &target,
                "URL rewritten to authoritative target",
            );
            record.updated_url = Some(target);
            changed = true;
        }
    }

    // Suffix flags are taken from the display text as it was before any
    // mutation in this session.
    let original_display = record.display_text.clone();
    let already_expired = ends_with_ci(&original_display, EXPIRED_SUFFIX);
    let already_not_found = ends_with_ci(&original_display, NOT_FOUND_SUFFIX);
    let mut display = original_display.clone();

    // 2. Content-id pattern: 5->6 upgrade or append
    if !already_expired && !already_not_found && !api_record.content_id.is_empty() {
        if let Some(new_display) = append_content_id(&display, &api_record.content_id) {
            changes.record(
                ChangeKind::ContentIdAdded,
                &record.id,
                &display,
                &new_display,
                "",
            );
            display = new_display;
            changed = true;
        }
    }

    // 3. Title comparison happens against the display minus any status
    //    suffix and minus its trailing content pattern.
    if !api_record.title.is_empty() {
        let base = strip_trailing_content_pattern(strip_status_suffix(&display));
        if !base.eq_ignore_ascii_case(api_record.title.trim()) {
            if options.auto_replace_titles {
                let mut new_display = titled_display(api_record);
                // A pre-existing status suffix survives the title rewrite
                if already_expired {
                    new_display.push_str(EXPIRED_SUFFIX);
                } else if already_not_found {
                    new_display.push_str(NOT_FOUND_SUFFIX);
                }
                changes.record(
                    ChangeKind::TitleReplaced,
                    &record.id,
                    &display,
                    &new_display,
                    "display text replaced with resolver title",
                );
                display = new_display;
                changed = true;
            } else if options.report_title_differences {
                changes.record(
                    ChangeKind::PossibleTitleChange,
                    &record.id,
                    base,
                    &api_record.title,
                    "display text differs from resolver title",
                );
            }
        }
    }

    // 4. Status suffix, at most one, never both
    if api_record.is_expired() && !already_expired {
        let new_display = format!("{display}{EXPIRED_SUFFIX}");
        changes.record(
            ChangeKind::HyperlinkStatusAdded,
            &record.id,
            &display,
            &new_display,
            "",
        );
        display = new_display;
        changed = true;
    } else if api_record.is_not_found() && !already_expired && !already_not_found {
        let new_display = format!("{display}{NOT_FOUND_SUFFIX}");
        changes.record(
            ChangeKind::HyperlinkStatusAdded,
            &record.id,
            &display,
            &new_display,
            "",
        );
        display = new_display;
        changed = true;
    }

    // 5. Commit all display-text edits in a single replace operation
    if display != original_display {
        doc.replace_hyperlink_display_text(&record.addr, display.clone())?;
        record.display_text = display.clone();
        record.updated_display_text = Some(display);
    }

    Ok(changed)
}

/// Unmatched hyperlink: append " - Not Found" unless a status suffix is
/// already present.
fn mark_not_found(
    doc: &mut Document,
    record: &mut HyperlinkRecord,
    changes: &mut ChangeLog,
) -> Result<bool> {
    let already_suffixed = ends_with_ci(&record.display_text, EXPIRED_SUFFIX)
        || ends_with_ci(&record.display_text, NOT_FOUND_SUFFIX);

    record.resolved = ResolvedStatus::NotFound;

    if already_suffixed {
        debug!("hyperlink {} already carries a status suffix", record.id);
        return Ok(false);
    }

    let new_display = format!("{}{NOT_FOUND_SUFFIX}", record.display_text);
    doc.replace_hyperlink_display_text(&record.addr, new_display.clone())?;
    changes.record(
        ChangeKind::HyperlinkStatusAdded,
        &record.id,
        &record.display_text,
        &new_display,
        "no authoritative record for lookup id",
    );
    record.display_text = new_display.clone();
    record.updated_display_text = Some(new_display);
    Ok(true)
}

/// Atomic relationship swap: create new, rebind the element, delete old.
/// A half-created relationship is deleted again on any failure. Never
/// deletes before creating. Returns the new relationship id.
fn swap_relationship(
    doc: &mut Document,
    addr: &HyperlinkAddr,
    old_rel_id: Option<&str>,
    target: &str,
) -> Result<String> {
    let new_id = doc.add_hyperlink_relationship(target, None)?;

    if let Err(e) = doc.set_hyperlink_rel_id(addr, &new_id) {
        doc.delete_hyperlink_relationship(&new_id);
        return Err(e);
    }

    // A formerly internal link is external now; the fragment lives in the
    // relationship target.
    if let Some(link) = doc.hyperlink_mut(addr) {
        link.anchor = None;
    }

    if let Some(old_id) = old_rel_id {
        // Tolerates already-deleted
        doc.delete_hyperlink_relationship(old_id);
    }

    Ok(new_id)
}

/// Authoritative URL shape; the `#!` fragment is emitted verbatim.
pub fn build_target_url(base_url: &str, docid: &str) -> String {
    format!(
        "{}/nuxeo/thesource/#!/view?docid={}",
        base_url.trim_end_matches('/'),
        docid
    )
}

/// Compute the display text after the content-id step, or None when no
/// change is needed.
///
/// `last6` pads a short content id to six digits first; `last5` derives
/// from the padded value.
fn append_content_id(display: &str, content_id: &str) -> Option<String> {
    let padded = format!("{:0>6}", content_id);
    let last6: String = {
        let chars: Vec<char> = padded.chars().collect();
        chars[chars.len().saturating_sub(6)..].iter().collect()
    };
    let last5: String = last6.chars().skip(1).collect();

    let pat5 = format!(" ({last5})");
    let pat6 = format!(" ({last6})");

    if display.ends_with(&pat5) && !display.ends_with(&pat6) {
        // 5->6 digit upgrade of the trailing pattern
        return Some(format!(
            "{}{}",
            &display[..display.len() - pat5.len()],
            pat6
        ));
    }

    // A stale trailing pattern is replaced rather than doubled up: the
    // display text carries at most one trailing content-id pattern.
    if let Some(m) = trailing_pattern().find(display) {
        return if display[m.start()..] == pat6 {
            None
        } else {
            Some(format!("{}{}", &display[..m.start()], pat6))
        };
    }

    if !contains_ci(display, &pat6) {
        Some(format!("{}{}", display.trim_end(), pat6))
    } else {
        None
    }
}

fn trailing_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" \([0-9]{6}\)$").expect("pattern is valid"))
}

/// Display text used when auto-replacing titles
fn titled_display(api_record: &DocumentRecord) -> String {
    if api_record.content_id.is_empty() {
        return api_record.title.clone();
    }
    let padded = format!("{:0>6}", api_record.content_id);
    let last6: String = {
        let chars: Vec<char> = padded.chars().collect();
        chars[chars.len().saturating_sub(6)..].iter().collect()
    };
    format!("{} ({})", api_record.title, last6)
}

/// Strip one trailing " (dddddd)" pattern for title comparison
fn strip_trailing_content_pattern(display: &str) -> &str {
    match trailing_pattern().find(display) {
        Some(m) => display[..m.start()].trim_end(),
        None => display.trim(),
    }
}

/// Strip one trailing status suffix, when present
fn strip_status_suffix(display: &str) -> &str {
    for suffix in [EXPIRED_SUFFIX, NOT_FOUND_SUFFIX] {
        if ends_with_ci(display, suffix) {
            return display[..display.len() - suffix.len()].trim_end();
        }
    }
    display
}

fn ends_with_ci(text: &str, suffix: &str) -> bool {
    if text.len() < suffix.len() {
        return false;
    }
    let start = text.len() - suffix.len();
    text.is_char_boundary(start) && text[start..].eq_ignore_ascii_case(suffix)
}

fn contains_ci(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn options() -> MutatorOptions {
        MutatorOptions {
            document_base_url: "https://thesource.example.com".to_string(),
            auto_replace_titles: false,
            report_title_differences: true,
        }
    }

    fn api_record(doc_id: &str, content_id: &str, title: &str, status: &str) -> DocumentRecord {
        DocumentRecord {
            lookup_id: doc_id.to_string(),
            document_id: doc_id.to_string(),
            content_id: content_id.to_string(),
            title: title.to_string(),
            status: status.to_string(),
        }
    }

    fn setup(url: &str, display: &str) -> (Document, Vec<HyperlinkRecord>) {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph(url, display).unwrap();
        let records = crate::edit::hyperlinks::extract_hyperlink_records(&doc);
        (doc, records)
    }

    fn dictionary_of(records: &[DocumentRecord]) -> RecordDictionary {
        let mut dict = RecordDictionary::new();
        for r in records {
            dict.insert(Arc::new(r.clone()));
        }
        dict
    }

    #[test]
    fn test_active_record_rewrites_url_and_appends_content_id() {
        let (mut doc, mut records) = setup("https://host/x?docid=ABC-1", "Foo");
        let dict = dictionary_of(&[api_record("ABC-1", "123456", "Foo", "Active")]);
        let mut changes = ChangeLog::new();

        let updated = rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        assert_eq!(updated, 1);
        let links = doc.enumerate_hyperlinks();
        assert_eq!(
            links[0].target.as_deref(),
            Some("https://thesource.example.com/nuxeo/thesource/#!/view?docid=ABC-1")
        );
        assert_eq!(links[0].display_text, "Foo (123456)");
        assert_eq!(changes.count_of(ChangeKind::HyperlinkUpdated), 1);
        assert_eq!(changes.count_of(ChangeKind::ContentIdAdded), 1);
        assert_eq!(changes.count_of(ChangeKind::PossibleTitleChange), 0);
        assert_eq!(records[0].resolved, ResolvedStatus::Active);
        assert_eq!(records[0].action_taken, ActionTaken::Updated);
    }

    #[test]
    fn test_five_to_six_digit_upgrade() {
        let (mut doc, mut records) = setup("https://host/x?docid=D", "Bar (12345)");
        let dict = dictionary_of(&[api_record("D", "012345", "Bar", "Active")]);
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Bar (012345)");
        assert_eq!(changes.count_of(ChangeKind::ContentIdAdded), 1);
        // Exactly one trailing pattern
        assert_eq!(links[0].display_text.matches("(012345)").count(), 1);
    }

    #[test]
    fn test_expired_record_appends_content_id_then_suffix() {
        let (mut doc, mut records) = setup("https://host/x?docid=E-1", "Baz");
        let dict = dictionary_of(&[api_record("E-1", "999123", "Baz", "Expired")]);
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Baz (999123) - Expired");
        assert_eq!(records[0].resolved, ResolvedStatus::Expired);

        // ContentIdAdded must precede HyperlinkStatusAdded
        let kinds: Vec<ChangeKind> = changes.iter().map(|e| e.kind).collect();
        let content_pos = kinds
            .iter()
            .position(|k| *k == ChangeKind::ContentIdAdded)
            .unwrap();
        let status_pos = kinds
            .iter()
            .position(|k| *k == ChangeKind::HyperlinkStatusAdded)
            .unwrap();
        assert!(content_pos < status_pos);
    }

    #[test]
    fn test_already_suffixed_unmatched_link_is_untouched() {
        let (mut doc, mut records) = setup("https://host/x?docid=GONE-1", "Gone - Not Found");
        let dict = RecordDictionary::new();
        let mut changes = ChangeLog::new();

        let updated = rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        assert_eq!(updated, 0);
        assert!(changes.is_empty());
        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Gone - Not Found");
    }

    #[test]
    fn test_unmatched_link_gets_not_found_suffix() {
        let (mut doc, mut records) = setup("https://host/x?docid=GONE-2", "Lost");
        let dict = RecordDictionary::new();
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Lost - Not Found");
        assert_eq!(changes.count_of(ChangeKind::HyperlinkStatusAdded), 1);
        assert_eq!(records[0].resolved, ResolvedStatus::NotFound);
    }

    #[test]
    fn test_idempotent_on_second_run() {
        let (mut doc, mut records) = setup("https://host/x?docid=ABC-1", "Foo");
        let dict = dictionary_of(&[api_record("ABC-1", "123456", "Foo", "Active")]);
        let mut changes = ChangeLog::new();
        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        // Re-extract and run again with the same resolver state
        let mut records2 = crate::edit::hyperlinks::extract_hyperlink_records(&doc);
        let mut changes2 = ChangeLog::new();
        let updated2 =
            rewrite_hyperlinks(&mut doc, &mut records2, &dict, &options(), &mut changes2);

        assert_eq!(updated2, 0);
        assert_eq!(changes2.count_of(ChangeKind::HyperlinkUpdated), 0);
        assert_eq!(changes2.count_of(ChangeKind::ContentIdAdded), 0);
        assert_eq!(changes2.count_of(ChangeKind::HyperlinkStatusAdded), 0);
    }

    #[test]
    fn test_relationship_swap_leaves_no_orphans() {
        let (mut doc, mut records) = setup("https://host/x?docid=ABC-1", "Foo");
        let old_rel = records[0].rel_id.clone().unwrap();
        let dict = dictionary_of(&[api_record("ABC-1", "123456", "Foo", "Active")]);
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        // Old relationship is gone, the element points at a live one
        assert!(doc.hyperlink_relationship_target(&old_rel).is_none());
        let links = doc.enumerate_hyperlinks();
        assert!(!links[0].broken);
        assert_eq!(doc.relationship_snapshot().len(), 1);
    }

    #[test]
    fn test_title_difference_reported_not_rewritten() {
        let (mut doc, mut records) = setup("https://host/x?docid=T-1", "Old Name");
        let dict = dictionary_of(&[api_record("T-1", "555555", "New Name", "Active")]);
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        assert_eq!(changes.count_of(ChangeKind::PossibleTitleChange), 1);
        assert_eq!(changes.count_of(ChangeKind::TitleReplaced), 0);
        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Old Name (555555)");
    }

    #[test]
    fn test_auto_replace_titles() {
        let (mut doc, mut records) = setup("https://host/x?docid=T-2", "Stale Title");
        let dict = dictionary_of(&[api_record("T-2", "777777", "Fresh Title", "Active")]);
        let mut opts = options();
        opts.auto_replace_titles = true;
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &opts, &mut changes);

        assert_eq!(changes.count_of(ChangeKind::TitleReplaced), 1);
        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Fresh Title (777777)");
    }

    #[test]
    fn test_short_content_id_left_padded() {
        let (mut doc, mut records) = setup("https://host/x?docid=P-1", "Padded");
        let dict = dictionary_of(&[api_record("P-1", "42", "Padded", "Active")]);
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Padded (000042)");
    }

    #[test]
    fn test_append_content_id_variants() {
        assert_eq!(
            append_content_id("Doc", "123456"),
            Some("Doc (123456)".to_string())
        );
        assert_eq!(append_content_id("Doc (123456)", "123456"), None);
        assert_eq!(
            append_content_id("Doc (23456)", "123456"),
            Some("Doc (123456)".to_string())
        );
        assert_eq!(
            append_content_id("Trailing space ", "123456"),
            Some("Trailing space (123456)".to_string())
        );
        // 5-digit content id: padded to six before deriving patterns
        assert_eq!(
            append_content_id("Short (12345)", "12345"),
            Some("Short (012345)".to_string())
        );
        // A stale trailing pattern is replaced, never doubled
        assert_eq!(
            append_content_id("Doc (111111)", "222222"),
            Some("Doc (222222)".to_string())
        );
        assert_eq!(append_content_id("Doc (222222)", "222222"), None);
    }

    #[test]
    fn test_suffixed_display_title_comparison_ignores_suffix() {
        // Already processed on a prior run: suffix present, ids match
        let (mut doc, mut records) =
            setup("https://thesource.example.com/nuxeo/thesource/#!/view?docid=E-1", "Baz (999123) - Expired");
        let dict = dictionary_of(&[api_record("E-1", "999123", "Baz", "Expired")]);
        let mut changes = ChangeLog::new();

        let updated = rewrite_hyperlinks(&mut doc, &mut records, &dict, &options(), &mut changes);

        assert_eq!(updated, 0);
        assert_eq!(changes.count_of(ChangeKind::PossibleTitleChange), 0);
        assert_eq!(changes.count_of(ChangeKind::HyperlinkStatusAdded), 0);
    }

    #[test]
    fn test_auto_replace_title_keeps_existing_suffix() {
        let (mut doc, mut records) =
            setup("https://thesource.example.com/nuxeo/thesource/#!/view?docid=E-2", "Stale (111999) - Expired");
        let dict = dictionary_of(&[api_record("E-2", "111999", "Current Name", "Expired")]);
        let mut opts = options();
        opts.auto_replace_titles = true;
        let mut changes = ChangeLog::new();

        rewrite_hyperlinks(&mut doc, &mut records, &dict, &opts, &mut changes);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links[0].display_text, "Current Name (111999) - Expired");
        assert_eq!(changes.count_of(ChangeKind::TitleReplaced), 1);
    }

    #[test]
    fn test_strip_trailing_content_pattern() {
        assert_eq!(strip_trailing_content_pattern("Foo (123456)"), "Foo");
        assert_eq!(strip_trailing_content_pattern("Foo"), "Foo");
        assert_eq!(strip_trailing_content_pattern("Foo (12345)"), "Foo (12345)");
    }
}
