//! Invisible-link sweeper
//!
//! Hyperlink elements whose trimmed display text is empty render as
//! nothing but still carry a relationship; some also reference a
//! relationship that no longer exists. Both are removed, together with
//! their relationship where resolvable.

use crate::document::Document;
use crate::edit::changelog::{ChangeKind, ChangeLog};
use log::debug;

/// Remove all hyperlink elements with empty display text.
///
/// Traversal runs backward by element index so removals never invalidate
/// the addresses of elements not yet visited. Returns the removal count.
pub fn sweep_invisible_links(doc: &mut Document, changes: &mut ChangeLog) -> usize {
    let infos = doc.enumerate_hyperlinks();
    let mut removed = 0;

    for (index, info) in infos.iter().enumerate().rev() {
        if !info.display_text.trim().is_empty() {
            continue;
        }

        if doc.remove_hyperlink_element(&info.addr).is_err() {
            continue;
        }

        if let Some(rel_id) = &info.rel_id {
            // Tolerates a broken (already deleted) relationship
            doc.delete_hyperlink_relationship(rel_id);
        }

        changes.record(
            ChangeKind::HyperlinkRemoved,
            format!("link-{}", index + 1),
            info.target.clone().unwrap_or_default(),
            "",
            if info.broken {
                "invisible hyperlink with broken relationship removed"
            } else {
                "invisible hyperlink removed"
            },
        );
        removed += 1;
    }

    if removed > 0 {
        debug!("swept {removed} invisible hyperlink(s)");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_removes_only_empty_links() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com/1", "visible")
            .unwrap();
        doc.append_hyperlink_paragraph("https://example.com/2", "")
            .unwrap();
        doc.append_hyperlink_paragraph("https://example.com/3", "   ")
            .unwrap();
        doc.append_hyperlink_paragraph("https://example.com/4", "also visible")
            .unwrap();

        let mut changes = ChangeLog::new();
        let removed = sweep_invisible_links(&mut doc, &mut changes);

        assert_eq!(removed, 2);
        assert_eq!(changes.count_of(ChangeKind::HyperlinkRemoved), 2);

        let remaining = doc.enumerate_hyperlinks();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].display_text, "visible");
        assert_eq!(remaining[1].display_text, "also visible");

        // Relationships of removed links are gone too
        assert_eq!(doc.relationship_snapshot().len(), 2);
    }

    #[test]
    fn test_handles_broken_relationship() {
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://example.com/x", "")
            .unwrap();
        doc.delete_hyperlink_relationship(&rid);

        let mut changes = ChangeLog::new();
        let removed = sweep_invisible_links(&mut doc, &mut changes);

        assert_eq!(removed, 1);
        assert!(doc.enumerate_hyperlinks().is_empty());
    }

    #[test]
    fn test_multiple_empty_links_in_one_paragraph() {
        use crate::document::{Hyperlink, Paragraph};

        let mut doc = Document::new();
        doc.add_paragraph("seed");
        let _ = doc.to_bytes().unwrap();

        let r1 = doc
            .add_hyperlink_relationship("https://example.com/a", None)
            .unwrap();
        let r2 = doc
            .add_hyperlink_relationship("https://example.com/b", None)
            .unwrap();
        let r3 = doc
            .add_hyperlink_relationship("https://example.com/c", None)
            .unwrap();

        let mut para = Paragraph::default();
        para.add_hyperlink(Hyperlink::external(r1, ""));
        para.add_hyperlink(Hyperlink::external(r2, "keep me"));
        para.add_hyperlink(Hyperlink::external(r3, ""));
        doc.body_mut().add_paragraph(para);

        let mut changes = ChangeLog::new();
        let removed = sweep_invisible_links(&mut doc, &mut changes);

        assert_eq!(removed, 2);
        let remaining = doc.enumerate_hyperlinks();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].display_text, "keep me");
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com/1", "")
            .unwrap();

        let mut changes = ChangeLog::new();
        assert_eq!(sweep_invisible_links(&mut doc, &mut changes), 1);
        assert_eq!(sweep_invisible_links(&mut doc, &mut changes), 0);
    }
}
