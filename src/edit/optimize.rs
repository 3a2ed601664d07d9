//! Conservative text-cleanup passes
//!
//! Every pass is idempotent, toggle-controlled, reports its change count,
//! and never re-orders block elements. Text under field machinery or
//! drawings is left alone.

use crate::config::TextOptions;
use crate::document::{
    BlockContent, Document, Paragraph, ParagraphContent, Run, RunContent,
};
use crate::edit::changelog::{ChangeKind, ChangeLog};
use regex::Regex;
use std::sync::OnceLock;

/// Per-pass change counts for one optimizer run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeOutcome {
    pub spaces_collapsed: usize,
    pub empty_paragraphs_removed: usize,
    pub line_breaks_removed: usize,
    pub table_cells_fixed: usize,
    pub list_items_indented: usize,
    pub spacing_normalized: usize,
}

impl OptimizeOutcome {
    pub fn total(&self) -> usize {
        self.spaces_collapsed
            + self.empty_paragraphs_removed
            + self.line_breaks_removed
            + self.table_cells_fixed
            + self.list_items_indented
            + self.spacing_normalized
    }
}

fn multi_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("pattern is valid"))
}

/// Run all enabled cleanup passes
pub fn optimize_text(
    doc: &mut Document,
    options: &TextOptions,
    changes: &mut ChangeLog,
) -> OptimizeOutcome {
    let mut outcome = OptimizeOutcome::default();

    if options.remove_extra_spaces {
        outcome.spaces_collapsed = collapse_whitespace(doc);
    }
    if options.standardize_line_breaks {
        outcome.line_breaks_removed = cap_line_breaks(doc, options.max_consecutive_line_breaks);
    }
    if options.remove_empty_paragraphs {
        outcome.empty_paragraphs_removed = remove_empty_paragraphs(doc);
    }
    if options.optimize_table_formatting {
        outcome.table_cells_fixed = fix_empty_table_cells(doc);
    }
    if options.optimize_list_formatting {
        outcome.list_items_indented = normalize_list_indentation(doc);
    }
    if options.standardize_paragraph_spacing {
        outcome.spacing_normalized = normalize_paragraph_spacing(doc);
    }

    report(changes, "extra spaces collapsed", outcome.spaces_collapsed);
    report(changes, "line breaks removed", outcome.line_breaks_removed);
    report(
        changes,
        "empty paragraphs removed",
        outcome.empty_paragraphs_removed,
    );
    report(changes, "table cells repaired", outcome.table_cells_fixed);
    report(changes, "list items re-indented", outcome.list_items_indented);
    report(
        changes,
        "paragraph spacing standardized",
        outcome.spacing_normalized,
    );

    outcome
}

fn report(changes: &mut ChangeLog, what: &str, count: usize) {
    if count > 0 {
        changes.record(
            ChangeKind::TextOptimized,
            "document",
            "",
            "",
            format!("{what}: {count}"),
        );
    }
}

/// Visit every run whose text is safe to edit
fn for_each_editable_run(para: &mut Paragraph, f: &mut dyn FnMut(&mut Run) -> usize) -> usize {
    let mask = para.field_region_mask();
    let mut count = 0;

    for (i, content) in para.content.iter_mut().enumerate() {
        if mask[i] {
            continue;
        }
        match content {
            ParagraphContent::Run(run) => {
                if !run.has_field_machinery() && !run.has_drawing() {
                    count += f(run);
                }
            }
            ParagraphContent::Hyperlink(link) => {
                for run in &mut link.runs {
                    if !run.has_field_machinery() && !run.has_drawing() {
                        count += f(run);
                    }
                }
            }
            ParagraphContent::Insert(change) => {
                for run in &mut change.runs {
                    if !run.has_field_machinery() && !run.has_drawing() {
                        count += f(run);
                    }
                }
            }
            _ => {}
        }
    }

    count
}

/// Collapse runs of two or more spaces and normalize CRLF line endings
/// inside each text node. Returns the number of text nodes changed.
fn collapse_whitespace(doc: &mut Document) -> usize {
    let addrs = doc.paragraph_addrs();
    let mut changed = 0;

    for addr in addrs {
        if let Some(para) = doc.paragraph_mut(&addr) {
            changed += for_each_editable_run(para, &mut |run| {
                let mut run_changes = 0;
                for content in &mut run.content {
                    if let RunContent::Text(text) = content {
                        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
                        let collapsed = multi_space().replace_all(&normalized, " ");
                        if *text != collapsed {
                            *text = collapsed.into_owned();
                            run_changes += 1;
                        }
                    }
                }
                run_changes
            });
        }
    }

    changed
}

/// Cap consecutive line-break elements per run at `max`. Returns the
/// number of breaks removed.
fn cap_line_breaks(doc: &mut Document, max: usize) -> usize {
    let addrs = doc.paragraph_addrs();
    let mut removed = 0;

    for addr in addrs {
        if let Some(para) = doc.paragraph_mut(&addr) {
            removed += for_each_editable_run(para, &mut |run| {
                let before = run.content.len();
                let mut consecutive = 0usize;
                run.content.retain(|c| {
                    let is_line_break = matches!(
                        c,
                        RunContent::Break(crate::document::BreakType::TextWrapping)
                            | RunContent::CarriageReturn
                    );
                    if is_line_break {
                        consecutive += 1;
                        consecutive <= max
                    } else {
                        consecutive = 0;
                        true
                    }
                });
                before - run.content.len()
            });
        }
    }

    removed
}

/// A paragraph qualifies for removal when its visible text is blank and it
/// carries nothing but plain runs: no hyperlinks, fields, drawings,
/// bookmarks, tracked changes, preserved unknowns, or a section break.
fn is_removable_empty(para: &Paragraph) -> bool {
    if !para.text().trim().is_empty() || !para.unknown_children.is_empty() {
        return false;
    }
    if let Some(props) = &para.properties {
        if props.raw_child("w:sectPr").is_some() {
            return false;
        }
    }
    para.content.iter().all(|c| match c {
        ParagraphContent::Run(run) => !run.has_field_machinery() && !run.has_drawing(),
        _ => false,
    })
}

/// Remove whitespace-only paragraphs from the body and from table cells.
/// The body keeps at least one paragraph; each cell keeps at least one.
fn remove_empty_paragraphs(doc: &mut Document) -> usize {
    let mut removed = 0;
    let body = doc.body_mut();

    let paragraph_count = body
        .content
        .iter()
        .filter(|c| matches!(c, BlockContent::Paragraph(_)))
        .count();
    let removable = body
        .content
        .iter()
        .filter(|c| matches!(c, BlockContent::Paragraph(p) if is_removable_empty(p)))
        .count();
    let mut keep_budget = if removable == paragraph_count && paragraph_count > 0 {
        removable - 1
    } else {
        removable
    };

    body.content.retain(|c| match c {
        BlockContent::Paragraph(p) if is_removable_empty(p) && keep_budget > 0 => {
            keep_budget -= 1;
            removed += 1;
            false
        }
        _ => true,
    });

    for table in body.tables_mut() {
        for row in &mut table.rows {
            for cell in &mut row.cells {
                while cell.paragraphs.len() > 1 {
                    let last_removable = cell
                        .paragraphs
                        .iter()
                        .position(is_removable_empty);
                    match last_removable {
                        Some(idx) => {
                            cell.paragraphs.remove(idx);
                            removed += 1;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    removed
}

/// Give every paragraph-less table cell a minimal empty paragraph
fn fix_empty_table_cells(doc: &mut Document) -> usize {
    let mut fixed = 0;

    for table in doc.body_mut().tables_mut() {
        for row in &mut table.rows {
            for cell in &mut row.cells {
                if cell.paragraphs.is_empty() {
                    cell.paragraphs.push(Paragraph::default());
                    fixed += 1;
                }
            }
        }
    }

    fixed
}

/// List items get a left indentation of level * 720 twentieths of a point
fn normalize_list_indentation(doc: &mut Document) -> usize {
    let addrs = doc.paragraph_addrs();
    let mut changed = 0;

    for addr in addrs {
        let Some(para) = doc.paragraph_mut(&addr) else {
            continue;
        };
        let Some(props) = &mut para.properties else {
            continue;
        };
        if props.num_id.is_none() {
            continue;
        }

        let level = props.num_level.unwrap_or(0) as i64;
        let target = (level * 720).to_string();

        let ind = props.raw_child_mut("w:ind");
        if ind.attr("w:left") != Some(target.as_str()) {
            ind.set_attr("w:left", target);
            changed += 1;
        }
    }

    changed
}

const STANDARD_LINE: &str = "276";

/// Apply a standard line spacing where absent or non-standard
fn normalize_paragraph_spacing(doc: &mut Document) -> usize {
    let addrs = doc.paragraph_addrs();
    let mut changed = 0;

    for addr in addrs {
        let Some(para) = doc.paragraph_mut(&addr) else {
            continue;
        };
        let props = para.properties.get_or_insert_with(Default::default);

        let spacing = props.raw_child_mut("w:spacing");
        let standard = spacing.attr("w:line") == Some(STANDARD_LINE)
            && spacing.attr("w:lineRule") == Some("auto");
        if !standard {
            spacing.set_attr("w:line", STANDARD_LINE);
            spacing.set_attr("w:lineRule", "auto");
            changed += 1;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextOptions;
    use crate::document::Table;
    use pretty_assertions::assert_eq;

    fn options() -> TextOptions {
        TextOptions::default()
    }

    #[test]
    fn test_collapse_spaces() {
        let mut doc = Document::new();
        doc.add_paragraph("alpha BETA   gamma");
        let mut changes = ChangeLog::new();

        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.spaces_collapsed, 1);
        assert_eq!(doc.text(), "alpha BETA gamma");
        assert_eq!(changes.count_of(ChangeKind::TextOptimized), 1);
    }

    #[test]
    fn test_remove_empty_paragraphs_keeps_content() {
        let mut doc = Document::new();
        doc.add_paragraph("first");
        doc.add_paragraph("   ");
        doc.add_paragraph("");
        doc.add_paragraph("second");
        let mut changes = ChangeLog::new();

        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.empty_paragraphs_removed, 2);
        assert_eq!(doc.text(), "first\nsecond");
    }

    #[test]
    fn test_body_keeps_last_paragraph() {
        let mut doc = Document::new();
        doc.add_paragraph(" ");
        doc.add_paragraph("");
        let mut changes = ChangeLog::new();

        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.empty_paragraphs_removed, 1);
        assert_eq!(doc.paragraphs().count(), 1);
    }

    #[test]
    fn test_empty_hyperlink_paragraph_not_removed() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com", "")
            .unwrap();
        let mut changes = ChangeLog::new();

        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        // The sweeper owns hyperlink removal; the optimizer must not
        assert_eq!(outcome.empty_paragraphs_removed, 0);
        assert_eq!(doc.enumerate_hyperlinks().len(), 1);
    }

    #[test]
    fn test_cap_line_breaks() {
        use crate::document::BreakType;

        let mut doc = Document::new();
        let mut run = Run::new("text");
        for _ in 0..5 {
            run.content.push(RunContent::Break(BreakType::TextWrapping));
        }
        run.content.push(RunContent::Text("tail".into()));
        let mut para = Paragraph::default();
        para.add_run(run);
        doc.body_mut().add_paragraph(para);

        let mut changes = ChangeLog::new();
        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.line_breaks_removed, 3);
        assert_eq!(doc.text(), "text\n\ntail");
    }

    #[test]
    fn test_page_breaks_not_counted_as_line_breaks() {
        use crate::document::BreakType;

        let mut doc = Document::new();
        let mut run = Run::new("a");
        run.content.push(RunContent::Break(BreakType::Page));
        run.content.push(RunContent::Break(BreakType::Page));
        run.content.push(RunContent::Break(BreakType::Page));
        let mut para = Paragraph::default();
        para.add_run(run);
        doc.body_mut().add_paragraph(para);

        let mut changes = ChangeLog::new();
        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.line_breaks_removed, 0);
    }

    #[test]
    fn test_fix_empty_table_cells() {
        let mut doc = Document::new();
        doc.add_paragraph("before");
        let mut table = Table::new(2, 2);
        table.cell_mut(0, 0).unwrap().add_paragraph(Paragraph::new("filled"));
        doc.body_mut().add_table(table);

        let mut changes = ChangeLog::new();
        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.table_cells_fixed, 3);
        // Second run has nothing left to fix
        let mut changes2 = ChangeLog::new();
        let outcome2 = optimize_text(&mut doc, &options(), &mut changes2);
        assert_eq!(outcome2.table_cells_fixed, 0);
    }

    #[test]
    fn test_list_indentation() {
        let mut doc = Document::new();
        let mut para = Paragraph::new("item");
        let props = para.properties.get_or_insert_with(Default::default);
        props.num_id = Some(1);
        props.num_level = Some(2);
        doc.body_mut().add_paragraph(para);

        let mut changes = ChangeLog::new();
        let outcome = optimize_text(&mut doc, &options(), &mut changes);

        assert_eq!(outcome.list_items_indented, 1);
        let para = doc.paragraphs().next().unwrap();
        let ind = para.properties.as_ref().unwrap().raw_child("w:ind").unwrap();
        assert_eq!(ind.attr("w:left"), Some("1440"));

        // Idempotent
        let mut changes2 = ChangeLog::new();
        let outcome2 = optimize_text(&mut doc, &options(), &mut changes2);
        assert_eq!(outcome2.list_items_indented, 0);
    }

    #[test]
    fn test_spacing_pass_is_opt_in() {
        let mut doc = Document::new();
        doc.add_paragraph("text");
        let mut changes = ChangeLog::new();

        let outcome = optimize_text(&mut doc, &options(), &mut changes);
        assert_eq!(outcome.spacing_normalized, 0);

        let mut opts = options();
        opts.standardize_paragraph_spacing = true;
        let outcome2 = optimize_text(&mut doc, &opts, &mut changes);
        assert_eq!(outcome2.spacing_normalized, 1);
    }

    #[test]
    fn test_optimizer_idempotent_on_text() {
        let mut doc = Document::new();
        doc.add_paragraph("a  b   c");
        let mut changes = ChangeLog::new();
        optimize_text(&mut doc, &options(), &mut changes);
        let first = doc.text();

        let mut changes2 = ChangeLog::new();
        let outcome2 = optimize_text(&mut doc, &options(), &mut changes2);
        assert_eq!(doc.text(), first);
        assert_eq!(outcome2.spaces_collapsed, 0);
    }
}
