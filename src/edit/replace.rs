//! User text replacement over the run-fragmented text model
//!
//! Rules match whole words or whole phrases, case-insensitively, and the
//! replacement text is written exactly as configured. Simple paragraphs
//! are rewritten as one consolidated run; complex paragraphs (hyperlinks,
//! fields, drawings, tracked changes) are edited one text node at a time
//! so their structure stays intact.

use crate::config::ReplacementRule;
use crate::document::{Document, ParagraphAddr, ParagraphContent, Run, RunContent, TrackedChange};
use crate::edit::changelog::{ChangeKind, ChangeLog};
use log::warn;
use regex::{NoExpand, Regex};

/// A rule compiled to its boundary-aware regex
pub struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

/// Compile the active rules, dropping any whose source fails to compile
pub fn compile_rules(rules: &[&ReplacementRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| {
            let source = rule.source_text.trim();
            match Regex::new(&boundary_pattern(source)) {
                Ok(pattern) => Some(CompiledRule {
                    pattern,
                    replacement: rule.replacement_text.clone(),
                }),
                Err(e) => {
                    warn!("replacement rule '{source}' did not compile: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Whole-word / whole-phrase pattern: word boundaries are asserted only
/// where the source text itself starts or ends with a word character, so
/// multi-word phrases and punctuation-bearing sources both work.
fn boundary_pattern(source: &str) -> String {
    let mut pattern = String::from("(?i)");
    if source.chars().next().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(source));
    if source.chars().last().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Apply all rules, in order, to a text; None when nothing matched
fn apply_rules(rules: &[CompiledRule], text: &str) -> Option<String> {
    let mut current = text.to_string();
    let mut changed = false;

    for rule in rules {
        let replaced = rule
            .pattern
            .replace_all(&current, NoExpand(&rule.replacement));
        if replaced != current {
            current = replaced.into_owned();
            changed = true;
        }
    }

    changed.then_some(current)
}

/// Run the replacement pass over every paragraph. Returns the number of
/// paragraphs changed.
pub fn apply_replacements(
    doc: &mut Document,
    rules: &[CompiledRule],
    track_changes: bool,
    changes: &mut ChangeLog,
) -> usize {
    if rules.is_empty() {
        return 0;
    }

    let mut paragraphs_changed = 0;

    for addr in doc.paragraph_addrs() {
        let Some(para) = doc.paragraph(&addr) else {
            continue;
        };

        if para.is_simple() {
            let old_text = para.text();
            if let Some(new_text) = apply_rules(rules, &old_text) {
                if track_changes {
                    rewrite_tracked(doc, &addr, &new_text);
                } else {
                    // Classification guarantees the rewrite is safe
                    let _ = doc.rewrite_simple_paragraph_text(&addr, new_text.clone());
                }
                changes.record(
                    ChangeKind::TextReplaced,
                    format!("{:?}", addr),
                    old_text,
                    new_text,
                    "",
                );
                paragraphs_changed += 1;
            }
        } else if replace_in_complex(doc, &addr, rules, changes) {
            paragraphs_changed += 1;
        }
    }

    paragraphs_changed
}

/// Per-text-node replacement for complex paragraphs. Text under field
/// machinery, tracked deletions, or drawing-bearing runs is never touched.
fn replace_in_complex(
    doc: &mut Document,
    addr: &ParagraphAddr,
    rules: &[CompiledRule],
    changes: &mut ChangeLog,
) -> bool {
    let Some(para) = doc.paragraph_mut(addr) else {
        return false;
    };

    let mask = para.field_region_mask();
    let old_text = para.text();
    let mut nodes_changed = 0;

    for (i, content) in para.content.iter_mut().enumerate() {
        if mask[i] {
            continue;
        }
        match content {
            ParagraphContent::Run(run) => {
                nodes_changed += replace_in_run(run, rules);
            }
            ParagraphContent::Hyperlink(link) => {
                for run in &mut link.runs {
                    nodes_changed += replace_in_run(run, rules);
                }
            }
            ParagraphContent::Insert(change) => {
                for run in &mut change.runs {
                    nodes_changed += replace_in_run(run, rules);
                }
            }
            // Simple fields, deletions, bookmarks, unknowns stay untouched
            _ => {}
        }
    }

    if nodes_changed > 0 {
        let new_text = para.text();
        changes.record(
            ChangeKind::TextReplaced,
            format!("{:?}", addr),
            old_text,
            new_text,
            format!("{nodes_changed} text node(s) rewritten"),
        );
        true
    } else {
        false
    }
}

fn replace_in_run(run: &mut Run, rules: &[CompiledRule]) -> usize {
    if run.has_field_machinery() || run.has_drawing() {
        return 0;
    }

    let mut changed = 0;
    for content in &mut run.content {
        if let RunContent::Text(text) = content {
            if let Some(new_text) = apply_rules(rules, text) {
                *text = new_text;
                changed += 1;
            }
        }
    }
    changed
}

/// Track-changes rewrite of a simple paragraph: the existing runs become
/// one tracked deletion and the new text arrives as a tracked insertion
/// with the first run's formatting.
fn rewrite_tracked(doc: &mut Document, addr: &ParagraphAddr, new_text: &str) {
    let Some(para) = doc.paragraph_mut(addr) else {
        return;
    };

    let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut deleted_runs = Vec::new();
    let mut first_props = None;

    for content in para.content.drain(..) {
        if let ParagraphContent::Run(mut run) = content {
            if first_props.is_none() {
                first_props = Some(run.properties.clone());
            }
            for rc in &mut run.content {
                if let RunContent::Text(text) = rc {
                    *rc = RunContent::DeletedText(std::mem::take(text));
                }
            }
            deleted_runs.push(run);
        }
    }

    para.content.push(ParagraphContent::Delete(TrackedChange {
        id: None,
        author: Some("docx-bulk-editor".to_string()),
        date: Some(date.clone()),
        runs: deleted_runs,
    }));
    para.content.push(ParagraphContent::Insert(TrackedChange {
        id: None,
        author: Some("docx-bulk-editor".to_string()),
        date: Some(date),
        runs: vec![Run::with_properties(new_text, first_props.flatten())],
    }));
}
