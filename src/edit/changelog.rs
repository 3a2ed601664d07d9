//! Typed change log
//!
//! The change log outlives the editing session and is the visible result
//! for the caller: every mutation the pipeline makes is recorded here.

/// Kind of a change-log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    HyperlinkUpdated,
    HyperlinkRemoved,
    HyperlinkStatusAdded,
    ContentIdAdded,
    TitleReplaced,
    PossibleTitleChange,
    TextReplaced,
    TextOptimized,
    Information,
    Error,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::HyperlinkUpdated => "HyperlinkUpdated",
            ChangeKind::HyperlinkRemoved => "HyperlinkRemoved",
            ChangeKind::HyperlinkStatusAdded => "HyperlinkStatusAdded",
            ChangeKind::ContentIdAdded => "ContentIdAdded",
            ChangeKind::TitleReplaced => "TitleReplaced",
            ChangeKind::PossibleTitleChange => "PossibleTitleChange",
            ChangeKind::TextReplaced => "TextReplaced",
            ChangeKind::TextOptimized => "TextOptimized",
            ChangeKind::Information => "Information",
            ChangeKind::Error => "Error",
        }
    }
}

/// One recorded change
#[derive(Clone, Debug)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub old_value: String,
    pub new_value: String,
    /// Stable id of the element the change applies to (hyperlink surrogate
    /// id, paragraph address, ...)
    pub element_id: String,
    pub details: String,
}

/// Ordered log of changes made during one document session
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ChangeEntry) {
        self.entries.push(entry);
    }

    pub fn record(
        &mut self,
        kind: ChangeKind,
        element_id: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.entries.push(ChangeEntry {
            kind,
            old_value: old_value.into(),
            new_value: new_value.into(),
            element_id: element_id.into(),
            details: details.into(),
        });
    }

    pub fn info(&mut self, element_id: impl Into<String>, details: impl Into<String>) {
        self.record(ChangeKind::Information, element_id, "", "", details);
    }

    pub fn error(&mut self, element_id: impl Into<String>, details: impl Into<String>) {
        self.record(ChangeKind::Error, element_id, "", "", details);
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter()
    }

    pub fn count_of(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append all entries of another log
    pub fn extend(&mut self, other: ChangeLog) {
        self.entries.extend(other.entries);
    }
}
