//! Paragraph element (w:p)
//!
//! Paragraph children are modeled explicitly where the editing pipeline
//! needs to reason about them: hyperlinks, simple and complex fields, and
//! tracked insertions/deletions. Everything else is preserved raw.

use crate::document::run::{FieldCharKind, Run, RunContent};
use crate::error::Result;
use crate::xml::{get_w_val, is_on, RawXmlElement, RawXmlNode};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::BufRead;

/// Paragraph element (w:p)
#[derive(Clone, Debug, Default)]
pub struct Paragraph {
    /// Paragraph properties
    pub properties: Option<ParagraphProperties>,
    /// Paragraph content (runs, hyperlinks, fields, etc.)
    pub content: Vec<ParagraphContent>,
    /// Unknown attributes (preserved for round-trip)
    pub unknown_attrs: Vec<(String, String)>,
    /// Unknown children (preserved for round-trip)
    pub unknown_children: Vec<RawXmlNode>,
}

/// Content within a paragraph
#[derive(Clone, Debug)]
pub enum ParagraphContent {
    /// Text run
    Run(Run),
    /// Hyperlink
    Hyperlink(Hyperlink),
    /// Simple field (w:fldSimple)
    SimpleField(SimpleField),
    /// Tracked insertion (w:ins)
    Insert(TrackedChange),
    /// Tracked deletion (w:del)
    Delete(TrackedChange),
    /// Bookmark start
    BookmarkStart { id: String, name: String },
    /// Bookmark end
    BookmarkEnd { id: String },
    /// Unknown element (preserved)
    Unknown(RawXmlNode),
}

/// Hyperlink element
#[derive(Clone, Debug, Default)]
pub struct Hyperlink {
    /// Relationship ID (for external links)
    pub rel_id: Option<String>,
    /// Anchor (for internal links)
    pub anchor: Option<String>,
    /// Content runs
    pub runs: Vec<Run>,
    /// Remaining attributes (w:history etc.), preserved
    pub unknown_attrs: Vec<(String, String)>,
}

/// Simple field (w:fldSimple)
#[derive(Clone, Debug, Default)]
pub struct SimpleField {
    /// Field instruction, e.g. ` TOC \o "1-3" `
    pub instr: String,
    /// w:dirty - recompute on next open
    pub dirty: bool,
    /// Current field result runs
    pub runs: Vec<Run>,
    /// Remaining attributes, preserved
    pub extra_attrs: Vec<(String, String)>,
}

/// Tracked change container (w:ins / w:del)
#[derive(Clone, Debug, Default)]
pub struct TrackedChange {
    pub id: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub runs: Vec<Run>,
}

/// Paragraph properties (w:pPr)
#[derive(Clone, Debug, Default)]
pub struct ParagraphProperties {
    /// Style ID
    pub style: Option<String>,
    /// Justification/alignment
    pub justification: Option<String>,
    /// Numbering properties
    pub num_id: Option<u32>,
    pub num_level: Option<u32>,
    /// Unknown children (preserved); w:ind and w:spacing live here and are
    /// edited in place through `raw_child_mut`
    pub unknown_children: Vec<RawXmlNode>,
}

impl Paragraph {
    /// Parse paragraph from reader (after w:p start tag)
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<Self> {
        let mut para = Paragraph::default();
        para.unknown_attrs = read_attrs(start);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"pPr" => {
                            para.properties = Some(ParagraphProperties::from_reader(reader)?);
                        }
                        b"r" => {
                            let run = Run::from_reader(reader, &e)?;
                            para.content.push(ParagraphContent::Run(run));
                        }
                        b"hyperlink" => {
                            let link = Hyperlink::from_reader(reader, &e)?;
                            para.content.push(ParagraphContent::Hyperlink(link));
                        }
                        b"fldSimple" => {
                            let field = SimpleField::from_reader(reader, &e)?;
                            para.content.push(ParagraphContent::SimpleField(field));
                        }
                        b"ins" => {
                            let change = TrackedChange::from_reader(reader, &e, b"ins")?;
                            para.content.push(ParagraphContent::Insert(change));
                        }
                        b"del" => {
                            let change = TrackedChange::from_reader(reader, &e, b"del")?;
                            para.content.push(ParagraphContent::Delete(change));
                        }
                        b"bookmarkStart" => {
                            para.content.push(parse_bookmark_start(&e));
                            skip_to_end(reader, &e)?;
                        }
                        b"bookmarkEnd" => {
                            para.content.push(parse_bookmark_end(&e));
                            skip_to_end(reader, &e)?;
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            para.content.push(ParagraphContent::Unknown(RawXmlNode::Element(raw)));
                        }
                    }
                }
                Event::Empty(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"r" => {
                            let run = Run::from_empty(&e)?;
                            para.content.push(ParagraphContent::Run(run));
                        }
                        b"bookmarkStart" => {
                            para.content.push(parse_bookmark_start(&e));
                        }
                        b"bookmarkEnd" => {
                            para.content.push(parse_bookmark_end(&e));
                        }
                        _ => {
                            let raw = RawXmlElement::from_empty(&e);
                            para.content.push(ParagraphContent::Unknown(RawXmlNode::Element(raw)));
                        }
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"p" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(para)
    }

    /// Create from empty element
    pub fn from_empty(start: &BytesStart) -> Result<Self> {
        let mut para = Paragraph::default();
        para.unknown_attrs = read_attrs(start);
        Ok(para)
    }

    /// Get all visible text in this paragraph
    pub fn text(&self) -> String {
        let mut result = String::new();
        for content in &self.content {
            match content {
                ParagraphContent::Run(run) => result.push_str(&run.text()),
                ParagraphContent::Hyperlink(link) => result.push_str(&link.display_text()),
                ParagraphContent::SimpleField(field) => {
                    for run in &field.runs {
                        result.push_str(&run.text());
                    }
                }
                ParagraphContent::Insert(change) => {
                    for run in &change.runs {
                        result.push_str(&run.text());
                    }
                }
                _ => {}
            }
        }
        result
    }

    /// Get all top-level runs
    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.content.iter().filter_map(|c| {
            if let ParagraphContent::Run(r) = c {
                Some(r)
            } else {
                None
            }
        })
    }

    /// A paragraph is simple when it consists purely of plain-text runs:
    /// no hyperlinks, fields, drawings, tracked changes, bookmarks, or
    /// preserved unknown structure. Only simple paragraphs may be
    /// consolidated into a single run.
    pub fn is_simple(&self) -> bool {
        self.unknown_children.is_empty()
            && self.content.iter().all(|c| match c {
                ParagraphContent::Run(r) => r.is_plain_text() && !r.has_drawing(),
                _ => false,
            })
    }

    /// Whether any field machinery is present (simple or complex)
    pub fn has_field_code(&self) -> bool {
        self.content.iter().any(|c| match c {
            ParagraphContent::SimpleField(_) => true,
            ParagraphContent::Run(r) => r.has_field_machinery(),
            _ => false,
        })
    }

    /// Whether any run embeds a drawing or object
    pub fn has_drawing(&self) -> bool {
        self.content.iter().any(|c| match c {
            ParagraphContent::Run(r) => r.has_drawing(),
            ParagraphContent::Hyperlink(h) => h.runs.iter().any(|r| r.has_drawing()),
            ParagraphContent::Insert(t) | ParagraphContent::Delete(t) => {
                t.runs.iter().any(|r| r.has_drawing())
            }
            _ => false,
        })
    }

    /// Rewrite a simple paragraph's text, consolidating into the first run.
    ///
    /// The first run's properties survive; any additional runs are removed.
    /// Callers must have classified the paragraph as simple.
    pub fn rewrite_simple_text(&mut self, text: impl Into<String>) {
        let properties = self.runs().next().and_then(|r| r.properties.clone());
        self.content
            .retain(|c| !matches!(c, ParagraphContent::Run(_)));
        self.content
            .insert(0, ParagraphContent::Run(Run::with_properties(text, properties)));
    }

    /// Indices of top-level runs lying inside a complex field region
    /// (between a begin and end w:fldChar, inclusive). Text under these
    /// must never be touched.
    pub fn field_region_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.content.len()];
        let mut depth = 0usize;

        for (i, content) in self.content.iter().enumerate() {
            if let ParagraphContent::Run(run) = content {
                let mut enters = 0usize;
                let mut exits = 0usize;
                for rc in &run.content {
                    if let RunContent::FieldChar(fc) = rc {
                        match fc.kind {
                            FieldCharKind::Begin => enters += 1,
                            FieldCharKind::End => exits += 1,
                            FieldCharKind::Separate => {}
                        }
                    }
                }
                if depth > 0 || enters > 0 {
                    mask[i] = true;
                }
                depth = depth.saturating_add(enters).saturating_sub(exits);
            } else if depth > 0 {
                mask[i] = true;
            }
        }

        mask
    }

    /// Mark fields whose instruction matches the predicate as dirty.
    ///
    /// Covers both w:fldSimple elements and complex fldChar fields.
    /// Returns the number of fields marked.
    pub fn mark_fields_dirty(&mut self, predicate: &dyn Fn(&str) -> bool) -> usize {
        let mut marked = 0;

        for content in &mut self.content {
            if let ParagraphContent::SimpleField(field) = content {
                if !field.dirty && predicate(&field.instr) {
                    field.dirty = true;
                    marked += 1;
                }
            }
        }

        // Complex fields: pair each begin fldChar with the instruction text
        // collected up to its separate/end, then flag the begin.
        let mut stack: Vec<(usize, usize, String, bool)> = Vec::new(); // (content, item, instr, separated)
        let mut targets: Vec<(usize, usize, String)> = Vec::new();

        for (ci, content) in self.content.iter().enumerate() {
            if let ParagraphContent::Run(run) = content {
                for (ri, rc) in run.content.iter().enumerate() {
                    match rc {
                        RunContent::FieldChar(fc) => match fc.kind {
                            FieldCharKind::Begin => stack.push((ci, ri, String::new(), false)),
                            FieldCharKind::Separate => {
                                if let Some(top) = stack.last_mut() {
                                    top.3 = true;
                                }
                            }
                            FieldCharKind::End => {
                                if let Some((bci, bri, instr, _)) = stack.pop() {
                                    targets.push((bci, bri, instr));
                                }
                            }
                        },
                        RunContent::InstrText(t) => {
                            if let Some(top) = stack.last_mut() {
                                if !top.3 {
                                    top.2.push_str(t);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        // Unterminated fields keep collecting across paragraphs in theory;
        // treat what we saw in this paragraph as the instruction.
        while let Some((bci, bri, instr, _)) = stack.pop() {
            targets.push((bci, bri, instr));
        }

        for (ci, ri, instr) in targets {
            if !predicate(&instr) {
                continue;
            }
            if let ParagraphContent::Run(run) = &mut self.content[ci] {
                if let RunContent::FieldChar(fc) = &mut run.content[ri] {
                    if !fc.dirty {
                        fc.dirty = true;
                        marked += 1;
                    }
                }
            }
        }

        marked
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new("w:p");
        for (key, value) in &self.unknown_attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let is_empty = self.properties.is_none()
            && self.content.is_empty()
            && self.unknown_children.is_empty();

        if is_empty {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;

            if let Some(props) = &self.properties {
                props.write_to(writer)?;
            }

            for content in &self.content {
                content.write_to(writer)?;
            }

            for child in &self.unknown_children {
                child.write_to(writer)?;
            }

            writer.write_event(Event::End(BytesEnd::new("w:p")))?;
        }

        Ok(())
    }

    /// Create a new paragraph with text
    pub fn new(text: impl Into<String>) -> Self {
        Paragraph {
            content: vec![ParagraphContent::Run(Run::new(text))],
            ..Default::default()
        }
    }

    /// Add a run to this paragraph
    pub fn add_run(&mut self, run: Run) {
        self.content.push(ParagraphContent::Run(run));
    }

    /// Add a hyperlink to this paragraph
    pub fn add_hyperlink(&mut self, link: Hyperlink) {
        self.content.push(ParagraphContent::Hyperlink(link));
    }
}

impl ParagraphContent {
    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        match self {
            ParagraphContent::Run(run) => run.write_to(writer),
            ParagraphContent::Hyperlink(link) => link.write_to(writer),
            ParagraphContent::SimpleField(field) => field.write_to(writer),
            ParagraphContent::Insert(change) => change.write_to(writer, "w:ins"),
            ParagraphContent::Delete(change) => change.write_to(writer, "w:del"),
            ParagraphContent::BookmarkStart { id, name } => {
                let mut elem = BytesStart::new("w:bookmarkStart");
                elem.push_attribute(("w:id", id.as_str()));
                elem.push_attribute(("w:name", name.as_str()));
                writer.write_event(Event::Empty(elem))?;
                Ok(())
            }
            ParagraphContent::BookmarkEnd { id } => {
                let mut elem = BytesStart::new("w:bookmarkEnd");
                elem.push_attribute(("w:id", id.as_str()));
                writer.write_event(Event::Empty(elem))?;
                Ok(())
            }
            ParagraphContent::Unknown(node) => node.write_to(writer),
        }
    }
}

impl Hyperlink {
    /// Create an external hyperlink with display text
    pub fn external(rel_id: impl Into<String>, display_text: impl Into<String>) -> Self {
        Hyperlink {
            rel_id: Some(rel_id.into()),
            runs: vec![Run::new(display_text)],
            ..Default::default()
        }
    }

    /// Parse from reader
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<Self> {
        let mut link = Hyperlink::default();

        for (key, value) in read_attrs(start) {
            match key.as_str() {
                "r:id" => link.rel_id = Some(value),
                "w:anchor" | "anchor" => link.anchor = Some(value),
                _ => link.unknown_attrs.push((key, value)),
            }
        }

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_reader(reader, &e)?;
                        link.runs.push(run);
                    } else {
                        skip_to_end(reader, &e)?;
                    }
                }
                Event::Empty(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_empty(&e)?;
                        link.runs.push(run);
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"hyperlink" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(link)
    }

    /// Concatenated text of all contained runs
    pub fn display_text(&self) -> String {
        self.runs.iter().map(|r| r.text()).collect()
    }

    /// Replace the display text with a single run carrying the first
    /// existing run's formatting.
    pub fn set_display_text(&mut self, text: impl Into<String>) {
        let properties = self.runs.first().and_then(|r| r.properties.clone());
        self.runs = vec![Run::with_properties(text, properties)];
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new("w:hyperlink");
        if let Some(rel_id) = &self.rel_id {
            start.push_attribute(("r:id", rel_id.as_str()));
        }
        if let Some(anchor) = &self.anchor {
            start.push_attribute(("w:anchor", anchor.as_str()));
        }
        for (key, value) in &self.unknown_attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.runs.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for run in &self.runs {
                run.write_to(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new("w:hyperlink")))?;
        }

        Ok(())
    }
}

impl SimpleField {
    /// Parse from reader
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<Self> {
        let mut field = SimpleField::default();

        for (key, value) in read_attrs(start) {
            match key.as_str() {
                "w:instr" | "instr" => field.instr = value,
                "w:dirty" | "dirty" => field.dirty = is_on(&value),
                _ => field.extra_attrs.push((key, value)),
            }
        }

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_reader(reader, &e)?;
                        field.runs.push(run);
                    } else {
                        skip_to_end(reader, &e)?;
                    }
                }
                Event::Empty(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_empty(&e)?;
                        field.runs.push(run);
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"fldSimple" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(field)
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new("w:fldSimple");
        start.push_attribute(("w:instr", self.instr.as_str()));
        if self.dirty {
            start.push_attribute(("w:dirty", "true"));
        }
        for (key, value) in &self.extra_attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.runs.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for run in &self.runs {
                run.write_to(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new("w:fldSimple")))?;
        }

        Ok(())
    }
}

impl TrackedChange {
    /// Parse from reader (w:ins or w:del)
    pub fn from_reader<R: BufRead>(
        reader: &mut Reader<R>,
        start: &BytesStart,
        end: &[u8],
    ) -> Result<Self> {
        let mut change = TrackedChange::default();

        for (key, value) in read_attrs(start) {
            match key.as_str() {
                "w:id" | "id" => change.id = Some(value),
                "w:author" | "author" => change.author = Some(value),
                "w:date" | "date" => change.date = Some(value),
                _ => {}
            }
        }

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_reader(reader, &e)?;
                        change.runs.push(run);
                    } else {
                        skip_to_end(reader, &e)?;
                    }
                }
                Event::Empty(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        let run = Run::from_empty(&e)?;
                        change.runs.push(run);
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == end {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(change)
    }

    /// Write to XML writer under the given element name
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>, name: &str) -> Result<()> {
        let mut start = BytesStart::new(name);
        if let Some(id) = &self.id {
            start.push_attribute(("w:id", id.as_str()));
        }
        if let Some(author) = &self.author {
            start.push_attribute(("w:author", author.as_str()));
        }
        if let Some(date) = &self.date {
            start.push_attribute(("w:date", date.as_str()));
        }

        if self.runs.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for run in &self.runs {
                run.write_to(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }

        Ok(())
    }
}

impl ParagraphProperties {
    /// Parse from reader (after w:pPr start tag)
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>) -> Result<Self> {
        let mut props = ParagraphProperties::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"numPr" => {
                            parse_num_pr(reader, &mut props)?;
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            props.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::Empty(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"pStyle" => {
                            props.style = get_w_val(&e);
                        }
                        b"jc" => {
                            props.justification = get_w_val(&e);
                        }
                        _ => {
                            let raw = RawXmlElement::from_empty(&e);
                            props.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"pPr" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(props)
    }

    /// Find a preserved raw child element by name
    pub fn raw_child(&self, name: &str) -> Option<&RawXmlElement> {
        self.unknown_children.iter().find_map(|n| match n {
            RawXmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Find or create a preserved raw child element by name
    pub fn raw_child_mut(&mut self, name: &str) -> &mut RawXmlElement {
        let pos = self.unknown_children.iter().position(|n| {
            matches!(n, RawXmlNode::Element(e) if e.name == name)
        });
        let idx = match pos {
            Some(idx) => idx,
            None => {
                self.unknown_children
                    .push(RawXmlNode::Element(RawXmlElement::new(name)));
                self.unknown_children.len() - 1
            }
        };
        match &mut self.unknown_children[idx] {
            RawXmlNode::Element(e) => e,
            _ => unreachable!("position matched an element"),
        }
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let has_content = self.style.is_some()
            || self.justification.is_some()
            || self.num_id.is_some()
            || !self.unknown_children.is_empty();

        if !has_content {
            return Ok(());
        }

        writer.write_event(Event::Start(BytesStart::new("w:pPr")))?;

        if let Some(style) = &self.style {
            let mut elem = BytesStart::new("w:pStyle");
            elem.push_attribute(("w:val", style.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if self.num_id.is_some() || self.num_level.is_some() {
            writer.write_event(Event::Start(BytesStart::new("w:numPr")))?;
            if let Some(level) = self.num_level {
                let mut elem = BytesStart::new("w:ilvl");
                elem.push_attribute(("w:val", level.to_string().as_str()));
                writer.write_event(Event::Empty(elem))?;
            }
            if let Some(num_id) = self.num_id {
                let mut elem = BytesStart::new("w:numId");
                elem.push_attribute(("w:val", num_id.to_string().as_str()));
                writer.write_event(Event::Empty(elem))?;
            }
            writer.write_event(Event::End(BytesEnd::new("w:numPr")))?;
        }

        if let Some(jc) = &self.justification {
            let mut elem = BytesStart::new("w:jc");
            elem.push_attribute(("w:val", jc.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        for child in &self.unknown_children {
            child.write_to(writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;
        Ok(())
    }
}

fn parse_bookmark_start(e: &BytesStart) -> ParagraphContent {
    let id = crate::xml::get_attr(e, "w:id")
        .or_else(|| crate::xml::get_attr(e, "id"))
        .unwrap_or_default();
    let name = crate::xml::get_attr(e, "w:name")
        .or_else(|| crate::xml::get_attr(e, "name"))
        .unwrap_or_default();
    ParagraphContent::BookmarkStart { id, name }
}

fn parse_bookmark_end(e: &BytesStart) -> ParagraphContent {
    let id = crate::xml::get_attr(e, "w:id")
        .or_else(|| crate::xml::get_attr(e, "id"))
        .unwrap_or_default();
    ParagraphContent::BookmarkEnd { id }
}

/// Parse numbering properties
fn parse_num_pr<R: BufRead>(reader: &mut Reader<R>, props: &mut ParagraphProperties) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) => {
                let local = e.name().local_name();
                match local.as_ref() {
                    b"numId" => {
                        props.num_id = get_w_val(&e).and_then(|v| v.parse().ok());
                    }
                    b"ilvl" => {
                        props.num_level = get_w_val(&e).and_then(|v| v.parse().ok());
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.name().local_name().as_ref() == b"numPr" {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Skip to end of current element
fn skip_to_end<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<()> {
    let name = start.name().as_ref().to_vec();
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == name => depth += 1,
            Event::End(e) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn read_attrs(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                String::from_utf8_lossy(&a.value).to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_paragraph(xml: &str) -> Paragraph {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Start(e) if e.name().local_name().as_ref() == b"p" => {
                    let start = e.to_owned();
                    return Paragraph::from_reader(&mut reader, &start).unwrap();
                }
                Event::Eof => panic!("no paragraph found"),
                _ => {}
            }
            buf.clear();
        }
    }

    #[test]
    fn test_hyperlink_paragraph_is_complex() {
        let para = parse_paragraph(
            r#"<w:p><w:hyperlink r:id="rId4"><w:r><w:t>click</w:t></w:r></w:hyperlink></w:p>"#,
        );
        assert!(!para.is_simple());
        assert_eq!(para.text(), "click");
    }

    #[test]
    fn test_simple_paragraph_rewrite_keeps_first_run_props() {
        let para_xml = r#"<w:p>
            <w:r><w:rPr><w:b/></w:rPr><w:t>Hello </w:t></w:r>
            <w:r><w:t>world</w:t></w:r>
        </w:p>"#;
        let mut para = parse_paragraph(para_xml);
        assert!(para.is_simple());

        para.rewrite_simple_text("Goodbye");

        let runs: Vec<_> = para.runs().collect();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].bold());
        assert_eq!(para.text(), "Goodbye");
    }

    #[test]
    fn test_fld_simple_parsing_and_dirty() {
        let mut para = parse_paragraph(
            r#"<w:p><w:fldSimple w:instr=" TOC \o &quot;1-3&quot; "><w:r><w:t>Contents</w:t></w:r></w:fldSimple></w:p>"#,
        );
        assert!(para.has_field_code());
        assert!(!para.is_simple());

        let marked = para.mark_fields_dirty(&|instr| instr.contains("TOC"));
        assert_eq!(marked, 1);
        // Second pass is a no-op
        assert_eq!(para.mark_fields_dirty(&|instr| instr.contains("TOC")), 0);
    }

    #[test]
    fn test_complex_field_region_mask() {
        let para = parse_paragraph(
            r#"<w:p>
                <w:r><w:t>before</w:t></w:r>
                <w:r><w:fldChar w:fldCharType="begin"/></w:r>
                <w:r><w:instrText> PAGE </w:instrText></w:r>
                <w:r><w:fldChar w:fldCharType="separate"/></w:r>
                <w:r><w:t>7</w:t></w:r>
                <w:r><w:fldChar w:fldCharType="end"/></w:r>
                <w:r><w:t>after</w:t></w:r>
            </w:p>"#,
        );
        let mask = para.field_region_mask();
        assert_eq!(mask, vec![false, true, true, true, true, true, false]);
    }

    #[test]
    fn test_mark_complex_field_dirty() {
        let mut para = parse_paragraph(
            r#"<w:p>
                <w:r><w:fldChar w:fldCharType="begin"/></w:r>
                <w:r><w:instrText> PAGE </w:instrText></w:r>
                <w:r><w:fldChar w:fldCharType="end"/></w:r>
            </w:p>"#,
        );
        assert_eq!(para.mark_fields_dirty(&|instr| instr.contains("PAGE")), 1);

        if let ParagraphContent::Run(run) = &para.content[0] {
            assert!(matches!(
                &run.content[0],
                RunContent::FieldChar(fc) if fc.dirty && fc.kind == FieldCharKind::Begin
            ));
        } else {
            panic!("expected run");
        }
    }

    #[test]
    fn test_tracked_change_roundtrip() {
        let para = parse_paragraph(
            r#"<w:p><w:del w:id="3" w:author="editor"><w:r><w:delText>old</w:delText></w:r></w:del><w:ins w:id="4" w:author="editor"><w:r><w:t>new</w:t></w:r></w:ins></w:p>"#,
        );
        assert!(matches!(&para.content[0], ParagraphContent::Delete(d) if d.author.as_deref() == Some("editor")));
        // Deleted text is not visible; inserted text is
        assert_eq!(para.text(), "new");
    }
}
