//! Document model - high-level API for DOCX documents
//!
//! `Document` pairs the parsed body with its underlying OPC package and is
//! the single mutation surface the editing pipeline goes through: hyperlink
//! enumeration and rewriting, relationship bookkeeping, paragraph rewrites,
//! and field dirty-marking all happen here, in memory, until `save`.

mod body;
mod core_props;
mod paragraph;
mod run;
mod table;

pub use body::{BlockContent, Body};
pub use core_props::DocumentMetadata;
pub use paragraph::{
    Hyperlink, Paragraph, ParagraphContent, ParagraphProperties, SimpleField, TrackedChange,
};
pub use run::{BreakType, FieldChar, FieldCharKind, Run, RunContent, RunProperties};
pub use table::{GridColumn, Table, TableCell, TableRow};

use crate::error::{Error, Result};
use crate::opc::{rel_types, well_known, Package, Part, TargetMode, MAIN_DOCUMENT};
use crate::xml;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::{BufRead, Cursor};
use std::path::Path;

/// Address of a paragraph within the document body.
///
/// Paragraphs live either directly in the body or inside a table cell;
/// integer indices stand in for parent pointers so mutation can go through
/// `Document` methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParagraphAddr {
    /// Index into the body's block content
    pub block: usize,
    /// Set when the paragraph sits inside a table cell
    pub cell: Option<CellAddr>,
}

/// Position of a paragraph inside a table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellAddr {
    pub row: usize,
    pub col: usize,
    pub para: usize,
}

/// Address of a hyperlink element: its paragraph plus the index of the
/// hyperlink within the paragraph's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HyperlinkAddr {
    pub paragraph: ParagraphAddr,
    pub item: usize,
}

/// One enumerated hyperlink element
#[derive(Clone, Debug)]
pub struct HyperlinkInfo {
    pub addr: HyperlinkAddr,
    /// Relationship id (r:id), when present
    pub rel_id: Option<String>,
    /// Internal anchor (w:anchor), when present
    pub anchor: Option<String>,
    /// Resolved relationship target
    pub target: Option<String>,
    /// Whether the relationship is external
    pub external: bool,
    /// Concatenated text of the hyperlink's runs
    pub display_text: String,
    /// rel_id present but no matching relationship exists
    pub broken: bool,
}

/// A DOCX document
#[derive(Debug)]
pub struct Document {
    /// Underlying OPC package
    package: Package,
    /// Parsed document body
    body: Body,
}

impl Document {
    /// Open a document from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let package = Package::open(path)?;
        Self::from_package(package)
    }

    /// Open a document from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let package = Package::from_bytes(bytes)?;
        Self::from_package(package)
    }

    /// Create document from an OPC package
    pub fn from_package(package: Package) -> Result<Self> {
        let doc_part = package
            .main_document_part()
            .ok_or_else(|| Error::MissingPart("Main document part not found".into()))?;

        let xml = doc_part.data_as_str()?;
        let body = parse_document_xml(xml)?;

        Ok(Self { package, body })
    }

    /// Create a new empty document
    pub fn new() -> Self {
        Self {
            package: Package::new(),
            body: Body::default(),
        }
    }

    /// Save the document to a file
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.update_package()?;
        self.package.save(path)
    }

    /// Save the document to bytes
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.update_package()?;
        self.package.to_bytes()
    }

    /// Serialize the body back into the main document part.
    ///
    /// The existing part is updated in place so its relationships (the
    /// hyperlink targets this crate edits) survive the round-trip.
    fn update_package(&mut self) -> Result<()> {
        let xml = serialize_document_xml(&self.body)?;

        if let Some(part) = self.package.main_document_part_mut() {
            part.set_data(xml.into_bytes());
            return Ok(());
        }

        // Freshly authored document: create the part and its relationship
        let uri = well_known::document();
        let part = Part::new(uri.clone(), MAIN_DOCUMENT, xml.into_bytes());
        self.package.add_part(part);
        self.package
            .add_relationship(rel_types::OFFICE_DOCUMENT, "word/document.xml");
        Ok(())
    }

    // === Paragraph access ===

    /// Addresses of all paragraphs in document order: body paragraphs and
    /// table-cell paragraphs, tables visited row-major at their position.
    pub fn paragraph_addrs(&self) -> Vec<ParagraphAddr> {
        let mut addrs = Vec::new();
        for (block, content) in self.body.content.iter().enumerate() {
            match content {
                BlockContent::Paragraph(_) => addrs.push(ParagraphAddr { block, cell: None }),
                BlockContent::Table(table) => {
                    for (row, tr) in table.rows.iter().enumerate() {
                        for (col, tc) in tr.cells.iter().enumerate() {
                            for para in 0..tc.paragraphs.len() {
                                addrs.push(ParagraphAddr {
                                    block,
                                    cell: Some(CellAddr { row, col, para }),
                                });
                            }
                        }
                    }
                }
                BlockContent::Unknown(_) => {}
            }
        }
        addrs
    }

    /// Resolve a paragraph address
    pub fn paragraph(&self, addr: &ParagraphAddr) -> Option<&Paragraph> {
        match self.body.content.get(addr.block)? {
            BlockContent::Paragraph(p) => {
                if addr.cell.is_none() {
                    Some(p)
                } else {
                    None
                }
            }
            BlockContent::Table(t) => {
                let cell = addr.cell.as_ref()?;
                t.rows
                    .get(cell.row)?
                    .cells
                    .get(cell.col)?
                    .paragraphs
                    .get(cell.para)
            }
            BlockContent::Unknown(_) => None,
        }
    }

    /// Resolve a paragraph address mutably
    pub fn paragraph_mut(&mut self, addr: &ParagraphAddr) -> Option<&mut Paragraph> {
        match self.body.content.get_mut(addr.block)? {
            BlockContent::Paragraph(p) => {
                if addr.cell.is_none() {
                    Some(p)
                } else {
                    None
                }
            }
            BlockContent::Table(t) => {
                let cell = addr.cell.as_ref()?;
                t.rows
                    .get_mut(cell.row)?
                    .cells
                    .get_mut(cell.col)?
                    .paragraphs
                    .get_mut(cell.para)
            }
            BlockContent::Unknown(_) => None,
        }
    }

    /// Visible text of a paragraph
    pub fn paragraph_text(&self, addr: &ParagraphAddr) -> Option<String> {
        self.paragraph(addr).map(|p| p.text())
    }

    /// Rewrite a simple paragraph's text, consolidating into the first run
    pub fn rewrite_simple_paragraph_text(
        &mut self,
        addr: &ParagraphAddr,
        text: impl Into<String>,
    ) -> Result<()> {
        let para = self
            .paragraph_mut(addr)
            .ok_or_else(|| Error::InvalidDocument(format!("no paragraph at {:?}", addr)))?;
        para.rewrite_simple_text(text);
        Ok(())
    }

    /// Get all top-level paragraphs
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.body.paragraphs()
    }

    /// Get all text in the document
    pub fn text(&self) -> String {
        self.paragraph_addrs()
            .iter()
            .filter_map(|a| self.paragraph_text(a))
            .collect::<Vec<_>>()
            .join("\n")
    }

    // === Hyperlink surface ===

    /// Addresses of all hyperlink elements in document order
    pub fn hyperlink_addrs(&self) -> Vec<HyperlinkAddr> {
        let mut addrs = Vec::new();
        for paddr in self.paragraph_addrs() {
            if let Some(para) = self.paragraph(&paddr) {
                for (item, content) in para.content.iter().enumerate() {
                    if matches!(content, ParagraphContent::Hyperlink(_)) {
                        addrs.push(HyperlinkAddr {
                            paragraph: paddr.clone(),
                            item,
                        });
                    }
                }
            }
        }
        addrs
    }

    /// Enumerate hyperlink elements with their resolved targets.
    ///
    /// Elements whose relationship id no longer resolves are reported with
    /// `broken = true` so the sweeper can dispose of them; enumeration
    /// order is stable across repeated calls on an unchanged document.
    pub fn enumerate_hyperlinks(&self) -> Vec<HyperlinkInfo> {
        let rels = self
            .package
            .main_document_part()
            .and_then(|p| p.relationships());

        self.hyperlink_addrs()
            .into_iter()
            .filter_map(|addr| {
                let link = self.hyperlink(&addr)?;
                let mut info = HyperlinkInfo {
                    addr,
                    rel_id: link.rel_id.clone(),
                    anchor: link.anchor.clone(),
                    target: None,
                    external: false,
                    display_text: link.display_text(),
                    broken: false,
                };
                if let Some(rel_id) = &info.rel_id {
                    match rels.and_then(|r| r.get(rel_id)) {
                        Some(rel) => {
                            info.target = Some(rel.target.clone());
                            info.external = rel.target_mode == TargetMode::External;
                        }
                        None => info.broken = true,
                    }
                }
                Some(info)
            })
            .collect()
    }

    /// Resolve a hyperlink address
    pub fn hyperlink(&self, addr: &HyperlinkAddr) -> Option<&Hyperlink> {
        match self.paragraph(&addr.paragraph)?.content.get(addr.item)? {
            ParagraphContent::Hyperlink(h) => Some(h),
            _ => None,
        }
    }

    /// Resolve a hyperlink address mutably
    pub fn hyperlink_mut(&mut self, addr: &HyperlinkAddr) -> Option<&mut Hyperlink> {
        match self
            .paragraph_mut(&addr.paragraph)?
            .content
            .get_mut(addr.item)?
        {
            ParagraphContent::Hyperlink(h) => Some(h),
            _ => None,
        }
    }

    /// Add an external hyperlink relationship on the main document part.
    ///
    /// With a `preferred_id`, fails with [`Error::RelationshipIdInUse`] if
    /// that id is live; callers fall back to the service-assigned id.
    pub fn add_hyperlink_relationship(
        &mut self,
        target: &str,
        preferred_id: Option<&str>,
    ) -> Result<String> {
        let part = self
            .package
            .main_document_part_mut()
            .ok_or_else(|| Error::MissingPart("Main document part not found".into()))?;
        let rels = part.ensure_relationships();

        match preferred_id {
            Some(id) => {
                rels.try_add_with_id(id, rel_types::HYPERLINK, target, TargetMode::External)?;
                Ok(id.to_string())
            }
            None => Ok(rels.add_external(rel_types::HYPERLINK, target)),
        }
    }

    /// Delete a hyperlink relationship, tolerating already-deleted ids.
    ///
    /// Returns whether a relationship was actually removed.
    pub fn delete_hyperlink_relationship(&mut self, rel_id: &str) -> bool {
        self.package
            .main_document_part_mut()
            .and_then(|p| p.relationships_mut())
            .and_then(|r| r.remove(rel_id))
            .is_some()
    }

    /// Rebind a hyperlink element to a different relationship id
    pub fn set_hyperlink_rel_id(&mut self, addr: &HyperlinkAddr, rel_id: &str) -> Result<()> {
        let link = self
            .hyperlink_mut(addr)
            .ok_or_else(|| Error::InvalidDocument(format!("no hyperlink at {:?}", addr)))?;
        link.rel_id = Some(rel_id.to_string());
        Ok(())
    }

    /// Replace a hyperlink's display text, preserving the first run's
    /// formatting properties
    pub fn replace_hyperlink_display_text(
        &mut self,
        addr: &HyperlinkAddr,
        text: impl Into<String>,
    ) -> Result<()> {
        let link = self
            .hyperlink_mut(addr)
            .ok_or_else(|| Error::InvalidDocument(format!("no hyperlink at {:?}", addr)))?;
        link.set_display_text(text);
        Ok(())
    }

    /// Remove a hyperlink element from its paragraph
    pub fn remove_hyperlink_element(&mut self, addr: &HyperlinkAddr) -> Result<()> {
        let para = self
            .paragraph_mut(&addr.paragraph)
            .ok_or_else(|| Error::InvalidDocument(format!("no paragraph at {:?}", addr.paragraph)))?;
        if !matches!(
            para.content.get(addr.item),
            Some(ParagraphContent::Hyperlink(_))
        ) {
            return Err(Error::InvalidDocument(format!("no hyperlink at {:?}", addr)));
        }
        para.content.remove(addr.item);
        Ok(())
    }

    /// Resolve the target of a hyperlink relationship
    pub fn hyperlink_relationship_target(&self, rel_id: &str) -> Option<String> {
        self.package
            .main_document_part()?
            .relationships()?
            .get(rel_id)
            .map(|r| r.target.clone())
    }

    /// Snapshot of all hyperlink relationships (id, target) for diagnostics
    pub fn relationship_snapshot(&self) -> Vec<(String, String)> {
        let mut snapshot: Vec<(String, String)> = self
            .package
            .main_document_part()
            .and_then(|p| p.relationships())
            .map(|rels| {
                rels.all_by_type(rel_types::HYPERLINK)
                    .into_iter()
                    .map(|r| (r.id.clone(), r.target.clone()))
                    .collect()
            })
            .unwrap_or_default();
        snapshot.sort();
        snapshot
    }

    // === Fields and metadata ===

    /// Mark fields whose instruction matches the predicate as dirty so the
    /// consuming word processor recomputes them on next open.
    ///
    /// Returns the number of fields marked.
    pub fn mark_fields_dirty(&mut self, predicate: &dyn Fn(&str) -> bool) -> usize {
        let addrs = self.paragraph_addrs();
        let mut marked = 0;
        for addr in addrs {
            if let Some(para) = self.paragraph_mut(&addr) {
                marked += para.mark_fields_dirty(predicate);
            }
        }
        marked
    }

    /// Read package metadata from the core-properties part
    pub fn metadata(&self) -> DocumentMetadata {
        let uri = self
            .package
            .part_uri_by_rel_type(rel_types::CORE_PROPERTIES)
            .unwrap_or_else(well_known::core_props);

        self.package
            .part(&uri)
            .and_then(|p| p.data_as_str().ok().map(str::to_string))
            .and_then(|xml| DocumentMetadata::from_xml(&xml).ok())
            .unwrap_or_default()
    }

    /// Get the underlying package
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Get the body
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Get mutable body
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    // === Authoring (fixtures and new documents) ===

    /// Add a paragraph with text
    pub fn add_paragraph(&mut self, text: impl Into<String>) {
        self.body.add_paragraph(Paragraph::new(text));
    }

    /// Append a paragraph holding a single external hyperlink; returns the
    /// relationship id.
    pub fn append_hyperlink_paragraph(
        &mut self,
        url: &str,
        display_text: &str,
    ) -> Result<String> {
        // Authoring path: make sure the main part exists first
        if self.package.main_document_part().is_none() {
            self.update_package()?;
        }
        let rel_id = self.add_hyperlink_relationship(url, None)?;
        let mut para = Paragraph::default();
        para.add_hyperlink(Hyperlink::external(rel_id.clone(), display_text));
        self.body.add_paragraph(para);
        Ok(rel_id)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse document.xml content.
///
/// Text is never trimmed here: leading and trailing whitespace inside
/// w:t nodes is significant (xml:space="preserve"); inter-element
/// whitespace is simply not collected by the element parsers.
fn parse_document_xml(xml: &str) -> Result<Body> {
    let mut reader = Reader::from_str(xml);

    let mut buf = Vec::new();
    let mut body = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name();
                let local = name.local_name();

                match local.as_ref() {
                    b"body" => {
                        body = Some(Body::from_reader(&mut reader)?);
                    }
                    b"document" => {
                        // Continue to find body
                    }
                    _ => {
                        skip_element(&mut reader, &e)?;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    body.ok_or_else(|| Error::InvalidDocument("Missing w:body element".into()))
}

/// Serialize body to document.xml content
fn serialize_document_xml(body: &Body) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    let mut writer = Writer::new(&mut buffer);

    writer.write_event(Event::Decl(BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        Some("yes"),
    )))?;

    let mut doc_start = BytesStart::new("w:document");
    for (attr, value) in xml::document_namespaces() {
        doc_start.push_attribute((attr, value));
    }
    writer.write_event(Event::Start(doc_start))?;

    body.write_to(&mut writer)?;

    writer.write_event(Event::End(BytesEnd::new("w:document")))?;

    let xml_bytes = buffer.into_inner();
    String::from_utf8(xml_bytes).map_err(|e| Error::InvalidDocument(e.to_string()))
}

/// Skip an element and all its children
fn skip_element<R: BufRead>(
    reader: &mut Reader<R>,
    start: &quick_xml::events::BytesStart,
) -> Result<()> {
    let target = start.name().as_ref().to_vec();
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == target => depth += 1,
            Event::End(e) if e.name().as_ref() == target => {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_enumerate_hyperlinks() {
        let mut doc = Document::new();
        doc.add_paragraph("intro");
        let rid = doc
            .append_hyperlink_paragraph("https://example.com/a?docid=X", "Link A")
            .unwrap();

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rel_id.as_deref(), Some(rid.as_str()));
        assert_eq!(links[0].display_text, "Link A");
        assert_eq!(links[0].target.as_deref(), Some("https://example.com/a?docid=X"));
        assert!(links[0].external);
        assert!(!links[0].broken);
    }

    #[test]
    fn test_roundtrip_preserves_hyperlink() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com/x", "X marks the spot")
            .unwrap();

        let bytes = doc.to_bytes().unwrap();
        let doc2 = Document::from_bytes(&bytes).unwrap();

        let links = doc2.enumerate_hyperlinks();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].display_text, "X marks the spot");
        assert_eq!(links[0].target.as_deref(), Some("https://example.com/x"));
    }

    #[test]
    fn test_broken_relationship_reported() {
        let mut doc = Document::new();
        let rid = doc
            .append_hyperlink_paragraph("https://example.com/y", "Y")
            .unwrap();
        assert!(doc.delete_hyperlink_relationship(&rid));

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links.len(), 1);
        assert!(links[0].broken);
        assert!(links[0].target.is_none());
    }

    #[test]
    fn test_replace_display_text_keeps_formatting() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com/z", "old text")
            .unwrap();

        // Give the first run some formatting to preserve
        let addr = doc.hyperlink_addrs().remove(0);
        doc.hyperlink_mut(&addr).unwrap().runs[0].set_bold(true);

        doc.replace_hyperlink_display_text(&addr, "new text").unwrap();

        let link = doc.hyperlink(&addr).unwrap();
        assert_eq!(link.display_text(), "new text");
        assert_eq!(link.runs.len(), 1);
        assert!(link.runs[0].bold());
    }

    #[test]
    fn test_remove_hyperlink_element() {
        let mut doc = Document::new();
        doc.append_hyperlink_paragraph("https://example.com/gone", "")
            .unwrap();

        let addr = doc.hyperlink_addrs().remove(0);
        doc.remove_hyperlink_element(&addr).unwrap();
        assert!(doc.hyperlink_addrs().is_empty());

        // Second removal at the same address must fail cleanly
        assert!(doc.remove_hyperlink_element(&addr).is_err());
    }

    #[test]
    fn test_hyperlinks_inside_table_cells() {
        let mut doc = Document::new();
        let mut table = Table::new(1, 2);

        // Build the main part first so relationships have a home
        doc.add_paragraph("before");
        let _ = doc.to_bytes().unwrap();
        let rid = doc
            .add_hyperlink_relationship("https://example.com/cell", None)
            .unwrap();

        let mut para = Paragraph::default();
        para.add_hyperlink(Hyperlink::external(rid, "cell link"));
        table.cell_mut(0, 1).unwrap().add_paragraph(para);
        doc.body_mut().add_table(table);

        let links = doc.enumerate_hyperlinks();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].display_text, "cell link");
        assert!(links[0].addr.paragraph.cell.is_some());
    }
}
