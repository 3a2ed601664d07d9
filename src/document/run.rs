//! Run element (w:r) - a contiguous run of text with uniform formatting
//!
//! Beyond plain text the editing pipeline needs to see field machinery
//! (w:fldChar / w:instrText), tracked deletions (w:delText), and embedded
//! drawings, so those are modeled explicitly instead of being swallowed
//! into raw preservation nodes.

use crate::error::Result;
use crate::xml::{get_w_val, is_on, parse_bool, RawXmlElement, RawXmlNode};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::BufRead;

/// Run element (w:r)
#[derive(Clone, Debug, Default)]
pub struct Run {
    /// Run properties
    pub properties: Option<RunProperties>,
    /// Run content
    pub content: Vec<RunContent>,
    /// Unknown attributes (preserved)
    pub unknown_attrs: Vec<(String, String)>,
    /// Unknown children (preserved)
    pub unknown_children: Vec<RawXmlNode>,
}

/// Content within a run
#[derive(Clone, Debug)]
pub enum RunContent {
    /// Text (w:t)
    Text(String),
    /// Text inside a tracked deletion (w:delText)
    DeletedText(String),
    /// Tab (w:tab)
    Tab,
    /// Break (w:br)
    Break(BreakType),
    /// Carriage return (w:cr)
    CarriageReturn,
    /// Soft hyphen
    SoftHyphen,
    /// Non-breaking hyphen
    NoBreakHyphen,
    /// Complex field delimiter (w:fldChar)
    FieldChar(FieldChar),
    /// Complex field instruction text (w:instrText)
    InstrText(String),
    /// Unknown (preserved)
    Unknown(RawXmlNode),
}

/// Break type
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BreakType {
    #[default]
    TextWrapping,
    Page,
    Column,
}

/// Complex field delimiter (w:fldChar)
#[derive(Clone, Debug)]
pub struct FieldChar {
    pub kind: FieldCharKind,
    /// w:dirty - the consuming word processor recomputes the field on open
    pub dirty: bool,
    /// Remaining attributes, preserved for round-trip
    pub extra_attrs: Vec<(String, String)>,
}

/// Position of a w:fldChar within a complex field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldCharKind {
    Begin,
    Separate,
    End,
}

/// Run properties (w:rPr)
#[derive(Clone, Debug, Default)]
pub struct RunProperties {
    /// Style ID
    pub style: Option<String>,
    /// Bold
    pub bold: Option<bool>,
    /// Italic
    pub italic: Option<bool>,
    /// Underline type
    pub underline: Option<String>,
    /// Strike-through
    pub strike: Option<bool>,
    /// Font size (in half-points, e.g., 24 = 12pt)
    pub size: Option<u32>,
    /// Color (RGB hex)
    pub color: Option<String>,
    /// Highlight color
    pub highlight: Option<String>,
    /// Font (ASCII)
    pub font_ascii: Option<String>,
    /// Unknown children (preserved)
    pub unknown_children: Vec<RawXmlNode>,
}

/// Element names under a run that carry drawing or embedded-object content.
/// Text must never be introduced beneath these.
const DRAWING_NAMES: &[&str] = &["drawing", "pict", "object", "AlternateContent"];

impl Run {
    /// Parse from reader (after w:r start tag)
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<Self> {
        let mut run = Run::default();
        run.unknown_attrs = read_attrs(start);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"rPr" => {
                            run.properties = Some(RunProperties::from_reader(reader)?);
                        }
                        b"t" => {
                            let text = read_text_content(reader, b"t")?;
                            run.content.push(RunContent::Text(text));
                        }
                        b"delText" => {
                            let text = read_text_content(reader, b"delText")?;
                            run.content.push(RunContent::DeletedText(text));
                        }
                        b"instrText" => {
                            let text = read_text_content(reader, b"instrText")?;
                            run.content.push(RunContent::InstrText(text));
                        }
                        b"fldChar" => {
                            run.content.push(RunContent::FieldChar(parse_field_char(&e)));
                            skip_element(reader, &e)?;
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            run.content.push(RunContent::Unknown(RawXmlNode::Element(raw)));
                        }
                    }
                }
                Event::Empty(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"t" => {
                            run.content.push(RunContent::Text(String::new()));
                        }
                        b"delText" => {
                            run.content.push(RunContent::DeletedText(String::new()));
                        }
                        b"instrText" => {
                            run.content.push(RunContent::InstrText(String::new()));
                        }
                        b"fldChar" => {
                            run.content.push(RunContent::FieldChar(parse_field_char(&e)));
                        }
                        b"tab" => {
                            run.content.push(RunContent::Tab);
                        }
                        b"br" => {
                            let break_type = match crate::xml::get_attr(&e, "w:type")
                                .or_else(|| crate::xml::get_attr(&e, "type"))
                                .as_deref()
                            {
                                Some("page") => BreakType::Page,
                                Some("column") => BreakType::Column,
                                _ => BreakType::TextWrapping,
                            };
                            run.content.push(RunContent::Break(break_type));
                        }
                        b"cr" => {
                            run.content.push(RunContent::CarriageReturn);
                        }
                        b"softHyphen" => {
                            run.content.push(RunContent::SoftHyphen);
                        }
                        b"noBreakHyphen" => {
                            run.content.push(RunContent::NoBreakHyphen);
                        }
                        _ => {
                            let raw = RawXmlElement::from_empty(&e);
                            run.content.push(RunContent::Unknown(RawXmlNode::Element(raw)));
                        }
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"r" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(run)
    }

    /// Create from empty element
    pub fn from_empty(start: &BytesStart) -> Result<Self> {
        let mut run = Run::default();
        run.unknown_attrs = read_attrs(start);
        Ok(run)
    }

    /// Get all visible text in this run
    pub fn text(&self) -> String {
        let mut result = String::new();
        for content in &self.content {
            match content {
                RunContent::Text(t) => result.push_str(t),
                RunContent::Tab => result.push('\t'),
                RunContent::Break(BreakType::TextWrapping) => result.push('\n'),
                RunContent::CarriageReturn => result.push('\n'),
                _ => {}
            }
        }
        result
    }

    /// Whether this run carries only plain text nodes (no breaks, tabs,
    /// field machinery, drawings, or preserved unknowns).
    pub fn is_plain_text(&self) -> bool {
        self.unknown_children.is_empty()
            && self
                .content
                .iter()
                .all(|c| matches!(c, RunContent::Text(_)))
    }

    /// Whether this run participates in a complex field
    pub fn has_field_machinery(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, RunContent::FieldChar(_) | RunContent::InstrText(_)))
    }

    /// Whether this run embeds a drawing, picture, or OLE object
    pub fn has_drawing(&self) -> bool {
        let is_drawing = |node: &RawXmlNode| {
            node.element_name()
                .map(|n| {
                    let local = n.rsplit(':').next().unwrap_or(n);
                    DRAWING_NAMES.contains(&local)
                })
                .unwrap_or(false)
        };
        self.content
            .iter()
            .any(|c| matches!(c, RunContent::Unknown(node) if is_drawing(node)))
            || self.unknown_children.iter().any(is_drawing)
    }

    /// Check if bold
    pub fn bold(&self) -> bool {
        self.properties.as_ref().and_then(|p| p.bold).unwrap_or(false)
    }

    /// Check if italic
    pub fn italic(&self) -> bool {
        self.properties.as_ref().and_then(|p| p.italic).unwrap_or(false)
    }

    /// Get color (RGB hex string)
    pub fn color(&self) -> Option<&str> {
        self.properties.as_ref()?.color.as_deref()
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new("w:r");
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

            writer.write_event(Event::End(BytesEnd::new("w:r")))?;
        }

        Ok(())
    }

    /// Create a new run with text
    pub fn new(text: impl Into<String>) -> Self {
        Run {
            content: vec![RunContent::Text(text.into())],
            ..Default::default()
        }
    }

    /// Create a run carrying the given text with the given properties
    pub fn with_properties(text: impl Into<String>, properties: Option<RunProperties>) -> Self {
        Run {
            properties,
            content: vec![RunContent::Text(text.into())],
            ..Default::default()
        }
    }

    /// Set bold
    pub fn set_bold(&mut self, bold: bool) {
        self.properties.get_or_insert_with(Default::default).bold = Some(bold);
    }

    /// Set color (RGB hex string)
    pub fn set_color(&mut self, color: impl Into<String>) {
        self.properties.get_or_insert_with(Default::default).color = Some(color.into());
    }
}

impl RunContent {
    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        match self {
            RunContent::Text(text) => write_text_element(writer, "w:t", text),
            RunContent::DeletedText(text) => write_text_element(writer, "w:delText", text),
            RunContent::InstrText(text) => write_text_element(writer, "w:instrText", text),
            RunContent::Tab => {
                writer.write_event(Event::Empty(BytesStart::new("w:tab")))?;
                Ok(())
            }
            RunContent::Break(break_type) => {
                let mut start = BytesStart::new("w:br");
                match break_type {
                    BreakType::Page => start.push_attribute(("w:type", "page")),
                    BreakType::Column => start.push_attribute(("w:type", "column")),
                    BreakType::TextWrapping => {}
                }
                writer.write_event(Event::Empty(start))?;
                Ok(())
            }
            RunContent::CarriageReturn => {
                writer.write_event(Event::Empty(BytesStart::new("w:cr")))?;
                Ok(())
            }
            RunContent::SoftHyphen => {
                writer.write_event(Event::Empty(BytesStart::new("w:softHyphen")))?;
                Ok(())
            }
            RunContent::NoBreakHyphen => {
                writer.write_event(Event::Empty(BytesStart::new("w:noBreakHyphen")))?;
                Ok(())
            }
            RunContent::FieldChar(fc) => {
                let mut start = BytesStart::new("w:fldChar");
                start.push_attribute((
                    "w:fldCharType",
                    match fc.kind {
                        FieldCharKind::Begin => "begin",
                        FieldCharKind::Separate => "separate",
                        FieldCharKind::End => "end",
                    },
                ));
                if fc.dirty {
                    start.push_attribute(("w:dirty", "true"));
                }
                for (key, value) in &fc.extra_attrs {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                writer.write_event(Event::Empty(start))?;
                Ok(())
            }
            RunContent::Unknown(node) => node.write_to(writer),
        }
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    if text.starts_with(' ') || text.ends_with(' ') || text.contains("  ") {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn parse_field_char(e: &BytesStart) -> FieldChar {
    let mut kind = FieldCharKind::Begin;
    let mut dirty = false;
    let mut extra_attrs = Vec::new();

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match key.as_str() {
            "w:fldCharType" | "fldCharType" => {
                kind = match value.as_str() {
                    "separate" => FieldCharKind::Separate,
                    "end" => FieldCharKind::End,
                    _ => FieldCharKind::Begin,
                };
            }
            "w:dirty" | "dirty" => dirty = is_on(&value),
            _ => extra_attrs.push((key, value)),
        }
    }

    FieldChar {
        kind,
        dirty,
        extra_attrs,
    }
}

impl RunProperties {
    /// Parse from reader (after w:rPr start tag)
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>) -> Result<Self> {
        let mut props = RunProperties::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let raw = RawXmlElement::from_reader(reader, &e)?;
                    props.unknown_children.push(RawXmlNode::Element(raw));
                }
                Event::Empty(e) => {
                    let name = e.name();
                    let local = name.local_name();

                    match local.as_ref() {
                        b"rStyle" => {
                            props.style = get_w_val(&e);
                        }
                        b"b" => {
                            props.bold = Some(parse_bool(&e));
                        }
                        b"i" => {
                            props.italic = Some(parse_bool(&e));
                        }
                        b"u" => {
                            props.underline = get_w_val(&e).or(Some("single".into()));
                        }
                        b"strike" => {
                            props.strike = Some(parse_bool(&e));
                        }
                        b"sz" => {
                            props.size = get_w_val(&e).and_then(|v| v.parse().ok());
                        }
                        b"color" => {
                            props.color = get_w_val(&e);
                        }
                        b"highlight" => {
                            props.highlight = get_w_val(&e);
                        }
                        b"rFonts" => {
                            props.font_ascii = crate::xml::get_attr(&e, "w:ascii")
                                .or_else(|| crate::xml::get_attr(&e, "ascii"));
                        }
                        _ => {
                            let raw = RawXmlElement::from_empty(&e);
                            props.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"rPr" {
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

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let has_content = self.style.is_some()
            || self.bold.is_some()
            || self.italic.is_some()
            || self.underline.is_some()
            || self.strike.is_some()
            || self.size.is_some()
            || self.color.is_some()
            || self.highlight.is_some()
            || self.font_ascii.is_some()
            || !self.unknown_children.is_empty();

        if !has_content {
            return Ok(());
        }

        writer.write_event(Event::Start(BytesStart::new("w:rPr")))?;

        if let Some(style) = &self.style {
            let mut elem = BytesStart::new("w:rStyle");
            elem.push_attribute(("w:val", style.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(font) = &self.font_ascii {
            let mut elem = BytesStart::new("w:rFonts");
            elem.push_attribute(("w:ascii", font.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(bold) = self.bold {
            let mut elem = BytesStart::new("w:b");
            if !bold {
                elem.push_attribute(("w:val", "0"));
            }
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(italic) = self.italic {
            let mut elem = BytesStart::new("w:i");
            if !italic {
                elem.push_attribute(("w:val", "0"));
            }
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(strike) = self.strike {
            let mut elem = BytesStart::new("w:strike");
            if !strike {
                elem.push_attribute(("w:val", "0"));
            }
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(underline) = &self.underline {
            let mut elem = BytesStart::new("w:u");
            elem.push_attribute(("w:val", underline.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(color) = &self.color {
            let mut elem = BytesStart::new("w:color");
            elem.push_attribute(("w:val", color.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(size) = self.size {
            let mut elem = BytesStart::new("w:sz");
            elem.push_attribute(("w:val", size.to_string().as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        if let Some(highlight) = &self.highlight {
            let mut elem = BytesStart::new("w:highlight");
            elem.push_attribute(("w:val", highlight.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }

        for child in &self.unknown_children {
            child.write_to(writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("w:rPr")))?;
        Ok(())
    }
}

/// Read text content from a text-bearing element (w:t, w:delText, w:instrText)
fn read_text_content<R: BufRead>(reader: &mut Reader<R>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => {
                text.push_str(&t.unescape()?);
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

    Ok(text)
}

/// Skip to end of element
fn skip_element<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<()> {
    let target_name = start.name().as_ref().to_vec();
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == target_name => depth += 1,
            Event::End(e) if e.name().as_ref() == target_name => {
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
