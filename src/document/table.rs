//! Table elements (w:tbl, w:tr, w:tc)
//!
//! Tables matter to the editing pipeline for two reasons: their cell
//! paragraphs carry hyperlinks and user text like any body paragraph, and
//! some consumers reject cells without at least one paragraph, which the
//! text optimizer repairs.

use crate::document::Paragraph;
use crate::error::Result;
use crate::xml::{RawXmlElement, RawXmlNode};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::BufRead;

/// Table element (w:tbl)
#[derive(Clone, Debug, Default)]
pub struct Table {
    /// Table properties (preserved raw)
    pub properties: Option<RawXmlNode>,
    /// Table grid
    pub grid: Vec<GridColumn>,
    /// Table rows
    pub rows: Vec<TableRow>,
    /// Unknown children (preserved)
    pub unknown_children: Vec<RawXmlNode>,
}

/// Grid column definition
#[derive(Clone, Debug, Default)]
pub struct GridColumn {
    /// Width in twips
    pub width: Option<i32>,
}

/// Table row (w:tr)
#[derive(Clone, Debug, Default)]
pub struct TableRow {
    /// Row properties (preserved raw)
    pub properties: Option<RawXmlNode>,
    /// Cells
    pub cells: Vec<TableCell>,
    /// Unknown children (preserved)
    pub unknown_children: Vec<RawXmlNode>,
}

/// Table cell (w:tc)
#[derive(Clone, Debug, Default)]
pub struct TableCell {
    /// Cell properties (preserved raw)
    pub properties: Option<RawXmlNode>,
    /// Cell content (paragraphs)
    pub paragraphs: Vec<Paragraph>,
    /// Unknown children (preserved)
    pub unknown_children: Vec<RawXmlNode>,
}

impl Table {
    /// Create a new table with the specified number of rows and columns
    pub fn new(rows: usize, cols: usize) -> Self {
        let table_rows = (0..rows)
            .map(|_| TableRow {
                cells: (0..cols).map(|_| TableCell::default()).collect(),
                ..Default::default()
            })
            .collect();

        let grid = (0..cols).map(|_| GridColumn { width: None }).collect();

        Table {
            grid,
            rows: table_rows,
            ..Default::default()
        }
    }

    /// Parse from reader (after w:tbl start tag)
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, _start: &BytesStart) -> Result<Self> {
        let mut table = Table::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let local = e.name().local_name();

                    match local.as_ref() {
                        b"tblPr" => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            table.properties = Some(RawXmlNode::Element(raw));
                        }
                        b"tblGrid" => {
                            table.grid = parse_table_grid(reader)?;
                        }
                        b"tr" => {
                            let row = TableRow::from_reader(reader, &e)?;
                            table.rows.push(row);
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            table.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::Empty(e) => {
                    let raw = RawXmlElement::from_empty(&e);
                    table.unknown_children.push(RawXmlNode::Element(raw));
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"tbl" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(table)
    }

    /// Iterate over rows
    pub fn rows(&self) -> impl Iterator<Item = &TableRow> {
        self.rows.iter()
    }

    /// Get cell at position
    pub fn cell(&self, row: usize, col: usize) -> Option<&TableCell> {
        self.rows.get(row)?.cells.get(col)
    }

    /// Get mutable cell at position
    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut TableCell> {
        self.rows.get_mut(row)?.cells.get_mut(col)
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("w:tbl")))?;

        if let Some(props) = &self.properties {
            props.write_to(writer)?;
        }

        if !self.grid.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("w:tblGrid")))?;
            for col in &self.grid {
                let mut elem = BytesStart::new("w:gridCol");
                if let Some(w) = col.width {
                    elem.push_attribute(("w:w", w.to_string().as_str()));
                }
                writer.write_event(Event::Empty(elem))?;
            }
            writer.write_event(Event::End(BytesEnd::new("w:tblGrid")))?;
        }

        for row in &self.rows {
            row.write_to(writer)?;
        }

        for child in &self.unknown_children {
            child.write_to(writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("w:tbl")))?;
        Ok(())
    }
}

impl TableRow {
    /// Parse from reader
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, _start: &BytesStart) -> Result<Self> {
        let mut row = TableRow::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let local = e.name().local_name();

                    match local.as_ref() {
                        b"trPr" => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            row.properties = Some(RawXmlNode::Element(raw));
                        }
                        b"tc" => {
                            let cell = TableCell::from_reader(reader, &e)?;
                            row.cells.push(cell);
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            row.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::Empty(e) => {
                    let raw = RawXmlElement::from_empty(&e);
                    row.unknown_children.push(RawXmlNode::Element(raw));
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"tr" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(row)
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("w:tr")))?;

        if let Some(props) = &self.properties {
            props.write_to(writer)?;
        }

        for cell in &self.cells {
            cell.write_to(writer)?;
        }

        for child in &self.unknown_children {
            child.write_to(writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("w:tr")))?;
        Ok(())
    }
}

impl TableCell {
    /// Parse from reader
    pub fn from_reader<R: BufRead>(reader: &mut Reader<R>, _start: &BytesStart) -> Result<Self> {
        let mut cell = TableCell::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let local = e.name().local_name();

                    match local.as_ref() {
                        b"tcPr" => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            cell.properties = Some(RawXmlNode::Element(raw));
                        }
                        b"p" => {
                            let para = Paragraph::from_reader(reader, &e)?;
                            cell.paragraphs.push(para);
                        }
                        _ => {
                            let raw = RawXmlElement::from_reader(reader, &e)?;
                            cell.unknown_children.push(RawXmlNode::Element(raw));
                        }
                    }
                }
                Event::Empty(e) => {
                    let local = e.name().local_name();
                    if local.as_ref() == b"p" {
                        let para = Paragraph::from_empty(&e)?;
                        cell.paragraphs.push(para);
                    } else {
                        let raw = RawXmlElement::from_empty(&e);
                        cell.unknown_children.push(RawXmlNode::Element(raw));
                    }
                }
                Event::End(e) => {
                    if e.name().local_name().as_ref() == b"tc" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(cell)
    }

    /// Get cell text (all paragraphs concatenated)
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Add a paragraph to the cell
    pub fn add_paragraph(&mut self, para: Paragraph) {
        self.paragraphs.push(para);
    }

    /// Write to XML writer
    pub fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("w:tc")))?;

        if let Some(props) = &self.properties {
            props.write_to(writer)?;
        }

        // A cell must carry at least one paragraph
        if self.paragraphs.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new("w:p")))?;
        } else {
            for para in &self.paragraphs {
                para.write_to(writer)?;
            }
        }

        for child in &self.unknown_children {
            child.write_to(writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new("w:tc")))?;
        Ok(())
    }
}

/// Parse table grid
fn parse_table_grid<R: BufRead>(reader: &mut Reader<R>) -> Result<Vec<GridColumn>> {
    let mut columns = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) => {
                if e.name().local_name().as_ref() == b"gridCol" {
                    let width = crate::xml::get_attr(&e, "w:w")
                        .or_else(|| crate::xml::get_attr(&e, "w"))
                        .and_then(|v| v.parse().ok());
                    columns.push(GridColumn { width });
                }
            }
            Event::End(e) => {
                if e.name().local_name().as_ref() == b"tblGrid" {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(columns)
}
