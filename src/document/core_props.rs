//! Core document properties (/docProps/core.xml)

use crate::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Package-level metadata extracted from the core-properties part
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
}

impl DocumentMetadata {
    /// Parse from the core.xml part content
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut meta = DocumentMetadata::default();
        let mut buf = Vec::new();
        let mut current: Option<Field> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    current = match e.name().local_name().as_ref() {
                        b"title" => Some(Field::Title),
                        b"creator" => Some(Field::Author),
                        b"subject" => Some(Field::Subject),
                        b"keywords" => Some(Field::Keywords),
                        b"description" => Some(Field::Description),
                        _ => None,
                    };
                }
                Event::Text(t) => {
                    if let Some(field) = current {
                        let text = t.unescape()?.to_string();
                        let slot = match field {
                            Field::Title => &mut meta.title,
                            Field::Author => &mut meta.author,
                            Field::Subject => &mut meta.subject,
                            Field::Keywords => &mut meta.keywords,
                            Field::Description => &mut meta.description,
                        };
                        match slot {
                            Some(existing) => existing.push_str(&text),
                            None => *slot = Some(text),
                        }
                    }
                }
                Event::End(_) => {
                    current = None;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(meta)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Author,
    Subject,
    Keywords,
    Description,
}
