//! RSS item-list adapter.
//!
//! Walks the XML event stream with `quick-xml` and turns each `<item>` into
//! an [`Article`]. The body prefers `<content:encoded>` and falls back to
//! `<description>`. Nothing is truncated here; `pubDate` is kept verbatim.

use crate::error::ParseFailure;
use crate::models::Article;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    PubDate,
    Description,
    Encoded,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" => Some(Field::PubDate),
            b"description" => Some(Field::Description),
            b"content:encoded" => Some(Field::Encoded),
            _ => None,
        }
    }

    fn tag(self) -> &'static [u8] {
        match self {
            Field::Title => b"title",
            Field::Link => b"link",
            Field::PubDate => b"pubDate",
            Field::Description => b"description",
            Field::Encoded => b"content:encoded",
        }
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    link: String,
    pub_date: String,
    description: String,
    encoded: String,
}

impl ItemBuilder {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Description => &mut self.description,
            Field::Encoded => &mut self.encoded,
        };
        target.push_str(text);
    }

    fn build(self, source: &str) -> Article {
        let encoded = self.encoded.trim();
        let content = if encoded.is_empty() {
            self.description.trim()
        } else {
            encoded
        };
        Article {
            title: self.title.trim().to_string(),
            url: self.link.trim().to_string(),
            published: self.pub_date.trim().to_string(),
            source: source.to_string(),
            content: content.to_string(),
        }
    }
}

/// Parse up to `max_items` `<item>` elements, in document order.
///
/// Parsing stops once `max_items` items are complete, so trailing garbage
/// after them is never seen.
pub fn parse_feed(xml: &str, source: &str, max_items: usize) -> Result<Vec<Article>, ParseFailure> {
    let mut articles = Vec::new();
    if max_items == 0 {
        return Ok(articles);
    }

    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();

    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseFailure::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    current = Some(ItemBuilder::default());
                    field = None;
                } else if current.is_some() && field.is_none() {
                    field = Field::from_tag(name.as_ref());
                }
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        articles.push(item.build(source));
                        if articles.len() >= max_items {
                            break;
                        }
                    }
                    field = None;
                } else if field.is_some_and(|f| f.tag() == name.as_ref()) {
                    field = None;
                }
            }
            Event::Text(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = decoder.decode(&e).map_err(|err| xml_error(&reader, err))?;
                    item.push(f, &text);
                }
            }
            Event::CData(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = decoder.decode(&e).map_err(|err| xml_error(&reader, err))?;
                    item.push(f, &text);
                }
            }
            Event::GeneralRef(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let name = decoder.decode(&e).map_err(|err| xml_error(&reader, err))?;
                    item.push(f, &resolve_entity(&name));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}

fn xml_error(reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> ParseFailure {
    ParseFailure::Xml {
        position: reader.buffer_position() as u64,
        message: err.to_string(),
    }
}

/// Resolve the body of an `&…;` reference. Unknown names are kept literally.
fn resolve_entity(name: &str) -> Cow<'static, str> {
    let predefined = match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        _ => None,
    };
    if let Some(s) = predefined {
        return Cow::Borrowed(s);
    }
    let code = name.strip_prefix('#').and_then(|num| {
        match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num.parse::<u32>().ok(),
        }
    });
    match code.and_then(char::from_u32) {
        Some(c) => Cow::Owned(c.to_string()),
        None => Cow::Owned(format!("&{name};")),
    }
}
