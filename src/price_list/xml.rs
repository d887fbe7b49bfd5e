// src/price_list/xml.rs

use super::PriceItem;
use super::fields::{Field, classify, normalize};
use crate::number::parse_number;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

/// One open element while streaming.
#[derive(Default)]
struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    /// Leaf children folded in as `(name, text)`, plus their attributes.
    fields: Vec<(String, String)>,
    text: String,
    has_children: bool,
    has_records: bool,
    chapter: Option<String>,
}

/// Field values collected for one candidate record.
#[derive(Default)]
struct Candidate {
    code: Option<String>,
    /// A bare `id` only stands in for the code when nothing better exists.
    generic_id: Option<String>,
    descriptions: Vec<String>,
    unit: Option<String>,
    price: Option<f64>,
    chapter: Option<String>,
}

impl Candidate {
    fn from_pairs<'a>(pairs: impl Iterator<Item = &'a (String, String)>) -> Self {
        let mut c = Candidate::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match classify(key) {
                Some(Field::Code) if normalize(key) == "id" => {
                    c.generic_id.get_or_insert_with(|| value.to_string());
                }
                Some(Field::Code) if c.code.is_none() => c.code = Some(value.to_string()),
                Some(Field::Description) => c.descriptions.push(value.to_string()),
                Some(Field::Unit) if c.unit.is_none() => c.unit = Some(value.to_string()),
                Some(Field::Price) if c.price.is_none() => c.price = parse_number(value),
                Some(Field::Chapter) if c.chapter.is_none() => c.chapter = Some(value.to_string()),
                _ => {}
            }
        }
        c
    }

    /// A record needs a code and at least a description or a price.
    fn into_item(self, inherited_chapter: Option<&String>) -> Option<PriceItem> {
        let code = self.code.or(self.generic_id)?;
        // Dialects often carry both a short and an extended text; keep the longest.
        let description = self
            .descriptions
            .into_iter()
            .max_by_key(|d| d.chars().count())
            .unwrap_or_default();
        if description.is_empty() && self.price.is_none() {
            return None;
        }
        Some(PriceItem {
            code,
            description,
            unit: self.unit.unwrap_or_default(),
            unit_price: self.price,
            chapter: self.chapter.or_else(|| inherited_chapter.cloned()),
        })
    }
}

/// Text arrives without entities; `&name;` and `&#NN;` come as their own events.
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                attr.unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned()),
            )
        })
        .collect()
}

/// Chapter label carried by a grouping element such as
/// `<capitolo descrizione="Scavi">`.
fn chapter_label(name: &str, attrs: &[(String, String)]) -> Option<String> {
    if classify(name) != Some(Field::Chapter) {
        return None;
    }
    attrs
        .iter()
        .find(|(k, v)| classify(k) == Some(Field::Description) && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
}

fn open(stack: &mut Vec<Frame>, e: &BytesStart<'_>) {
    let name = local_name(e);
    let attrs = attributes(e);
    let inherited = stack.last().and_then(|p| p.chapter.clone());
    if let Some(parent) = stack.last_mut() {
        parent.has_children = true;
    }
    let chapter = chapter_label(&name, &attrs).or(inherited);
    stack.push(Frame {
        name,
        attrs,
        chapter,
        ..Frame::default()
    });
}

fn close(stack: &mut Vec<Frame>, out: &mut Vec<PriceItem>) {
    let Some(frame) = stack.pop() else {
        return;
    };

    let is_chapter = classify(&frame.name) == Some(Field::Chapter);

    if !frame.has_records && !is_chapter {
        let candidate = Candidate::from_pairs(frame.attrs.iter().chain(frame.fields.iter()));
        if let Some(item) = candidate.into_item(frame.chapter.as_ref()) {
            debug!(code = %item.code, element = %frame.name, "Price record");
            out.push(item);
            if let Some(parent) = stack.last_mut() {
                parent.has_records = true;
            }
            return;
        }
    }

    if frame.has_children {
        if frame.has_records {
            if let Some(parent) = stack.last_mut() {
                parent.has_records = true;
            }
        }
        return;
    }

    // Leaf element: fold its text and attributes into the parent.
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let text = frame.text.trim().to_string();
    if !text.is_empty() {
        if classify(&parent.name) == Some(Field::Chapter)
            && classify(&frame.name) == Some(Field::Description)
            && parent.chapter.is_none()
        {
            parent.chapter = Some(text.clone());
        }
        parent.fields.push((frame.name.clone(), text));
    }
    parent.fields.extend(frame.attrs);
}

/// Stream the document and emit every element that looks like a priced entry.
pub fn extract(xml: &str) -> Vec<PriceItem> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Frame> = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => open(&mut stack, e),
            Ok(Event::Empty(ref e)) => {
                open(&mut stack, e);
                close(&mut stack, &mut items);
            }
            Ok(Event::End(_)) => close(&mut stack, &mut items),
            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                let name = String::from_utf8_lossy(e.as_ref()).into_owned();
                if let (Some(top), Some(ch)) = (stack.last_mut(), resolve_entity(&name)) {
                    top.text.push(ch);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    error = %e,
                    position = reader.buffer_position(),
                    recovered = items.len(),
                    "XML price list is malformed — keeping what was parsed"
                );
                break;
            }
            _ => {}
        }
    }

    items
}
