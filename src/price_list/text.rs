// src/price_list/text.rs

use super::PriceItem;
use super::fields::{Field, classify, normalize};
use crate::number::parse_number;
use regex::Regex;
use std::sync::LazyLock;

/// `A.01.001  Scavo di sbancamento  mc  12,50`
static PRICED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*([A-Z0-9][A-Z0-9.\-/_]*\d[A-Z0-9.\-/_]*)\s+(.+?)\s+(m|m2|m²|mq|m3|m³|mc|ml|kg|q|t|l|lt|cad|cadauno|nr|n|h|ora|ore|a\s+corpo|corpo)\.?\s+(?:€\s*)?(\d[\d.,]*)\s*€?\s*$",
    )
    .expect("priced line regex")
});

/// Same shape without a recognizable unit of measure.
static BARE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Z0-9][A-Z0-9.\-/_]*\d[A-Z0-9.\-/_]*)\s+(.+?)\s+(?:€\s*)?(\d[\d.,]*)\s*€?\s*$")
        .expect("bare line regex")
});

static CHAPTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:capitolo|chapter|cap\.)\s+(.+?)\s*$").expect("chapter regex")
});

const DELIMITERS: &[char] = &[';', '\t', '|'];

/// Main extraction entry point: delimited table first, then line patterns.
pub fn extract(text: &str) -> Vec<PriceItem> {
    if let Some(items) = extract_delimited(text) {
        return items;
    }
    extract_lines(text)
}

// ---------------------------------------------------------------------------
// Delimited tables (CSV-like exports)
// ---------------------------------------------------------------------------

fn split_cells(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|c| c.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn detect_delimiter(line: &str) -> Option<char> {
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| line.matches(*d).count())
        .filter(|d| line.contains(*d))
}

/// Column index for each field, from a header row.
#[derive(Debug, Default)]
struct Columns {
    code: Option<usize>,
    description: Option<usize>,
    unit: Option<usize>,
    price: Option<usize>,
    chapter: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let mut cols = Columns::default();
        let mut generic_id = None;
        for (idx, cell) in cells.iter().enumerate() {
            let slot = match classify(cell) {
                Some(Field::Code) if normalize(cell) == "id" => &mut generic_id,
                Some(Field::Code) => &mut cols.code,
                Some(Field::Description) => &mut cols.description,
                Some(Field::Unit) => &mut cols.unit,
                Some(Field::Price) => &mut cols.price,
                Some(Field::Chapter) => &mut cols.chapter,
                None => continue,
            };
            slot.get_or_insert(idx);
        }
        cols.code = cols.code.or(generic_id);
        (cols.code.is_some() && (cols.description.is_some() || cols.price.is_some())).then_some(cols)
    }

    /// No header: assume code, description, unit, price.
    fn positional() -> Self {
        Columns {
            code: Some(0),
            description: Some(1),
            unit: Some(2),
            price: Some(3),
            chapter: None,
        }
    }
}

fn extract_delimited(text: &str) -> Option<Vec<PriceItem>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let first = lines.next()?;
    let delimiter = detect_delimiter(first)?;
    let header = split_cells(first, delimiter);

    let (columns, first_is_data) = match Columns::from_header(&header) {
        Some(cols) => (cols, false),
        None if header.len() >= 4 => (Columns::positional(), true),
        None => return None,
    };

    let cell = |cells: &[String], idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| cells.get(i))
            .filter(|c| !c.is_empty())
            .cloned()
    };

    let data = first_is_data.then_some(first).into_iter().chain(lines);
    let items = data
        .filter_map(|line| {
            let cells = split_cells(line, delimiter);
            let code = cell(&cells, columns.code)?;
            let description = cell(&cells, columns.description).unwrap_or_default();
            let unit_price = cell(&cells, columns.price).and_then(|p| parse_number(&p));
            if description.is_empty() && unit_price.is_none() {
                return None;
            }
            Some(PriceItem {
                code,
                description,
                unit: cell(&cells, columns.unit).unwrap_or_default(),
                unit_price,
                chapter: cell(&cells, columns.chapter),
            })
        })
        .collect();

    Some(items)
}

// ---------------------------------------------------------------------------
// Free-form lines (text dumps, PDF extraction output)
// ---------------------------------------------------------------------------

fn extract_lines(text: &str) -> Vec<PriceItem> {
    let mut items = Vec::new();
    let mut chapter: Option<String> = None;

    for line in text.lines() {
        if let Some(cap) = CHAPTER_LINE.captures(line) {
            chapter = Some(cap[1].to_string());
            continue;
        }

        if let Some(cap) = PRICED_LINE.captures(line) {
            items.push(PriceItem {
                code: cap[1].to_string(),
                description: cap[2].trim().to_string(),
                unit: cap[3].to_lowercase(),
                unit_price: parse_number(&cap[4]),
                chapter: chapter.clone(),
            });
        } else if let Some(cap) = BARE_LINE.captures(line) {
            items.push(PriceItem {
                code: cap[1].to_string(),
                description: cap[2].trim().to_string(),
                unit: String::new(),
                unit_price: parse_number(&cap[3]),
                chapter: chapter.clone(),
            });
        }
    }

    items
}
