// src/price_list/mod.rs

mod fields;
pub mod pdf;
mod text;
mod xml;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// A single priced entry from a regional or supplier price list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    pub code: String,
    pub description: String,
    pub unit: String,
    pub unit_price: Option<f64>,
    pub chapter: Option<String>,
}

/// Everything we could recover from one price-list file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceList {
    pub source: String,
    pub items: Vec<PriceItem>,
}

impl PriceList {
    /// How many entries carry a usable price (out of all entries).
    pub fn coverage(&self) -> (usize, usize) {
        let priced = self
            .items
            .iter()
            .filter(|item| item.unit_price.is_some())
            .count();
        (priced, self.items.len())
    }

    /// Plain keyword filter: every term must appear in the code,
    /// description or chapter (case-insensitive).
    pub fn filter(&self, query: &str) -> Vec<&PriceItem> {
        filter_items(&self.items, query)
    }
}

pub fn filter_items<'a>(items: &'a [PriceItem], query: &str) -> Vec<&'a PriceItem> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();

    items
        .iter()
        .filter(|item| {
            let haystack = format!(
                "{} {} {}",
                item.code,
                item.description,
                item.chapter.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            terms.iter().all(|t| haystack.contains(t.as_str()))
        })
        .collect()
}

/// Parse price-list content already in memory.
pub fn parse_price_list(source: &str, content: &str) -> PriceList {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let items = if trimmed.starts_with('<') {
        info!(source = %source, "Parsing price list as XML");
        xml::extract(trimmed)
    } else {
        info!(source = %source, "Parsing price list as text");
        text::extract(trimmed)
    };

    let list = PriceList {
        source: source.to_string(),
        items,
    };
    let (priced, total) = list.coverage();
    info!(source = %source, items = total, priced, "Price list parsed");
    list
}

/// Read a price list from disk. PDFs go through text extraction first.
pub fn load_price_list(path: impl AsRef<Path>) -> Result<PriceList, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "price-list".to_string());

    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let bytes = fs::read(path)?;
        return match pdf::extract_text_from_pdf(&bytes) {
            pdf::PdfContent::Text(text) => Ok(parse_price_list(&source, &text)),
            pdf::PdfContent::ScannedImage => {
                warn!(path = %path.display(), "PDF is scanned — no text to import");
                Err(format!("{} is a scanned PDF, OCR is not supported", path.display()).into())
            }
            pdf::PdfContent::Error(e) => Err(e.into()),
        };
    }

    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(parse_price_list(&source, &content))
}
