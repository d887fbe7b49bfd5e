// src/report.rs

//! Bill-of-quantities reports.
//!
//! [`build_report`] turns an estimate into a flat layout model using the
//! take-off accumulator; the terminal, PDF and JSON outputs all render
//! that same model.

use crate::config::ReportSection;
use crate::estimate::{Estimate, LineItem};
use crate::measurement::{LinkedMode, MeasurementKind};
use crate::number::{finite, format_it};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use serde::Serialize;
use time::OffsetDateTime;

pub const SUBTOTAL_LABEL: &str = "Sommano parziale";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Measure,
    Deduction,
    Linked,
    Subtotal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowReport {
    pub kind: RowKind,
    pub label: String,
    pub multiplier: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub number: usize,
    pub id: String,
    pub code: String,
    pub description: String,
    pub unit: String,
    pub unit_price: f64,
    pub rows: Vec<RowReport>,
    pub quantity: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub code: String,
    pub name: String,
    pub items: Vec<ItemReport>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    pub company: String,
    pub currency: String,
    pub estimate: String,
    pub client: Option<String>,
    pub location: Option<String>,
    pub date: String,
    pub categories: Vec<CategoryReport>,
    pub grand_total: f64,
}

pub fn today() -> String {
    OffsetDateTime::now_utc().date().to_string()
}

fn item_report(estimate: &Estimate, item: &LineItem, number: usize) -> ItemReport {
    let total = estimate.item_total(item);
    let quantity = if item.measurements.is_empty() {
        item.quantity
    } else {
        total.grand_total
    };

    let rows = item
        .measurements
        .iter()
        .zip(total.rows.iter())
        .map(|(m, row)| {
            let kind = match (m.kind, m.linked_item_id.is_some()) {
                (MeasurementKind::Subtotal, _) => RowKind::Subtotal,
                (_, true) => RowKind::Linked,
                (MeasurementKind::Deduction, false) => RowKind::Deduction,
                (MeasurementKind::Normal, false) => RowKind::Measure,
            };

            let label = match (kind, m.linked_item_id.as_deref()) {
                (RowKind::Subtotal, _) if m.description.trim().is_empty() => {
                    SUBTOTAL_LABEL.to_string()
                }
                (RowKind::Subtotal, _) => format!("{SUBTOTAL_LABEL} {}", m.description.trim()),
                (_, Some(linked)) => {
                    let target = estimate
                        .item(linked)
                        .map(|i| i.code.as_str())
                        .unwrap_or("?");
                    let what = match m.linked_mode {
                        LinkedMode::Quantity => "quantità",
                        LinkedMode::Amount => "importo",
                    };
                    format!("{} (vedi {target}, {what})", m.description.trim())
                        .trim_start()
                        .to_string()
                }
                _ => m.description.clone(),
            };

            // Subtotal rows never show dimensions.
            let shown = |v: Option<f64>| {
                if kind == RowKind::Subtotal {
                    None
                } else {
                    finite(v)
                }
            };

            RowReport {
                kind,
                label,
                multiplier: shown(m.multiplier),
                length: if kind == RowKind::Linked { None } else { shown(m.length) },
                width: if kind == RowKind::Linked { None } else { shown(m.width) },
                height: if kind == RowKind::Linked { None } else { shown(m.height) },
                value: row.value,
            }
        })
        .collect();

    ItemReport {
        number,
        id: item.id.clone(),
        code: item.code.clone(),
        description: item.description.clone(),
        unit: item.unit.clone(),
        unit_price: item.unit_price,
        rows,
        quantity,
        amount: quantity * item.unit_price,
    }
}

/// Lay out an estimate. Items are numbered progressively across categories.
pub fn build_report(estimate: &Estimate, settings: &ReportSection, date: &str) -> Report {
    let mut number = 0;
    let categories: Vec<CategoryReport> = estimate
        .categories
        .iter()
        .map(|c| {
            let items: Vec<ItemReport> = c
                .items
                .iter()
                .map(|item| {
                    number += 1;
                    item_report(estimate, item, number)
                })
                .collect();
            let total = items.iter().map(|i| i.amount).sum();
            CategoryReport {
                code: c.code.clone(),
                name: c.name.clone(),
                items,
                total,
            }
        })
        .collect();

    let grand_total = categories.iter().map(|c| c.total).sum();
    let title = if estimate.title.trim().is_empty() {
        settings.title.clone()
    } else {
        format!("{}: {}", settings.title, estimate.title)
    };

    Report {
        title,
        company: settings.company.clone(),
        currency: settings.currency.clone(),
        estimate: estimate.name.clone(),
        client: estimate.client.clone(),
        location: estimate.location.clone(),
        date: date.to_string(),
        categories,
        grand_total,
    }
}

/// The estimate as saved plus every computed figure, for other tools.
pub fn export_json(estimate: &Estimate, report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&serde_json::json!({
        "estimate": estimate,
        "report": report,
    }))
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

fn opt(v: Option<f64>) -> String {
    v.map(|v| format_it(v, 2)).unwrap_or_default()
}

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", report.title));
    if !report.company.is_empty() {
        out.push_str(&format!("{}\n", report.company));
    }
    if let Some(client) = &report.client {
        out.push_str(&format!("Committente: {client}\n"));
    }
    if let Some(location) = &report.location {
        out.push_str(&format!("Località: {location}\n"));
    }
    out.push_str(&format!("Data: {}\n", report.date));

    for cat in &report.categories {
        out.push_str(&format!("\n== {} {} ==\n", cat.code, cat.name));
        for item in &cat.items {
            out.push_str(&format!(
                "\n{:>3}. [{}] {} {}\n",
                item.number, item.id, item.code, item.description
            ));
            for row in &item.rows {
                match row.kind {
                    RowKind::Subtotal => out.push_str(&format!(
                        "       {:<40} {:>48}\n",
                        row.label,
                        format_it(row.value, 3)
                    )),
                    _ => out.push_str(&format!(
                        "       {:<40} {:>8} {:>9} {:>9} {:>9} {:>10}\n",
                        row.label,
                        opt(row.multiplier),
                        opt(row.length),
                        opt(row.width),
                        opt(row.height),
                        format_it(row.value, 3)
                    )),
                }
            }
            out.push_str(&format!(
                "       Sommano {} {} x {} {} = {} {}\n",
                item.unit,
                format_it(item.quantity, 3),
                format_it(item.unit_price, 2),
                report.currency,
                format_it(item.amount, 2),
                report.currency
            ));
        }
        out.push_str(&format!(
            "\n   Totale {} {}: {} {}\n",
            cat.code,
            cat.name,
            format_it(cat.total, 2),
            report.currency
        ));
    }

    out.push_str(&format!(
        "\nTOTALE COMPLESSIVO: {} {}\n",
        format_it(report.grand_total, 2),
        report.currency
    ));
    out
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 35.0;
const FONT_SIZE: f32 = 8.0;
const LINE_HEIGHT: f32 = 11.0;
const DESCRIPTION_CHARS: usize = 42;

// Column anchors: left edges for text, right edges for numbers.
const COL_NUMBER: f32 = MARGIN;
const COL_CODE: f32 = 58.0;
const COL_TEXT: f32 = 118.0;
const COL_MULT_R: f32 = 318.0;
const COL_LEN_R: f32 = 358.0;
const COL_WID_R: f32 = 398.0;
const COL_HEI_R: f32 = 438.0;
const COL_QTY_R: f32 = 484.0;
const COL_PRICE_R: f32 = 522.0;
const COL_TOTAL_R: f32 = PAGE_WIDTH - MARGIN;

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Map text onto the WinAnsi code page used by the built-in fonts.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// Rough Helvetica advance width, enough for right-aligning numbers.
fn text_width(text: &str, size: f32) -> f32 {
    let units: f32 = text
        .chars()
        .map(|c| match c {
            '.' | ',' | ' ' | 'i' | 'l' | 'j' | 'I' | '\'' => 278.0,
            '-' | '(' | ')' | 'r' | 't' | 'f' => 333.0,
            'm' | 'w' | 'M' | 'W' => 833.0,
            _ => 556.0,
        })
        .sum();
    units * size / 1000.0
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Accumulates content-stream operations page by page.
struct PageWriter<'a> {
    report: &'a Report,
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl<'a> PageWriter<'a> {
    fn new(report: &'a Report) -> Self {
        let mut writer = Self {
            report,
            pages: Vec::new(),
            ops: Vec::new(),
            y: 0.0,
        };
        writer.start_page();
        writer
    }

    fn text(&mut self, x: f32, font: Font, size: f32, content: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.resource().into(), size.into()]));
        self.ops.push(Operation::new("Td", vec![x.into(), self.y.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(content))],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn right(&mut self, right_edge: f32, font: Font, content: &str) {
        let x = right_edge - text_width(content, FONT_SIZE);
        self.text(x, font, FONT_SIZE, content);
    }

    fn rule(&mut self, from: f32, to: f32) {
        let y = self.y + LINE_HEIGHT - 3.0;
        self.ops.push(Operation::new("w", vec![0.5f32.into()]));
        self.ops.push(Operation::new("m", vec![from.into(), y.into()]));
        self.ops.push(Operation::new("l", vec![to.into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn newline(&mut self) {
        self.y -= LINE_HEIGHT;
    }

    fn start_page(&mut self) {
        if !self.ops.is_empty() {
            self.pages.push(std::mem::take(&mut self.ops));
        }
        self.y = PAGE_HEIGHT - MARGIN - 10.0;

        let title = self.report.title.clone();
        self.text(MARGIN, Font::Bold, 11.0, &title);
        self.newline();
        let subtitle = [
            self.report.company.clone(),
            self.report.client.clone().unwrap_or_default(),
            self.report.location.clone().unwrap_or_default(),
            self.report.date.clone(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" · ");
        self.text(MARGIN, Font::Regular, FONT_SIZE, &subtitle);
        self.newline();
        self.newline();

        self.text(COL_NUMBER, Font::Bold, FONT_SIZE, "N.");
        self.text(COL_CODE, Font::Bold, FONT_SIZE, "Tariffa");
        self.text(COL_TEXT, Font::Bold, FONT_SIZE, "Designazione dei lavori");
        self.right(COL_MULT_R, Font::Bold, "par.ug.");
        self.right(COL_LEN_R, Font::Bold, "lung.");
        self.right(COL_WID_R, Font::Bold, "larg.");
        self.right(COL_HEI_R, Font::Bold, "H/peso");
        self.right(COL_QTY_R, Font::Bold, "Quantità");
        self.right(COL_PRICE_R, Font::Bold, "unitario");
        self.right(COL_TOTAL_R, Font::Bold, "TOTALE");
        self.newline();
        self.rule(MARGIN, PAGE_WIDTH - MARGIN);
        self.newline();
    }

    /// Break the page if fewer than `lines` lines fit above the footer.
    fn ensure(&mut self, lines: usize) {
        if self.y - lines as f32 * LINE_HEIGHT < MARGIN + 2.0 * LINE_HEIGHT {
            self.start_page();
        }
    }

    fn item(&mut self, item: &ItemReport) {
        let description = wrap(&item.description, DESCRIPTION_CHARS);
        self.ensure(description.len() + 2);

        self.text(COL_NUMBER, Font::Regular, FONT_SIZE, &item.number.to_string());
        self.text(COL_CODE, Font::Bold, FONT_SIZE, &item.code);
        for line in &description {
            self.text(COL_TEXT, Font::Regular, FONT_SIZE, line);
            self.newline();
        }

        for row in &item.rows {
            self.ensure(1);
            match row.kind {
                RowKind::Subtotal => {
                    self.text(COL_TEXT + 8.0, Font::Bold, FONT_SIZE, &row.label);
                    self.right(COL_QTY_R, Font::Bold, &format_it(row.value, 3));
                }
                _ => {
                    let label = wrap(&row.label, DESCRIPTION_CHARS - 4)
                        .into_iter()
                        .next()
                        .unwrap_or_default();
                    self.text(COL_TEXT + 8.0, Font::Regular, FONT_SIZE, &label);
                    for (edge, v) in [
                        (COL_MULT_R, row.multiplier),
                        (COL_LEN_R, row.length),
                        (COL_WID_R, row.width),
                        (COL_HEI_R, row.height),
                    ] {
                        if let Some(v) = v {
                            self.right(edge, Font::Regular, &format_it(v, 2));
                        }
                    }
                    self.right(COL_QTY_R, Font::Regular, &format_it(row.value, 3));
                }
            }
            self.newline();
        }

        self.ensure(1);
        self.text(COL_TEXT, Font::Bold, FONT_SIZE, &format!("Sommano {}", item.unit));
        self.right(COL_QTY_R, Font::Bold, &format_it(item.quantity, 3));
        self.right(COL_PRICE_R, Font::Regular, &format_it(item.unit_price, 2));
        self.right(COL_TOTAL_R, Font::Bold, &format_it(item.amount, 2));
        self.newline();
        self.newline();
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        self.ensure(2);
        self.rule(MARGIN, PAGE_WIDTH - MARGIN);
        let total = format!(
            "{} {}",
            format_it(self.report.grand_total, 2),
            self.report.currency
        );
        self.text(COL_TEXT, Font::Bold, 10.0, "TOTALE COMPLESSIVO");
        let x = COL_TOTAL_R - text_width(&total, 10.0);
        self.text(x, Font::Bold, 10.0, &total);

        self.pages.push(std::mem::take(&mut self.ops));

        // Page numbers need the final count.
        let count = self.pages.len();
        for (idx, page) in self.pages.iter_mut().enumerate() {
            let label = format!("Pag. {} di {}", idx + 1, count);
            let x = COL_TOTAL_R - text_width(&label, 7.0);
            page.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Font::Regular.resource().into(), 7.0f32.into()]),
                Operation::new("Td", vec![x.into(), (MARGIN - 10.0).into()]),
                Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&label))]),
                Operation::new("ET", vec![]),
            ]);
        }
        self.pages
    }
}

fn layout(report: &Report) -> Vec<Vec<Operation>> {
    let mut writer = PageWriter::new(report);
    for cat in &report.categories {
        writer.ensure(3);
        writer.text(
            COL_TEXT,
            Font::Bold,
            9.0,
            &format!("{} {}", cat.code, cat.name).to_uppercase(),
        );
        writer.newline();
        writer.newline();

        for item in &cat.items {
            writer.item(item);
        }

        writer.ensure(2);
        writer.rule(COL_TEXT, PAGE_WIDTH - MARGIN);
        writer.text(COL_TEXT, Font::Bold, FONT_SIZE, &format!("Totale {}", cat.name));
        writer.right(COL_TOTAL_R, Font::Bold, &format_it(cat.total, 2));
        writer.newline();
        writer.newline();
    }
    writer.finish()
}

/// Render the report as an A4 PDF using the built-in Helvetica fonts.
pub fn render_pdf(report: &Report) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for operations in layout(report) {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Measurement;

    fn sample() -> Estimate {
        let mut est = Estimate::new("villa");
        est.client = Some("Rossi".into());
        est.add_category("A", "Scavi").unwrap();
        est.add_category("B", "Murature").unwrap();
        let dig = est
            .add_item(
                "A",
                LineItem {
                    code: "A.01".into(),
                    description: "Scavo di sbancamento".into(),
                    unit: "mc".into(),
                    unit_price: 10.0,
                    ..LineItem::default()
                },
            )
            .unwrap();
        for m in [
            Measurement::dimensions("zona nord", Some(2.0), Some(3.0), None),
            Measurement::dimensions("zona sud", Some(1.0), Some(1.0), None),
            Measurement::subtotal(""),
            Measurement::dimensions("rampa", Some(5.0), None, None),
        ] {
            est.add_measurement(&dig, m).unwrap();
        }

        let wall = est
            .add_item(
                "B",
                LineItem {
                    code: "B.01".into(),
                    description: "Muratura".into(),
                    unit: "mq".into(),
                    unit_price: 2.0,
                    ..LineItem::default()
                },
            )
            .unwrap();
        est.add_measurement(
            &wall,
            Measurement::linked("come scavo", &dig, LinkedMode::Quantity).with_multiplier(2.0),
        )
        .unwrap();
        est.add_measurement(
            &wall,
            Measurement::dimensions("porta", Some(1.0), None, Some(2.0))
                .with_kind(MeasurementKind::Deduction),
        )
        .unwrap();
        est
    }

    #[test]
    fn test_report_rows_follow_accumulator() {
        let report = build_report(&sample(), &ReportSection::default(), "2026-01-01");
        let dig = &report.categories[0].items[0];

        let values: Vec<f64> = dig.rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![6.0, 1.0, 7.0, 5.0]);
        assert_eq!(dig.rows[2].kind, RowKind::Subtotal);
        assert_eq!(dig.rows[2].label, SUBTOTAL_LABEL);
        assert_eq!(dig.quantity, 12.0);
        assert_eq!(dig.amount, 120.0);

        let wall = &report.categories[1].items[0];
        assert_eq!(wall.number, 2);
        assert_eq!(wall.rows[0].kind, RowKind::Linked);
        assert_eq!(wall.rows[0].label, "come scavo (vedi A.01, quantità)");
        assert_eq!(wall.rows[1].kind, RowKind::Deduction);
        assert_eq!(wall.rows[1].value, -2.0);
        assert_eq!(wall.quantity, 22.0);

        assert_eq!(report.categories[1].total, 44.0);
        assert_eq!(report.grand_total, 164.0);
        assert_eq!(report.title, "Computo metrico estimativo: villa");
    }

    #[test]
    fn test_manual_quantity_item() {
        let mut est = Estimate::new("x");
        est.add_category("A", "Varie").unwrap();
        est.add_item(
            "A",
            LineItem {
                code: "V.1".into(),
                unit_price: 100.0,
                quantity: 1.5,
                ..LineItem::default()
            },
        )
        .unwrap();
        let report = build_report(&est, &ReportSection::default(), "d");
        assert_eq!(report.grand_total, 150.0);
        assert!(report.categories[0].items[0].rows.is_empty());
    }

    #[test]
    fn test_text_rendering() {
        let report = build_report(&sample(), &ReportSection::default(), "2026-01-01");
        let text = render_text(&report);
        assert!(text.contains("Committente: Rossi"));
        assert!(text.contains("Sommano parziale"));
        assert!(text.contains("Sommano mc 12,000 x 10,00 € = 120,00 €"));
        assert!(text.contains("TOTALE COMPLESSIVO: 164,00 €"));
    }

    #[test]
    fn test_json_export_has_totals() {
        let est = sample();
        let report = build_report(&est, &ReportSection::default(), "2026-01-01");
        let json = export_json(&est, &report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report"]["grandTotal"], 164.0);
        assert_eq!(value["report"]["categories"][0]["items"][0]["rows"][2]["kind"], "subtotal");
        assert_eq!(
            value["estimate"]["categories"][1]["items"][0]["measurements"][0]["linkedMode"],
            "quantity"
        );
    }

    #[test]
    fn test_pdf_is_loadable() {
        let report = build_report(&sample(), &ReportSection::default(), "2026-01-01");
        let bytes = render_pdf(&report).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_pdf_breaks_pages() {
        let mut est = Estimate::new("big");
        est.add_category("A", "Tutto").unwrap();
        for i in 0..80 {
            let id = est
                .add_item(
                    "A",
                    LineItem {
                        code: format!("Z.{i}"),
                        description: "Voce di prova con una descrizione abbastanza lunga da andare a capo".into(),
                        unit: "mq".into(),
                        unit_price: 1.0,
                        ..LineItem::default()
                    },
                )
                .unwrap();
            est.add_measurement(&id, Measurement::dimensions("r", Some(1.0), None, None))
                .unwrap();
        }
        let report = build_report(&est, &ReportSection::default(), "d");
        let bytes = render_pdf(&report).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 3);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("€ 5"), vec![0x80, b' ', b'5']);
        assert_eq!(encode_win_ansi("à"), vec![0xe0]);
        assert_eq!(encode_win_ansi("→"), vec![b'?']);
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("uno due tre", 7), vec!["uno due", "tre"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(wrap("parolaunicalunga", 4), vec!["parolaunicalunga"]);
    }
}
