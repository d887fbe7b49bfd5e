// src/measurement.rs

//! Quantity take-off arithmetic.
//!
//! Every export path (terminal listing, PDF, JSON) goes through
//! [`compute_value`] and [`compute_item_total`] so the numbers always agree.

use crate::number::{finite, lenient_f64};
use serde::{Deserialize, Serialize};

/// What a take-off row does to the running total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    #[default]
    Normal,
    Deduction,
    Subtotal,
}

/// Which scalar of a linked line item is reused as the base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkedMode {
    #[default]
    Quantity,
    Amount,
}

/// One row of a quantity take-off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: MeasurementKind,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub multiplier: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_item_id: Option<String>,
    #[serde(default)]
    pub linked_mode: LinkedMode,
}

impl Measurement {
    /// A dimensional row: any of the dimensions may be left out.
    pub fn dimensions(
        description: impl Into<String>,
        length: Option<f64>,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Self {
        Self {
            description: description.into(),
            length,
            width,
            height,
            ..Self::default()
        }
    }

    /// A subtotal break. Carries no dimensional fields.
    pub fn subtotal(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: MeasurementKind::Subtotal,
            ..Self::default()
        }
    }

    /// A row reusing another line item's quantity or amount.
    pub fn linked(description: impl Into<String>, item_id: impl Into<String>, mode: LinkedMode) -> Self {
        Self {
            description: description.into(),
            linked_item_id: Some(item_id.into()),
            linked_mode: mode,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: MeasurementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn is_subtotal(&self) -> bool {
        self.kind == MeasurementKind::Subtotal
    }

    fn sign(&self) -> f64 {
        if self.kind == MeasurementKind::Deduction {
            -1.0
        } else {
            1.0
        }
    }

    /// Dimensions that take part in the product: set, finite and non-zero.
    ///
    /// A blank and a zero dimension are treated the same way, so leaving
    /// the height empty on an area row does not collapse it to zero.
    pub fn factors(&self) -> Vec<f64> {
        [self.length, self.width, self.height]
            .into_iter()
            .filter_map(finite)
            .filter(|v| *v != 0.0)
            .collect()
    }
}

/// Signed contribution of a single row.
///
/// `linked_base` is only read when the row links to another item; callers
/// pass 0 when the linked item cannot be found.
pub fn compute_value(measurement: &Measurement, linked_base: f64) -> f64 {
    if measurement.is_subtotal() {
        return 0.0;
    }

    let multiplier = finite(measurement.multiplier);

    if measurement.linked_item_id.is_some() {
        let base = if linked_base.is_finite() { linked_base } else { 0.0 };
        return base * multiplier.unwrap_or(1.0) * measurement.sign();
    }

    let factors = measurement.factors();
    let base: f64 = if factors.is_empty() {
        0.0
    } else {
        factors.iter().product()
    };

    let effective_multiplier = match multiplier {
        Some(m) => m,
        None if factors.is_empty() => 0.0,
        None => 1.0,
    };

    // Pure count: "10 units" with no dimensions at all.
    let effective_base = if factors.is_empty() && effective_multiplier != 0.0 {
        1.0
    } else {
        base
    };

    effective_base * effective_multiplier * measurement.sign()
}

/// Value shown on a take-off row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeoffRow {
    pub value: f64,
    pub is_subtotal_break: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTotal {
    pub rows: Vec<TakeoffRow>,
    pub grand_total: f64,
}

/// Fold the rows of one line item into displayed values and a grand total.
///
/// A subtotal row displays the running sum accumulated since the previous
/// break and resets it; it adds nothing to the grand total.
pub fn compute_item_total<F>(measurements: &[Measurement], resolve_linked_base: F) -> ItemTotal
where
    F: Fn(&str, LinkedMode) -> f64,
{
    let mut running_subtotal = 0.0;
    let mut grand_total = 0.0;
    let mut rows = Vec::with_capacity(measurements.len());

    for m in measurements {
        if m.is_subtotal() {
            rows.push(TakeoffRow {
                value: running_subtotal,
                is_subtotal_break: true,
            });
            running_subtotal = 0.0;
            continue;
        }

        let linked_base = m
            .linked_item_id
            .as_deref()
            .map(|id| resolve_linked_base(id, m.linked_mode))
            .unwrap_or(0.0);
        let value = compute_value(m, linked_base);

        running_subtotal += value;
        grand_total += value;
        rows.push(TakeoffRow {
            value,
            is_subtotal_break: false,
        });
    }

    ItemTotal { rows, grand_total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_links(_: &str, _: LinkedMode) -> f64 {
        0.0
    }

    #[test]
    fn test_subtotal_is_always_zero() {
        let mut m = Measurement::subtotal("partial");
        m.length = Some(3.0);
        m.multiplier = Some(4.0);
        m.linked_item_id = Some("I1".into());
        assert_eq!(compute_value(&m, 100.0), 0.0);
    }

    #[test]
    fn test_area_without_height() {
        let m = Measurement::dimensions("floor", Some(2.0), Some(3.0), None);
        assert_eq!(m.factors(), vec![2.0, 3.0]);
        assert_eq!(compute_value(&m, 0.0), 6.0);
    }

    #[test]
    fn test_pure_count() {
        let m = Measurement::dimensions("doors", None, None, None).with_multiplier(5.0);
        assert_eq!(compute_value(&m, 0.0), 5.0);
    }

    #[test]
    fn test_deduction_is_negative() {
        let m = Measurement::dimensions("window", Some(4.0), None, None)
            .with_kind(MeasurementKind::Deduction)
            .with_multiplier(2.0);
        assert_eq!(compute_value(&m, 0.0), -8.0);
    }

    #[test]
    fn test_empty_deduction_has_no_effect() {
        let m = Measurement::dimensions("nothing", None, None, None)
            .with_kind(MeasurementKind::Deduction);
        assert_eq!(compute_value(&m, 0.0), 0.0);
    }

    #[test]
    fn test_empty_normal_row_is_zero() {
        let m = Measurement::default();
        assert_eq!(compute_value(&m, 0.0), 0.0);
    }

    #[test]
    fn test_zero_dimension_is_skipped() {
        let m = Measurement::dimensions("wall", Some(5.0), Some(0.0), Some(3.0));
        assert_eq!(compute_value(&m, 0.0), 15.0);
    }

    #[test]
    fn test_nan_dimension_is_skipped() {
        let m = Measurement::dimensions("wall", Some(5.0), Some(f64::NAN), Some(2.0));
        assert_eq!(compute_value(&m, 0.0), 10.0);

        let m = Measurement::dimensions("count", None, None, None).with_multiplier(f64::NAN);
        assert_eq!(compute_value(&m, 0.0), 0.0);
    }

    #[test]
    fn test_explicit_zero_multiplier_wins() {
        let m = Measurement::dimensions("slab", Some(2.0), Some(2.0), None).with_multiplier(0.0);
        assert_eq!(compute_value(&m, 0.0), 0.0);
    }

    #[test]
    fn test_linked_value() {
        let m = Measurement::linked("half of excavation", "I7", LinkedMode::Quantity)
            .with_multiplier(0.5);
        assert_eq!(compute_value(&m, 100.0), 50.0);

        let m = Measurement::linked("same", "I7", LinkedMode::Quantity);
        assert_eq!(compute_value(&m, 100.0), 100.0);

        let m = Measurement::linked("minus", "I7", LinkedMode::Amount)
            .with_kind(MeasurementKind::Deduction)
            .with_multiplier(2.0);
        assert_eq!(compute_value(&m, 10.0), -20.0);
    }

    #[test]
    fn test_linked_ignores_own_dimensions() {
        let mut m = Measurement::linked("linked", "I1", LinkedMode::Quantity);
        m.length = Some(10.0);
        assert_eq!(compute_value(&m, 3.0), 3.0);
    }

    #[test]
    fn test_running_total_with_subtotal_break() {
        let rows = vec![
            Measurement::dimensions("a", Some(2.0), Some(3.0), None),
            Measurement::dimensions("b", Some(1.0), Some(1.0), None),
            Measurement::subtotal("partial"),
            Measurement::dimensions("c", Some(5.0), None, None),
        ];

        let total = compute_item_total(&rows, no_links);
        let values: Vec<f64> = total.rows.iter().map(|r| r.value).collect();
        let breaks: Vec<bool> = total.rows.iter().map(|r| r.is_subtotal_break).collect();

        assert_eq!(values, vec![6.0, 1.0, 7.0, 5.0]);
        assert_eq!(breaks, vec![false, false, true, false]);
        assert_eq!(total.grand_total, 12.0);
    }

    #[test]
    fn test_consecutive_subtotals_reset() {
        let rows = vec![
            Measurement::dimensions("a", Some(2.0), None, None),
            Measurement::subtotal("first"),
            Measurement::subtotal("second"),
        ];
        let total = compute_item_total(&rows, no_links);
        assert_eq!(total.rows[1].value, 2.0);
        assert_eq!(total.rows[2].value, 0.0);
        assert_eq!(total.grand_total, 2.0);
    }

    #[test]
    fn test_resolver_receives_id_and_mode() {
        let rows = vec![
            Measurement::linked("q", "A", LinkedMode::Quantity),
            Measurement::linked("a", "A", LinkedMode::Amount),
            Measurement::linked("missing", "Z", LinkedMode::Quantity),
        ];
        let resolve = |id: &str, mode: LinkedMode| match (id, mode) {
            ("A", LinkedMode::Quantity) => 4.0,
            ("A", LinkedMode::Amount) => 40.0,
            _ => 0.0,
        };
        let total = compute_item_total(&rows, resolve);
        assert_eq!(total.grand_total, 44.0);
        assert_eq!(total.rows[2].value, 0.0);
    }

    #[test]
    fn test_item_total_is_idempotent() {
        let rows = vec![
            Measurement::dimensions("a", Some(2.5), Some(1.2), Some(0.3)),
            Measurement::subtotal("p"),
            Measurement::dimensions("b", None, None, None)
                .with_kind(MeasurementKind::Deduction)
                .with_multiplier(1.5),
        ];
        let snapshot = rows.clone();
        let first = compute_item_total(&rows, no_links);
        let second = compute_item_total(&rows, no_links);
        assert_eq!(first, second);
        assert_eq!(rows, snapshot);
    }

    #[test]
    fn test_json_uses_camel_case_and_tolerates_garbage() {
        let json = r#"{
            "id": "M1",
            "kind": "deduction",
            "length": "4",
            "width": "n/a",
            "multiplier": 2,
            "linkedMode": "amount"
        }"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.kind, MeasurementKind::Deduction);
        assert_eq!(m.length, Some(4.0));
        assert_eq!(m.width, None);
        assert_eq!(m.linked_mode, LinkedMode::Amount);
        assert_eq!(compute_value(&m, 0.0), -8.0);

        let out = serde_json::to_string(&Measurement::linked("x", "I2", LinkedMode::Quantity)).unwrap();
        assert!(out.contains("\"linkedItemId\":\"I2\""));
        assert!(out.contains("\"linkedMode\":\"quantity\""));
    }
}
