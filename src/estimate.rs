// src/estimate.rs

use crate::measurement::{ItemTotal, LinkedMode, Measurement, compute_item_total};
use crate::price_list::PriceItem;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Quantities closer than this are considered settled.
const SETTLE_EPSILON: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("No category with id or code {0:?}")]
    UnknownCategory(String),

    #[error("No line item with id {0:?}")]
    UnknownItem(String),

    #[error("No measurement {measurement:?} on item {item:?}")]
    UnknownMeasurement { item: String, measurement: String },

    #[error("Category code {0:?} already exists")]
    DuplicateCategory(String),
}

/// A priced work item whose quantity comes from its measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub unit_price: f64,
    /// Stored quantity. Overwritten by [`Estimate::recalculate`] whenever
    /// the item has measurements; otherwise entered by hand.
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

impl LineItem {
    pub fn from_price_item(price: &PriceItem) -> Self {
        Self {
            code: price.code.clone(),
            description: price.description.clone(),
            unit: price.unit.clone(),
            unit_price: price.unit_price.unwrap_or(0.0),
            ..Self::default()
        }
    }

    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default)]
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Category {
    pub fn total(&self) -> f64 {
        self.items.iter().map(LineItem::amount).sum()
    }
}

/// A bill of quantities: categories of priced line items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    next_id: u64,
}

impl Estimate {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            ..Self::default()
        }
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.categories.iter().any(|c| {
            c.id == id
                || c.items
                    .iter()
                    .any(|i| i.id == id || i.measurements.iter().any(|m| m.id == id))
        })
    }

    /// Short ids (`C1`, `I4`, `M12`) unique across the whole estimate,
    /// also after loading a file written by someone else.
    fn allocate_id(&mut self, prefix: char) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{prefix}{}", self.next_id);
            if !self.id_in_use(&id) {
                return id;
            }
        }
    }

    pub fn add_category(
        &mut self,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<String, EstimateError> {
        let code = code.into();
        if self.categories.iter().any(|c| c.code == code) {
            return Err(EstimateError::DuplicateCategory(code));
        }
        let id = self.allocate_id('C');
        self.categories.push(Category {
            id: id.clone(),
            code,
            name: name.into(),
            items: Vec::new(),
        });
        Ok(id)
    }

    /// Find a category by id, falling back to its code.
    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.id == key)
            .or_else(|| self.categories.iter().find(|c| c.code == key))
    }

    fn category_index(&self, key: &str) -> Option<usize> {
        self.categories
            .iter()
            .position(|c| c.id == key)
            .or_else(|| self.categories.iter().position(|c| c.code == key))
    }

    /// Append an item to a category; an empty `item.id` gets a fresh one.
    pub fn add_item(&mut self, category: &str, mut item: LineItem) -> Result<String, EstimateError> {
        let idx = self
            .category_index(category)
            .ok_or_else(|| EstimateError::UnknownCategory(category.to_string()))?;
        if item.id.is_empty() || self.id_in_use(&item.id) {
            item.id = self.allocate_id('I');
        }
        for m in item.measurements.iter_mut() {
            if m.id.is_empty() {
                m.id = self.allocate_id('M');
            }
        }
        let id = item.id.clone();
        let has_measurements = !item.measurements.is_empty();
        self.categories[idx].items.push(item);
        if has_measurements {
            self.recalculate();
        }
        Ok(id)
    }

    /// Remove an item; rows linking to it fall back to 0.
    pub fn remove_item(&mut self, item_id: &str) -> Option<LineItem> {
        let removed = self.categories.iter_mut().find_map(|c| {
            let pos = c.items.iter().position(|i| i.id == item_id)?;
            Some(c.items.remove(pos))
        })?;
        self.recalculate();
        Some(removed)
    }

    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    pub fn item(&self, item_id: &str) -> Option<&LineItem> {
        self.items().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut LineItem> {
        self.categories
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .find(|i| i.id == item_id)
    }

    /// Append a measurement row and refresh the stored quantities.
    pub fn add_measurement(
        &mut self,
        item_id: &str,
        mut measurement: Measurement,
    ) -> Result<String, EstimateError> {
        if self.item(item_id).is_none() {
            return Err(EstimateError::UnknownItem(item_id.to_string()));
        }
        if measurement.id.is_empty() || self.id_in_use(&measurement.id) {
            measurement.id = self.allocate_id('M');
        }
        let id = measurement.id.clone();
        if let Some(item) = self.item_mut(item_id) {
            item.measurements.push(measurement);
        }
        self.recalculate();
        Ok(id)
    }

    pub fn remove_measurement(
        &mut self,
        item_id: &str,
        measurement_id: &str,
    ) -> Result<Measurement, EstimateError> {
        let item = self
            .item_mut(item_id)
            .ok_or_else(|| EstimateError::UnknownItem(item_id.to_string()))?;
        let pos = item
            .measurements
            .iter()
            .position(|m| m.id == measurement_id)
            .ok_or_else(|| EstimateError::UnknownMeasurement {
                item: item_id.to_string(),
                measurement: measurement_id.to_string(),
            })?;
        let removed = item.measurements.remove(pos);
        // The quantity came from the rows; with none left it is no longer known.
        if item.measurements.is_empty() {
            item.quantity = 0.0;
        }
        self.recalculate();
        Ok(removed)
    }

    /// Current quantity or amount of an item; 0 when it does not exist.
    pub fn resolve_linked_base(&self, item_id: &str, mode: LinkedMode) -> f64 {
        match self.item(item_id) {
            Some(item) => match mode {
                LinkedMode::Quantity => item.quantity,
                LinkedMode::Amount => item.amount(),
            },
            None => {
                debug!(item_id, "Linked item not found — using 0");
                0.0
            }
        }
    }

    /// Take-off rows and total for one item, links resolved against this estimate.
    pub fn item_total(&self, item: &LineItem) -> ItemTotal {
        compute_item_total(&item.measurements, |id, mode| {
            self.resolve_linked_base(id, mode)
        })
    }

    /// Refresh stored quantities from measurements.
    ///
    /// Links read the stored scalar of the other item, so a chain of links
    /// may need several passes in document order. Passes are capped at the
    /// number of items plus one; circular links stop there.
    pub fn recalculate(&mut self) {
        let positions: Vec<(usize, usize)> = self
            .categories
            .iter()
            .enumerate()
            .flat_map(|(ci, c)| (0..c.items.len()).map(move |ii| (ci, ii)))
            .collect();
        let max_passes = positions.len() + 1;

        for pass in 1..=max_passes {
            let mut changed = false;
            for &(ci, ii) in &positions {
                let item = &self.categories[ci].items[ii];
                if item.measurements.is_empty() {
                    continue;
                }
                let total = self.item_total(item).grand_total;
                if (total - item.quantity).abs() > SETTLE_EPSILON {
                    self.categories[ci].items[ii].quantity = total;
                    changed = true;
                }
            }
            if !changed {
                debug!(passes = pass, items = positions.len(), "Quantities settled");
                return;
            }
        }

        warn!(
            estimate = %self.name,
            "Linked quantities did not settle — check for circular links"
        );
    }

    pub fn grand_total(&self) -> f64 {
        self.categories.iter().map(Category::total).sum()
    }
}
