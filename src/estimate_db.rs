use crate::estimate::Estimate;
use crate::price_list::{PriceItem, PriceList};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub struct EstimateStore {
    conn: Connection,
}

/// A price-list entry as kept in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPriceItem {
    pub uid: String,
    pub source: String,
    pub item: PriceItem,
}

/// Row counts for the statistics log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub price_items: usize,
    pub price_sources: usize,
    pub estimates: usize,
}

const PRICE_COLUMNS: &str = "uid, source, code, description, unit, unit_price, chapter";

const UPSERT_PRICE: &str = "INSERT INTO price_items (uid, source, code, description, unit, unit_price, chapter)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(uid) DO UPDATE SET
        description = excluded.description,
        unit = excluded.unit,
        unit_price = excluded.unit_price,
        chapter = excluded.chapter";

impl EstimateStore {
    /// Open (or create) the SQLite store. `":memory:"` works for throwaway use.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_items (
                uid TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                code TEXT NOT NULL,
                description TEXT NOT NULL,
                unit TEXT NOT NULL DEFAULT '',
                unit_price REAL,
                chapter TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS estimates (
                name TEXT PRIMARY KEY,
                json TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_items_code ON price_items(code)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_items_source ON price_items(source)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Stable id for a price entry: the same code from the same list
    /// always maps to the same row.
    pub fn generate_uid(source: &str, code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(code.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn upsert_with(conn: &Connection, source: &str, item: &PriceItem) -> SqliteResult<String> {
        let uid = Self::generate_uid(source, &item.code);
        let mut stmt = conn.prepare_cached(UPSERT_PRICE)?;
        stmt.execute(params![
            uid,
            source,
            item.code,
            item.description,
            item.unit,
            item.unit_price,
            item.chapter,
        ])?;
        Ok(uid)
    }

    /// Insert or update a price entry
    pub fn upsert_price_item(&self, source: &str, item: &PriceItem) -> SqliteResult<String> {
        Self::upsert_with(&self.conn, source, item)
    }

    /// Store a whole parsed list in one transaction; returns how many rows were written.
    pub fn import_price_list(&mut self, list: &PriceList) -> SqliteResult<usize> {
        let tx = self.conn.transaction()?;
        for item in &list.items {
            Self::upsert_with(&tx, &list.source, item)?;
        }
        tx.commit()?;
        info!(source = %list.source, count = list.items.len(), "Price list stored");
        Ok(list.items.len())
    }

    /// Helper: map a row with the price projection to `StoredPriceItem`.
    fn row_to_price_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredPriceItem> {
        Ok(StoredPriceItem {
            uid: row.get(0)?,
            source: row.get(1)?,
            item: PriceItem {
                code: row.get(2)?,
                description: row.get(3)?,
                unit: row.get(4)?,
                unit_price: row.get(5)?,
                chapter: row.get(6)?,
            },
        })
    }

    /// Every term must match code, description or chapter.
    pub fn search_price_items(&self, query: &str, limit: usize) -> SqliteResult<Vec<StoredPriceItem>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| format!("%{}%", t.to_lowercase()))
            .collect();

        let mut sql = format!("SELECT {PRICE_COLUMNS} FROM price_items WHERE 1 = 1");
        for i in 0..terms.len() {
            let n = i + 1;
            sql.push_str(&format!(
                " AND (lower(code) LIKE ?{n} OR lower(description) LIKE ?{n} OR lower(coalesce(chapter, '')) LIKE ?{n})"
            ));
        }
        sql.push_str(&format!(" ORDER BY code LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(terms.iter()), |row| {
            Self::row_to_price_item(row)
        })?;
        rows.collect()
    }

    /// Look up by code; when several lists carry the code, the newest import wins.
    pub fn get_price_item(&self, code: &str) -> SqliteResult<Option<StoredPriceItem>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {PRICE_COLUMNS} FROM price_items
                     WHERE code = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![code],
                Self::row_to_price_item,
            )
            .optional()
    }

    pub fn all_price_items(&self) -> SqliteResult<Vec<PriceItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PRICE_COLUMNS} FROM price_items ORDER BY code"))?;
        let rows = stmt.query_map([], |row| Self::row_to_price_item(row).map(|s| s.item))?;
        rows.collect()
    }

    /// Persist an estimate as JSON, replacing any previous version.
    pub fn save_estimate(&self, estimate: &Estimate) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(estimate)?;
        self.conn.execute(
            "INSERT INTO estimates (name, json) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET json = excluded.json, updated_at = CURRENT_TIMESTAMP",
            params![estimate.name, json],
        )?;
        info!(name = %estimate.name, bytes = json.len(), "Estimate saved");
        Ok(())
    }

    pub fn load_estimate(&self, name: &str) -> Result<Option<Estimate>, Box<dyn std::error::Error>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json FROM estimates WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => {
                let mut estimate: Estimate = serde_json::from_str(&json)?;
                estimate.recalculate();
                Ok(Some(estimate))
            }
            None => Ok(None),
        }
    }

    /// Names of all saved estimates, most recently updated first.
    pub fn list_estimates(&self) -> SqliteResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM estimates ORDER BY updated_at DESC, name")?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names.collect()
    }

    pub fn delete_estimate(&self, name: &str) -> SqliteResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM estimates WHERE name = ?1", params![name])?;
        if deleted > 0 {
            info!(name = %name, "Estimate deleted");
        }
        Ok(deleted > 0)
    }

    pub fn get_counts(&self) -> SqliteResult<StoreCounts> {
        let price_items: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM price_items", [], |row| row.get(0))?;

        let price_sources: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT source) FROM price_items",
            [],
            |row| row.get(0),
        )?;

        let estimates: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM estimates", [], |row| row.get(0))?;

        Ok(StoreCounts {
            price_items,
            price_sources,
            estimates,
        })
    }
}
