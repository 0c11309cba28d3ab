//! SQLite persistence for the daily asset pool.
//!
//! One row per refresh date; the newest row wins on load. The payload is the
//! serialized candidate list so the schema never chases the asset shape.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::model::AssetId;

/// One tradable candidate in the daily pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAsset {
    pub symbol: AssetId,
    pub price: f64,
    /// Annualized volatility over roughly the last month.
    pub volatility: f64,
}

pub struct PoolStore {
    conn: Connection,
}

impl PoolStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS daily_assets (
                date TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Upserts the pool for `date` (ISO yyyy-mm-dd).
    pub fn save(&mut self, date: &str, assets: &[DailyAsset]) -> Result<()> {
        let payload = serde_json::to_string(assets)?;
        self.conn.execute(
            "INSERT INTO daily_assets (date, payload) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET payload = excluded.payload",
            params![date, payload],
        )?;
        Ok(())
    }

    /// Most recent pool by date, if any refresh has ever run.
    pub fn load_latest(&self) -> Result<Option<(String, Vec<DailyAsset>)>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT date, payload FROM daily_assets ORDER BY date DESC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((date, payload)) => {
                let assets: Vec<DailyAsset> = serde_json::from_str(&payload)?;
                Ok(Some((date, assets)))
            }
            None => Ok(None),
        }
    }
}
