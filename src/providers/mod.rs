//! External data-source boundary.
//!
//! Both providers are abstract contracts: the coordinator only ever sees a
//! `PriceTable` or a `SentimentSignal`, never a vendor payload. Any error or
//! timeout from an implementation is treated as "no data" upstream.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{AssetId, PriceTable, SentimentSignal};

pub mod history;
pub mod sentiment;

/// Supplies an aligned table of per-asset closing prices over a lookback
/// window, plus spot quotes where available.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch(&self, assets: &[AssetId], lookback_days: u32) -> Result<PriceTable>;
}

/// Supplies a bounded drift adjustment and a short rationale for one asset,
/// derived from recent headlines.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn fetch(&self, asset: &AssetId) -> Result<SentimentSignal>;
}
