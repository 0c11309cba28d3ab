//! Daily asset-pool refresh.
//!
//! Once a day (or whenever the trigger endpoint is hit) the candidate pool
//! is repriced: spot price plus annualized volatility over roughly the last
//! month, per symbol. Symbols without a usable price are skipped; if the
//! whole refresh comes back empty, a small static pool is written instead
//! so the game always has something to offer. The trigger never fails.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::estimator;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::AssetId;
use crate::providers::HistoryProvider;
use crate::storage::{DailyAsset, PoolStore};

const CANDIDATE_POOL: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "AMD", "NFLX", "META", "SPY", "COIN",
    "PLTR", "GME", "HOOD", "UBER",
];

const VOL_LOOKBACK_DAYS: u32 = 30;
const FALLBACK_PRICE: f64 = 150.0;
const FALLBACK_VOL: f64 = 0.3;
const DEFAULT_VOL: f64 = 0.2;

pub struct DailyRefresher {
    history: Arc<dyn HistoryProvider>,
    store: Arc<Mutex<PoolStore>>,
    annualization: f64,
}

impl DailyRefresher {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        store: Arc<Mutex<PoolStore>>,
        annualization: f64,
    ) -> Self {
        Self { history, store, annualization }
    }

    /// Refreshes the pool and persists it under today's date. Returns how
    /// many candidates made it in.
    pub async fn refresh(&self) -> usize {
        let candidates: Vec<AssetId> = CANDIDATE_POOL.iter().map(|s| s.to_string()).collect();
        let mut assets = match self.history.fetch(&candidates, VOL_LOOKBACK_DAYS).await {
            Ok(table) => {
                let mut assets = Vec::new();
                for symbol in &candidates {
                    let price = table
                        .spot
                        .get(symbol)
                        .copied()
                        .or_else(|| table.series.get(symbol).and_then(|s| s.last_close()));
                    let price = match price {
                        Some(p) if p > 0.0 => p,
                        _ => continue,
                    };
                    let vol = table
                        .series
                        .get(symbol)
                        .map(|s| {
                            let closes: Vec<f64> = s.closes().collect();
                            let returns = estimator::log_returns(&closes);
                            if returns.len() < 2 {
                                return DEFAULT_VOL;
                            }
                            let v = sample_std(&returns) * self.annualization.sqrt();
                            if v.is_finite() { v } else { DEFAULT_VOL }
                        })
                        .unwrap_or(DEFAULT_VOL);
                    assets.push(DailyAsset { symbol: symbol.clone(), price, volatility: vol });
                }
                assets
            }
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Market,
                    "daily_refresh_fetch_failed",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
                Vec::new()
            }
        };

        if assets.is_empty() {
            assets = static_fallback();
            log(
                Level::Warn,
                Domain::Market,
                "daily_refresh_static_fallback",
                obj(&[("assets", v_num(assets.len() as f64))]),
            );
        }

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let count = assets.len();
        if let Err(err) = self.store.lock().await.save(&date, &assets) {
            log(
                Level::Error,
                Domain::Storage,
                "daily_pool_save_failed",
                obj(&[("date", v_str(&date)), ("error", v_str(&err.to_string()))]),
            );
        } else {
            log(
                Level::Info,
                Domain::Market,
                "daily_pool_refreshed",
                obj(&[("date", v_str(&date)), ("assets", v_num(count as f64))]),
            );
        }
        count
    }
}

fn static_fallback() -> Vec<DailyAsset> {
    CANDIDATE_POOL
        .iter()
        .take(5)
        .map(|s| DailyAsset {
            symbol: s.to_string(),
            price: FALLBACK_PRICE,
            volatility: FALLBACK_VOL,
        })
        .collect()
}

fn sample_std(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let m = xs.iter().sum::<f64>() / n as f64;
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}
