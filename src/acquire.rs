//! Timeout-bounded, partially-degradable acquisition of market parameters.
//!
//! Two workers start at the same instant: one fetches the historical table
//! for every requested asset, one fans out per-asset sentiment requests
//! (at most `sentiment_fanout` in flight). Each worker has its own deadline
//! measured from that shared start, so the deadlines race rather than
//! stack. A worker that blows its deadline is abandoned: the coordinator
//! stops awaiting it, and the sealed result board guarantees a straggler's
//! late result can never leak into output that was already merged.
//!
//! The contract is total degradation safety: this module returns a fully
//! populated `MarketParameters` for every requested asset no matter what
//! the upstream sources do. There are no retries; failure means defaults,
//! immediately, to bound worst-case latency of an interactive request.

use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::estimator::{self, EstimatorDefaults};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::math;
use crate::model::{AssetId, MarketParameters, SentimentSignal};
use crate::providers::{HistoryProvider, SentimentProvider};

const OFFLINE_NARRATIVE: &str = "Simulation Mode (Data Unavailable)";

/// Per-asset sentiment results with a one-shot seal. Workers insert as they
/// complete; once the coordinator seals the board at the deadline, late
/// inserts are discarded.
struct SentimentBoard {
    inner: Mutex<BoardInner>,
}

struct BoardInner {
    map: HashMap<AssetId, SentimentSignal>,
    sealed: bool,
}

impl SentimentBoard {
    fn new() -> Self {
        Self { inner: Mutex::new(BoardInner { map: HashMap::new(), sealed: false }) }
    }

    fn insert(&self, asset: AssetId, signal: SentimentSignal) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };
        if inner.sealed {
            return false;
        }
        inner.map.insert(asset, signal);
        true
    }

    fn seal(&self) -> HashMap<AssetId, SentimentSignal> {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.sealed = true;
                inner.map.clone()
            }
            Err(_) => HashMap::new(),
        }
    }
}

pub struct AcquisitionCoordinator {
    history: Arc<dyn HistoryProvider>,
    sentiment: Arc<dyn SentimentProvider>,
    lookback_days: u32,
    annualization: f64,
    history_timeout: Duration,
    sentiment_timeout: Duration,
    fanout: usize,
    clamp: f64,
    default_price: f64,
    defaults: EstimatorDefaults,
}

impl AcquisitionCoordinator {
    pub fn new(
        cfg: &SimConfig,
        history: Arc<dyn HistoryProvider>,
        sentiment: Arc<dyn SentimentProvider>,
    ) -> Self {
        Self {
            history,
            sentiment,
            lookback_days: cfg.lookback_days,
            annualization: cfg.annualization,
            history_timeout: Duration::from_millis(cfg.history_timeout_ms),
            sentiment_timeout: Duration::from_millis(cfg.sentiment_timeout_ms),
            fanout: cfg.sentiment_fanout.max(1),
            clamp: cfg.sentiment_clamp,
            default_price: cfg.default_price,
            defaults: EstimatorDefaults { drift: cfg.default_drift, vol: cfg.default_vol },
        }
    }

    /// Acquires parameters for `assets`. Infallible by contract.
    pub async fn acquire(&self, assets: &[AssetId]) -> MarketParameters {
        let start = Instant::now();
        let history_deadline = start + self.history_timeout;
        let sentiment_deadline = start + self.sentiment_timeout;

        let history_task = {
            let provider = Arc::clone(&self.history);
            let assets = assets.to_vec();
            let lookback = self.lookback_days;
            tokio::spawn(async move { provider.fetch(&assets, lookback).await })
        };

        let board = Arc::new(SentimentBoard::new());
        let sentiment_task = {
            let provider = Arc::clone(&self.sentiment);
            let board = Arc::clone(&board);
            let assets = assets.to_vec();
            let fanout = self.fanout;
            tokio::spawn(async move {
                stream::iter(assets)
                    .map(|asset| {
                        let provider = Arc::clone(&provider);
                        let board = Arc::clone(&board);
                        async move {
                            match provider.fetch(&asset).await {
                                Ok(signal) => {
                                    board.insert(asset, signal);
                                }
                                Err(err) => {
                                    let err = SimError::UpstreamUnavailable {
                                        source_name: "sentiment",
                                        reason: err.to_string(),
                                    };
                                    log(
                                        Level::Warn,
                                        Domain::Acquire,
                                        "sentiment_unavailable",
                                        obj(&[
                                            ("asset", v_str(&asset)),
                                            ("error", v_str(&err.to_string())),
                                        ]),
                                    );
                                }
                            }
                        }
                    })
                    .buffer_unordered(fanout)
                    .collect::<()>()
                    .await;
            })
        };

        let table = match timeout_at(history_deadline, history_task).await {
            Ok(Ok(Ok(table))) => Some(table),
            Ok(Ok(Err(err))) => {
                let err = SimError::UpstreamUnavailable {
                    source_name: "history",
                    reason: err.to_string(),
                };
                log(
                    Level::Warn,
                    Domain::Acquire,
                    "history_unavailable",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
                None
            }
            Ok(Err(join_err)) => {
                log(
                    Level::Error,
                    Domain::Acquire,
                    "history_worker_panicked",
                    obj(&[("error", v_str(&join_err.to_string()))]),
                );
                None
            }
            Err(_) => {
                // Abandon the straggler; its result, if it ever arrives,
                // is discarded along with the handle.
                let err = SimError::UpstreamTimeout {
                    source_name: "history",
                    budget_ms: self.history_timeout.as_millis() as u64,
                };
                log(
                    Level::Warn,
                    Domain::Acquire,
                    "history_timeout",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
                None
            }
        };
        let has_real_data = table.is_some();

        match timeout_at(sentiment_deadline, sentiment_task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                log(
                    Level::Error,
                    Domain::Acquire,
                    "sentiment_worker_panicked",
                    obj(&[("error", v_str(&join_err.to_string()))]),
                );
            }
            Err(_) => {
                let err = SimError::UpstreamTimeout {
                    source_name: "sentiment",
                    budget_ms: self.sentiment_timeout.as_millis() as u64,
                };
                log(
                    Level::Warn,
                    Domain::Acquire,
                    "sentiment_timeout",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
            }
        }
        // Seal before reading: anything still in flight is locked out.
        let sentiments = board.seal();

        let params = self.merge(assets, table.as_ref(), &sentiments, has_real_data);
        log(
            Level::Info,
            Domain::Acquire,
            "acquisition_complete",
            obj(&[
                ("assets", v_num(assets.len() as f64)),
                ("has_real_data", serde_json::json!(has_real_data)),
                ("sentiment_hits", v_num(sentiments.len() as f64)),
                ("elapsed_ms", v_num(start.elapsed().as_millis() as f64)),
            ]),
        );
        params
    }

    /// Merges whatever completed into a fully populated parameter set.
    fn merge(
        &self,
        assets: &[AssetId],
        table: Option<&crate::model::PriceTable>,
        sentiments: &HashMap<AssetId, SentimentSignal>,
        has_real_data: bool,
    ) -> MarketParameters {
        let (base_mu, sigma, correlation, price) = match table {
            Some(table) => {
                let est = estimator::estimate(assets, table, self.annualization, self.defaults);
                let price: HashMap<AssetId, f64> = assets
                    .iter()
                    .map(|a| {
                        let p = table
                            .spot
                            .get(a)
                            .copied()
                            .or_else(|| table.series.get(a).and_then(|s| s.last_close()))
                            .unwrap_or(self.default_price);
                        (a.clone(), p)
                    })
                    .collect();
                (est.mu, est.sigma, est.correlation, price)
            }
            None => {
                let mu = assets.iter().map(|a| (a.clone(), self.defaults.drift)).collect();
                let sigma = assets.iter().map(|a| (a.clone(), self.defaults.vol)).collect();
                let price = assets.iter().map(|a| (a.clone(), self.default_price)).collect();
                (mu, sigma, math::identity(assets.len()), price)
            }
        };

        let mut mu = HashMap::with_capacity(assets.len());
        let mut narrative = HashMap::with_capacity(assets.len());
        for asset in assets {
            let signal = sentiments.get(asset);
            let modifier = signal
                .map(|s| s.drift_modifier.clamp(-self.clamp, self.clamp))
                .unwrap_or(0.0);
            let base = base_mu.get(asset).copied().unwrap_or(self.defaults.drift);
            mu.insert(asset.clone(), base + modifier);

            let text = if !has_real_data {
                OFFLINE_NARRATIVE.to_string()
            } else {
                signal
                    .map(|s| s.reason.clone())
                    .unwrap_or_else(|| SentimentSignal::neutral().reason)
            };
            narrative.insert(asset.clone(), text);
        }

        MarketParameters {
            order: assets.to_vec(),
            price,
            mu,
            sigma,
            narrative,
            correlation,
            has_real_data,
        }
    }
}
