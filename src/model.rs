//! Shared data model: price series, estimated parameters, and the wire
//! shapes exchanged with the game client.
//!
//! The ordered asset list in `MarketParameters` is the canonical index for
//! every matrix in the system; anything row-major downstream is aligned to
//! it and the order is echoed back to the caller so the client never has to
//! guess which row is which.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type AssetId = String;

/// Ascending (timestamp, close) pairs for one instrument.
///
/// Construction enforces ordering and timestamp uniqueness so everything
/// downstream can assume a clean series.
#[derive(Debug, Clone, Default)]
pub struct AssetSeries {
    points: Vec<(u64, f64)>,
}

impl AssetSeries {
    /// Builds a series from raw points: sorts by timestamp, keeps the last
    /// value for a duplicated timestamp, and drops non-finite closes.
    pub fn from_points(mut raw: Vec<(u64, f64)>) -> Self {
        raw.retain(|(_, p)| p.is_finite() && *p > 0.0);
        raw.sort_by_key(|(ts, _)| *ts);
        let mut points: Vec<(u64, f64)> = Vec::with_capacity(raw.len());
        for (ts, p) in raw {
            match points.last_mut() {
                Some((last_ts, last_p)) if *last_ts == ts => *last_p = p,
                _ => points.push((ts, p)),
            }
        }
        Self { points }
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, p)| *p)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Aligned closing-price table for a set of assets over one lookback window.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub series: HashMap<AssetId, AssetSeries>,
    /// Spot prices where the quote endpoint had one; estimation falls back
    /// to the last close otherwise.
    pub spot: HashMap<AssetId, f64>,
}

/// Normalized quote payload. Upstream price objects are duck-typed (mapping,
/// absent, or garbage); the provider boundary collapses them into this tag
/// so nothing downstream re-checks shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotePayload {
    Present(f64),
    Absent,
    Malformed,
}

impl QuotePayload {
    pub fn price(self) -> Option<f64> {
        match self {
            QuotePayload::Present(p) if p.is_finite() && p > 0.0 => Some(p),
            _ => None,
        }
    }
}

/// Per-asset sentiment signal: a bounded drift adjustment plus a short
/// human-readable rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub drift_modifier: f64,
    pub reason: String,
}

impl SentimentSignal {
    pub fn neutral() -> Self {
        Self {
            drift_modifier: 0.0,
            reason: "Technical factors are driving the price.".to_string(),
        }
    }
}

/// Fully populated simulation parameters for a fixed, ordered asset set.
///
/// Invariant: every asset in `order` has an entry in `price`, `mu`, `sigma`
/// and `narrative`, and `correlation` is `order.len()` square — even when
/// every upstream source failed and everything here is a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketParameters {
    pub order: Vec<AssetId>,
    pub price: HashMap<AssetId, f64>,
    pub mu: HashMap<AssetId, f64>,
    pub sigma: HashMap<AssetId, f64>,
    pub narrative: HashMap<AssetId, String>,
    /// Row-major, aligned to `order`, unit diagonal.
    pub correlation: Vec<Vec<f64>>,
    pub has_real_data: bool,
}

impl MarketParameters {
    /// Drift/volatility vectors aligned to `order`.
    pub fn aligned(&self) -> (Vec<f64>, Vec<f64>) {
        let mu = self.order.iter().map(|a| self.mu.get(a).copied().unwrap_or(0.0)).collect();
        let sigma = self.order.iter().map(|a| self.sigma.get(a).copied().unwrap_or(0.0)).collect();
        (mu, sigma)
    }
}

/// One per-asset holding in the client-visible game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub shares: f64,
    pub price: f64,
    pub mu: f64,
    pub sigma: f64,
    pub narrative: String,
}

/// Initial game state returned by `/start_simulation`. Created once per
/// game, mutated only by the turn simulator on the client's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub max_turns: u32,
    pub cash: f64,
    pub assets: Vec<AssetId>,
    pub portfolio: HashMap<AssetId, Holding>,
    pub correlation_matrix: Vec<Vec<f64>>,
}

impl GameState {
    pub fn new(params: &MarketParameters, max_turns: u32, cash: f64) -> Self {
        let portfolio = params
            .order
            .iter()
            .map(|asset| {
                let holding = Holding {
                    shares: 0.0,
                    price: params.price.get(asset).copied().unwrap_or(0.0),
                    mu: params.mu.get(asset).copied().unwrap_or(0.0),
                    sigma: params.sigma.get(asset).copied().unwrap_or(0.0),
                    narrative: params.narrative.get(asset).cloned().unwrap_or_default(),
                };
                (asset.clone(), holding)
            })
            .collect();
        Self {
            turn: 0,
            max_turns,
            cash,
            assets: params.order.clone(),
            portfolio,
            correlation_matrix: params.correlation.clone(),
        }
    }
}

/// Narrative market event. Descriptive only: the effect tag is displayed,
/// not applied back into the simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketEvent {
    pub name: String,
    pub effect: String,
    pub message: String,
}

/// Returns true when the allocation weights sum to 1 within tolerance.
pub fn allocation_is_normalized(weights: &HashMap<AssetId, f64>, tol: f64) -> bool {
    let sum: f64 = weights.values().sum();
    (sum - 1.0).abs() <= tol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_sorts_and_dedups() {
        let s = AssetSeries::from_points(vec![(3, 30.0), (1, 10.0), (2, 20.0), (2, 25.0)]);
        let closes: Vec<f64> = s.closes().collect();
        assert_eq!(closes, vec![10.0, 25.0, 30.0]);
        assert_eq!(s.last_close(), Some(30.0));
    }

    #[test]
    fn test_series_drops_bad_closes() {
        let s = AssetSeries::from_points(vec![(1, f64::NAN), (2, -5.0), (3, 0.0), (4, 42.0)]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.last_close(), Some(42.0));
    }

    #[test]
    fn test_quote_payload_normalization() {
        assert_eq!(QuotePayload::Present(101.5).price(), Some(101.5));
        assert_eq!(QuotePayload::Present(f64::NAN).price(), None);
        assert_eq!(QuotePayload::Present(-1.0).price(), None);
        assert_eq!(QuotePayload::Absent.price(), None);
        assert_eq!(QuotePayload::Malformed.price(), None);
    }

    #[test]
    fn test_game_state_covers_all_assets() {
        let order = vec!["AAPL".to_string(), "MSFT".to_string()];
        let params = MarketParameters {
            order: order.clone(),
            price: order.iter().map(|a| (a.clone(), 150.0)).collect(),
            mu: order.iter().map(|a| (a.clone(), 0.05)).collect(),
            sigma: order.iter().map(|a| (a.clone(), 0.25)).collect(),
            narrative: order.iter().map(|a| (a.clone(), "n".to_string())).collect(),
            correlation: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            has_real_data: false,
        };
        let state = GameState::new(&params, 20, 1_000_000.0);
        assert_eq!(state.turn, 0);
        assert_eq!(state.assets, order);
        assert_eq!(state.portfolio.len(), 2);
        assert_eq!(state.correlation_matrix.len(), 2);
    }

    #[test]
    fn test_allocation_normalization_check() {
        let mut w = HashMap::new();
        w.insert("A".to_string(), 0.5);
        w.insert("B".to_string(), 0.5);
        assert!(allocation_is_normalized(&w, 1e-6));
        w.insert("B".to_string(), 0.6);
        assert!(!allocation_is_normalized(&w, 1e-6));
    }
}
