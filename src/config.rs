//! Runtime configuration, resolved once at startup from the environment.

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Clone, Serialize)]
pub struct SimConfig {
    pub bind_addr: String,
    /// Base URL for the historical/quote data source.
    pub market_data_base: String,
    /// Base URL for the headline sentiment source.
    pub sentiment_base: String,
    pub sqlite_path: String,
    /// Lookback window for parameter estimation, in daily observations.
    pub lookback_days: u32,
    /// Trading days per year, used to annualize drift/volatility/covariance.
    pub annualization: f64,
    /// Simulated time per turn, in years (one quarter).
    pub dt: f64,
    pub max_turns: u32,
    pub starting_cash: f64,
    pub min_assets: usize,
    pub max_assets: usize,
    /// Deadline for the historical-data worker.
    pub history_timeout_ms: u64,
    /// Deadline for the sentiment worker, racing the history deadline.
    pub sentiment_timeout_ms: u64,
    /// Max concurrent per-asset sentiment requests.
    pub sentiment_fanout: usize,
    /// Hard bound on the sentiment drift modifier, applied at the boundary.
    pub sentiment_clamp: f64,
    pub default_price: f64,
    pub default_drift: f64,
    pub default_vol: f64,
    pub event_probability: f64,
}

impl SimConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            market_data_base: std::env::var("MARKET_DATA_BASE")
                .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string()),
            sentiment_base: std::env::var("SENTIMENT_BASE")
                .unwrap_or_else(|_| "https://feeds.finance.yahoo.com".to_string()),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./portsim.sqlite".to_string()),
            lookback_days: std::env::var("LOOKBACK_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(252),
            annualization: std::env::var("ANNUALIZATION").ok().and_then(|v| v.parse().ok()).unwrap_or(252.0),
            dt: std::env::var("TURN_DT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.25),
            max_turns: std::env::var("MAX_TURNS").ok().and_then(|v| v.parse().ok()).unwrap_or(20),
            starting_cash: std::env::var("STARTING_CASH").ok().and_then(|v| v.parse().ok()).unwrap_or(1_000_000.0),
            min_assets: std::env::var("MIN_ASSETS").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
            max_assets: std::env::var("MAX_ASSETS").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            history_timeout_ms: std::env::var("HISTORY_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(4000),
            sentiment_timeout_ms: std::env::var("SENTIMENT_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(2000),
            sentiment_fanout: std::env::var("SENTIMENT_FANOUT").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            sentiment_clamp: std::env::var("SENTIMENT_CLAMP").ok().and_then(|v| v.parse().ok()).unwrap_or(0.3),
            default_price: std::env::var("DEFAULT_PRICE").ok().and_then(|v| v.parse().ok()).unwrap_or(150.0),
            default_drift: std::env::var("DEFAULT_DRIFT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.05),
            default_vol: std::env::var("DEFAULT_VOL").ok().and_then(|v| v.parse().ok()).unwrap_or(0.25),
            event_probability: std::env::var("EVENT_PROBABILITY").ok().and_then(|v| v.parse().ok()).unwrap_or(0.25),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// SHA256 of the serialized config, logged at startup for run provenance.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}
