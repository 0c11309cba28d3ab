//! Error taxonomy for the simulation pipeline.
//!
//! The acquisition/estimation path absorbs every upstream failure and
//! degrades to defaults, so most of these variants never cross the API
//! boundary: they exist so the degradation decision is typed and logged
//! rather than stringly guessed at. Only `InvalidSelection` and
//! `MalformedRequest` are user-correctable and map to a 4xx.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Empty or out-of-range asset selection. Checked before any provider
    /// call is issued.
    #[error("invalid selection: must pick between {min} and {max} assets")]
    InvalidSelection { min: usize, max: usize },

    /// Request body failed to parse. User-correctable, maps to a 4xx.
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// Fewer than two usable observations for an asset. Recovered locally
    /// with default drift/volatility.
    #[error("insufficient history for {asset}")]
    InsufficientHistory { asset: String },

    /// A provider exceeded its deadline. Recovered locally with defaults.
    #[error("{source_name} exceeded its {budget_ms}ms budget")]
    UpstreamTimeout { source_name: &'static str, budget_ms: u64 },

    /// A provider returned an error. Recovered locally with defaults.
    #[error("{source_name} unavailable: {reason}")]
    UpstreamUnavailable { source_name: &'static str, reason: String },

    /// A computed statistic was NaN or infinite. Sanitized to a default
    /// before leaving the estimator.
    #[error("non-finite {stat} for {asset}")]
    NonFiniteResult { stat: &'static str, asset: String },

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SimError {
    /// Whether this failure is the caller's fault (4xx) or ours (5xx).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SimError::InvalidSelection { .. } | SimError::MalformedRequest { .. }
        )
    }
}
