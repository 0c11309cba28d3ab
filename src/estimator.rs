//! Parameter estimation: log-return drift, volatility, and the joint
//! correlation/covariance structure over one lookback window.
//!
//! The estimator never returns an error for data problems. An asset with
//! fewer than two usable observations is flagged and estimated with the
//! documented defaults, and any non-finite statistic is sanitized before it
//! leaves this module — the rest of the pipeline can rely on every number
//! being finite.

use std::collections::HashMap;

use crate::error::SimError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::math;
use crate::model::{AssetId, PriceTable};

/// Fallback statistics applied when an asset cannot be estimated.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorDefaults {
    pub drift: f64,
    pub vol: f64,
}

#[derive(Debug, Clone)]
pub struct Estimates {
    pub order: Vec<AssetId>,
    pub mu: HashMap<AssetId, f64>,
    pub sigma: HashMap<AssetId, f64>,
    /// Row-major, aligned to `order`, unit diagonal, entries in [-1, 1].
    pub correlation: Vec<Vec<f64>>,
    /// Annualized, derived from `sigma` and `correlation` so the two views
    /// can never disagree. Symmetric with non-negative diagonal.
    pub covariance: Vec<Vec<f64>>,
    /// Assets that fell back to defaults for lack of history.
    pub insufficient: Vec<AssetId>,
}

/// Estimates annualized drift, volatility and correlation for `order` from
/// the aligned price table. `annualization` is trading days per year.
pub fn estimate(
    order: &[AssetId],
    table: &PriceTable,
    annualization: f64,
    defaults: EstimatorDefaults,
) -> Estimates {
    let n = order.len();
    let mut returns: Vec<Vec<f64>> = Vec::with_capacity(n);
    let mut insufficient = Vec::new();

    for asset in order {
        let r = table
            .series
            .get(asset)
            .map(|s| log_returns(s.closes().collect::<Vec<_>>().as_slice()))
            .unwrap_or_default();
        if r.len() < 2 {
            insufficient.push(asset.clone());
        }
        returns.push(r);
    }

    let mut mu = HashMap::with_capacity(n);
    let mut sigma = HashMap::with_capacity(n);

    for (i, asset) in order.iter().enumerate() {
        let r = &returns[i];
        if r.len() < 2 {
            mu.insert(asset.clone(), defaults.drift);
            sigma.insert(asset.clone(), defaults.vol);
            continue;
        }
        let m = mean(r) * annualization;
        let s = sample_std(r) * annualization.sqrt();
        mu.insert(asset.clone(), sanitize(m, defaults.drift, "drift", asset));
        sigma.insert(
            asset.clone(),
            sanitize(s, defaults.vol, "volatility", asset).max(0.0),
        );
    }

    let mut correlation = math::identity(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let rho = pairwise_correlation(&returns[i], &returns[j]);
            correlation[i][j] = rho;
            correlation[j][i] = rho;
        }
    }

    let sigma_vec: Vec<f64> = order.iter().map(|a| sigma[a]).collect();
    let covariance = math::covariance_from(&sigma_vec, &correlation);

    for asset in &insufficient {
        let err = SimError::InsufficientHistory { asset: asset.clone() };
        log(
            Level::Warn,
            Domain::Estimate,
            "insufficient_history",
            obj(&[
                ("error", v_str(&err.to_string())),
                ("default_drift", v_num(defaults.drift)),
                ("default_vol", v_num(defaults.vol)),
            ]),
        );
    }

    Estimates { order: order.to_vec(), mu, sigma, correlation, covariance, insufficient }
}

/// Log returns of a close series; the first close has no return.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .filter(|r| r.is_finite())
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}

/// Sample correlation over the tail overlap of two return series. Zero when
/// either side lacks data or variance (mirrors a `fillna(0)` on the matrix).
fn pairwise_correlation(a: &[f64], b: &[f64]) -> f64 {
    let k = a.len().min(b.len());
    if k < 2 {
        return 0.0;
    }
    let a = &a[a.len() - k..];
    let b = &b[b.len() - k..];
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for i in 0..k {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    let rho = cov / (va.sqrt() * vb.sqrt());
    if rho.is_finite() {
        rho.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn sanitize(value: f64, default: f64, stat: &'static str, asset: &str) -> f64 {
    if value.is_finite() {
        value
    } else {
        let err = SimError::NonFiniteResult { stat, asset: asset.to_string() };
        log(
            Level::Warn,
            Domain::Estimate,
            "non_finite_sanitized",
            obj(&[("error", v_str(&err.to_string())), ("default", v_num(default))]),
        );
        default
    }
}
