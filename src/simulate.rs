//! One simulated quarter of correlated asset returns.
//!
//! The discrete step follows geometric Brownian motion: per-asset return is
//! `mu * dt` plus a correlated Gaussian shock scaled by `sqrt(dt)`. Shocks
//! are correlated through the Cholesky factor of the covariance matrix; when
//! that matrix is not positive-definite (a routine outcome with defaulted
//! parameters, where two assets share an identical row), the factor degrades
//! to the diagonal `diag(sigma)` and the assets simply move independently.

use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::HashMap;

use crate::logging::{log, obj, v_num, Domain, Level};
use crate::math;
use crate::model::{AssetId, MarketParameters};

/// Source of independent standard-normal draws. Abstracted so turns can be
/// replayed with pinned shocks in tests.
pub trait ShockSource {
    fn draw(&mut self, n: usize) -> Vec<f64>;
}

pub struct GaussianShocks<R: Rng> {
    rng: R,
}

impl<R: Rng> GaussianShocks<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> ShockSource for GaussianShocks<R> {
    fn draw(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.sample(StandardNormal)).collect()
    }
}

/// Replays a pinned shock sequence, cycling if asked for more draws than it
/// holds. Zeros reproduce the pure-drift path.
pub struct FixedShocks {
    values: Vec<f64>,
    cursor: usize,
}

impl FixedShocks {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    pub fn zeros() -> Self {
        Self::new(vec![0.0])
    }
}

impl ShockSource for FixedShocks {
    fn draw(&mut self, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| {
                if self.values.is_empty() {
                    return 0.0;
                }
                let v = self.values[self.cursor % self.values.len()];
                self.cursor += 1;
                v
            })
            .collect()
    }
}

/// Result of advancing the game by one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Step {
        value: f64,
        /// Per-asset simple return applied this turn.
        returns: HashMap<AssetId, f64>,
        /// Per-asset price after applying the return.
        prices: HashMap<AssetId, f64>,
    },
    /// Portfolio value dropped to zero or below. Terminal, not an error.
    Bankrupt { value: f64 },
}

pub struct TurnSimulator {
    dt: f64,
}

impl TurnSimulator {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }

    /// Advances one turn: draws correlated shocks, applies per-asset returns
    /// to the allocation weights, and reprices the book.
    ///
    /// Weights are taken per asset in `params.order` (missing entries count
    /// as zero) and renormalized when their sum drifts from one. A weight
    /// sum of zero means fully in cash: value carries over unchanged.
    pub fn step(
        &self,
        params: &MarketParameters,
        allocation: &HashMap<AssetId, f64>,
        value: f64,
        shocks: &mut dyn ShockSource,
    ) -> TurnOutcome {
        let n = params.order.len();
        let (mu, sigma) = params.aligned();

        let cov = math::covariance_from(&sigma, &params.correlation);
        let factor = match math::cholesky_lower(&cov) {
            Some(l) => l,
            None => {
                log(
                    Level::Warn,
                    Domain::Simulate,
                    "covariance_not_positive_definite",
                    obj(&[("assets", v_num(n as f64))]),
                );
                diagonal_factor(&sigma)
            }
        };

        let z = shocks.draw(n);
        let correlated = math::correlate(&factor, &z);
        let sqrt_dt = self.dt.sqrt();

        let mut weights: Vec<f64> = params
            .order
            .iter()
            .map(|a| allocation.get(a).copied().unwrap_or(0.0).max(0.0))
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return TurnOutcome::Step {
                value,
                returns: params.order.iter().map(|a| (a.clone(), 0.0)).collect(),
                prices: params.order.iter().map(|a| (a.clone(), price_of(params, a))).collect(),
            };
        }
        for w in &mut weights {
            *w /= weight_sum;
        }

        let mut returns = HashMap::with_capacity(n);
        let mut prices = HashMap::with_capacity(n);
        let mut new_value = 0.0;
        for (i, asset) in params.order.iter().enumerate() {
            let ret = mu[i] * self.dt + correlated[i] * sqrt_dt;
            new_value += value * weights[i] * (1.0 + ret);
            let price = price_of(params, asset) * (1.0 + ret);
            returns.insert(asset.clone(), ret);
            prices.insert(asset.clone(), price.max(0.0));
        }

        if new_value <= 0.0 || !new_value.is_finite() {
            log(
                Level::Info,
                Domain::Simulate,
                "portfolio_bankrupt",
                obj(&[("value", v_num(new_value))]),
            );
            return TurnOutcome::Bankrupt { value: new_value.min(0.0) };
        }
        TurnOutcome::Step { value: new_value, returns, prices }
    }
}

fn price_of(params: &MarketParameters, asset: &AssetId) -> f64 {
    params.price.get(asset).copied().unwrap_or(0.0)
}

fn diagonal_factor(sigma: &[f64]) -> Vec<Vec<f64>> {
    let n = sigma.len();
    let mut l = vec![vec![0.0; n]; n];
    for (i, row) in l.iter_mut().enumerate() {
        row[i] = sigma[i].max(0.0);
    }
    l
}
