//! Degradation guarantees: whatever the upstream sources do, a game can
//! always start and play to completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;

use portsim::acquire::AcquisitionCoordinator;
use portsim::config::SimConfig;
use portsim::model::{AssetId, AssetSeries, GameState, PriceTable, SentimentSignal};
use portsim::providers::{HistoryProvider, SentimentProvider};
use portsim::simulate::{GaussianShocks, TurnOutcome, TurnSimulator};

struct FlakyHistory {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl HistoryProvider for FlakyHistory {
    async fn fetch(&self, assets: &[AssetId], _lookback_days: u32) -> Result<PriceTable> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            anyhow::bail!("upstream outage");
        }
        let mut table = PriceTable::default();
        for (i, a) in assets.iter().enumerate() {
            let base = 80.0 + 5.0 * i as f64;
            let points = (0..40).map(|t| (t as u64, base + (t % 4) as f64)).collect();
            table.series.insert(a.clone(), AssetSeries::from_points(points));
            table.spot.insert(a.clone(), base);
        }
        Ok(table)
    }
}

struct FlakySentiment {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl SentimentProvider for FlakySentiment {
    async fn fetch(&self, asset: &AssetId) -> Result<SentimentSignal> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            anyhow::bail!("upstream outage");
        }
        Ok(SentimentSignal {
            drift_modifier: -0.05,
            reason: format!("Soft coverage on {}", asset),
        })
    }
}

fn cfg() -> SimConfig {
    let mut cfg = SimConfig::from_env();
    cfg.history_timeout_ms = 400;
    cfg.sentiment_timeout_ms = 200;
    cfg
}

fn assets() -> Vec<AssetId> {
    vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()]
}

#[tokio::test(start_paused = true)]
async fn total_outage_game_is_playable_end_to_end() {
    let cfg = cfg();
    let coordinator = AcquisitionCoordinator::new(
        &cfg,
        Arc::new(FlakyHistory { delay: Duration::ZERO, fail: true }),
        Arc::new(FlakySentiment { delay: Duration::ZERO, fail: true }),
    );
    let order = assets();
    let params = coordinator.acquire(&order).await;
    assert!(!params.has_real_data);

    let state = GameState::new(&params, cfg.max_turns, cfg.starting_cash);
    assert_eq!(state.portfolio.len(), 3);
    for holding in state.portfolio.values() {
        assert_eq!(holding.price, 150.0);
        assert_eq!(holding.mu, 0.05);
        assert_eq!(holding.sigma, 0.25);
    }

    // Play the whole game on defaults.
    let sim = TurnSimulator::new(cfg.dt);
    let allocation: HashMap<AssetId, f64> =
        order.iter().map(|a| (a.clone(), 1.0 / 3.0)).collect();
    let mut shocks = GaussianShocks::new(StdRng::seed_from_u64(11));
    let mut value = cfg.starting_cash;
    for _ in 0..cfg.max_turns {
        match sim.step(&params, &allocation, value, &mut shocks) {
            TurnOutcome::Step { value: v, .. } => {
                assert!(v.is_finite());
                value = v;
            }
            TurnOutcome::Bankrupt { value } => {
                assert!(value <= 0.0);
                break;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn slow_history_is_abandoned_within_budget() {
    let cfg = cfg();
    let coordinator = AcquisitionCoordinator::new(
        &cfg,
        Arc::new(FlakyHistory { delay: Duration::from_secs(120), fail: false }),
        Arc::new(FlakySentiment { delay: Duration::ZERO, fail: true }),
    );
    let started = Instant::now();
    let params = coordinator.acquire(&assets()).await;
    // Driven time must track the deadline, not the straggler's sleep.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!params.has_real_data);
    assert_eq!(params.sigma["AAPL"], 0.25);
}

#[tokio::test(start_paused = true)]
async fn sentiment_outage_leaves_history_estimates_intact() {
    let cfg = cfg();
    let coordinator = AcquisitionCoordinator::new(
        &cfg,
        Arc::new(FlakyHistory { delay: Duration::ZERO, fail: false }),
        Arc::new(FlakySentiment { delay: Duration::from_secs(60), fail: false }),
    );
    let order = assets();
    let params = coordinator.acquire(&order).await;
    assert!(params.has_real_data);
    assert_eq!(params.price["AAPL"], 80.0);
    // No sentiment made the deadline, so every narrative is the neutral one.
    for a in &order {
        assert_eq!(params.narrative[a], SentimentSignal::neutral().reason);
    }
}

#[tokio::test(start_paused = true)]
async fn live_sentiment_shifts_drift_down() {
    let cfg = cfg();
    let coordinator = AcquisitionCoordinator::new(
        &cfg,
        Arc::new(FlakyHistory { delay: Duration::ZERO, fail: false }),
        Arc::new(FlakySentiment { delay: Duration::ZERO, fail: false }),
    );
    let quiet = AcquisitionCoordinator::new(
        &cfg,
        Arc::new(FlakyHistory { delay: Duration::ZERO, fail: false }),
        Arc::new(FlakySentiment { delay: Duration::ZERO, fail: true }),
    );
    let order = assets();
    let with_sentiment = coordinator.acquire(&order).await;
    let without = quiet.acquire(&order).await;
    for a in &order {
        assert!((with_sentiment.mu[a] - without.mu[a] + 0.05).abs() < 1e-9);
        assert!(with_sentiment.narrative[a].contains(a.as_str()));
    }
}
