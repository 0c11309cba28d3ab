//! Headline-driven sentiment provider.
//!
//! Pulls recent headlines for one asset and scores them into a bounded
//! drift modifier plus a one-line rationale. The clamp is part of the
//! provider contract: no matter what the scoring says, the modifier leaves
//! this module inside [-clamp, clamp].

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{AssetId, SentimentSignal};
use crate::providers::SentimentProvider;

const POSITIVE: &[&str] = &[
    "beat", "beats", "surge", "surges", "rally", "record", "upgrade", "growth", "profit", "soar",
];
const NEGATIVE: &[&str] = &[
    "miss", "misses", "plunge", "plunges", "lawsuit", "downgrade", "layoff", "loss", "recall", "probe",
];

pub struct HeadlineSentimentProvider {
    client: Client,
    base: String,
    clamp: f64,
}

#[derive(Deserialize, Debug)]
struct HeadlinesPayload {
    #[serde(default)]
    headlines: Vec<String>,
}

impl HeadlineSentimentProvider {
    pub fn new(base: String, clamp: f64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base,
            clamp,
        }
    }

    /// Scores the top headlines: each positive keyword nudges drift up by
    /// 0.05, each negative one down, then the contract clamp applies.
    fn score(&self, asset: &AssetId, headlines: &[String]) -> SentimentSignal {
        if headlines.is_empty() {
            return SentimentSignal {
                drift_modifier: 0.0,
                reason: format!("No major headlines for {} today.", asset),
            };
        }
        let mut raw: f64 = 0.0;
        for headline in headlines.iter().take(3) {
            let lower = headline.to_lowercase();
            for w in POSITIVE {
                if lower.contains(w) {
                    raw += 0.05;
                }
            }
            for w in NEGATIVE {
                if lower.contains(w) {
                    raw -= 0.05;
                }
            }
        }
        let drift_modifier = raw.clamp(-self.clamp, self.clamp);
        let reason = if drift_modifier > 0.0 {
            format!("Positive coverage is lifting {}: {}", asset, headlines[0])
        } else if drift_modifier < 0.0 {
            format!("Negative coverage is weighing on {}: {}", asset, headlines[0])
        } else {
            "News sentiment is driving price action.".to_string()
        };
        SentimentSignal { drift_modifier, reason }
    }
}

#[async_trait]
impl SentimentProvider for HeadlineSentimentProvider {
    async fn fetch(&self, asset: &AssetId) -> Result<SentimentSignal> {
        let url = format!("{}/headlines?symbol={}", self.base, asset);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("headline endpoint returned {} for {}", resp.status(), asset);
        }
        let payload: HeadlinesPayload = resp.json().await?;
        let signal = self.score(asset, &payload.headlines);
        log(
            Level::Debug,
            Domain::Market,
            "sentiment_scored",
            obj(&[
                ("asset", v_str(asset)),
                ("headlines", v_num(payload.headlines.len() as f64)),
                ("drift_modifier", v_num(signal.drift_modifier)),
            ]),
        );
        Ok(signal)
    }
}
