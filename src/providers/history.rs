//! Chart-API historical price provider.
//!
//! Fetches one chart payload per asset and normalizes it into the aligned
//! `PriceTable`. The upstream quote object is duck-typed (sometimes a
//! mapping with a spot price, sometimes missing entirely), so it is
//! collapsed into a `QuotePayload` tag here and nowhere else.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{AssetId, AssetSeries, PriceTable, QuotePayload};
use crate::providers::HistoryProvider;

pub struct ChartHistoryProvider {
    client: Client,
    base: String,
}

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: serde_json::Value,
    #[serde(default)]
    timestamp: Vec<u64>,
    indicators: ChartIndicators,
}

#[derive(Deserialize, Debug)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartHistoryProvider {
    pub fn new(base: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base,
        }
    }

    async fn fetch_one(&self, asset: &AssetId, lookback_days: u32) -> Result<(AssetSeries, QuotePayload)> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}d&interval=1d",
            self.base, asset, lookback_days
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("chart endpoint returned {} for {}", resp.status(), asset);
        }
        let envelope: ChartEnvelope = resp.json().await?;
        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| anyhow::anyhow!("empty chart result for {}", asset))?;

        let quote = normalize_quote(&result.meta);
        let closes = result
            .indicators
            .quote
            .first()
            .map(|q| q.close.as_slice())
            .unwrap_or(&[]);
        let points = result
            .timestamp
            .iter()
            .zip(closes.iter())
            .filter_map(|(ts, close)| close.map(|c| (*ts, c)))
            .collect();
        Ok((AssetSeries::from_points(points), quote))
    }
}

/// Collapses the duck-typed meta object into a tagged quote.
fn normalize_quote(meta: &serde_json::Value) -> QuotePayload {
    match meta.get("regularMarketPrice") {
        None => QuotePayload::Absent,
        Some(v) => match v.as_f64() {
            Some(p) if p.is_finite() && p > 0.0 => QuotePayload::Present(p),
            _ => QuotePayload::Malformed,
        },
    }
}

#[async_trait]
impl HistoryProvider for ChartHistoryProvider {
    async fn fetch(&self, assets: &[AssetId], lookback_days: u32) -> Result<PriceTable> {
        let fetches = assets.iter().map(|a| async move {
            let out = self.fetch_one(a, lookback_days).await;
            (a.clone(), out)
        });
        let mut table = PriceTable::default();
        for (asset, result) in join_all(fetches).await {
            match result {
                Ok((series, quote)) => {
                    log(
                        Level::Debug,
                        Domain::Market,
                        "history_fetched",
                        obj(&[("asset", v_str(&asset)), ("points", v_num(series.len() as f64))]),
                    );
                    if let Some(p) = quote.price() {
                        table.spot.insert(asset.clone(), p);
                    }
                    if !series.is_empty() {
                        table.series.insert(asset, series);
                    }
                }
                Err(err) => {
                    log(
                        Level::Warn,
                        Domain::Market,
                        "history_fetch_failed",
                        obj(&[("asset", v_str(&asset)), ("error", v_str(&err.to_string()))]),
                    );
                }
            }
        }
        if table.series.is_empty() && table.spot.is_empty() {
            anyhow::bail!("no historical data for any requested asset");
        }
        Ok(table)
    }
}
