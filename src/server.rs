//! HTTP surface for the game backend.
//!
//! Thin handlers: validate the request, call into the pipeline, serialize
//! the result. The only client-correctable failure is an out-of-range asset
//! selection, rejected before any upstream call is made; everything else the
//! pipeline degrades through, so 5xx responses are rare by construction.

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::acquire::AcquisitionCoordinator;
use crate::config::SimConfig;
use crate::daily::DailyRefresher;
use crate::error::SimError;
use crate::events::EventInjector;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{AssetId, GameState, MarketEvent, MarketParameters};
use crate::simulate::{GaussianShocks, TurnOutcome, TurnSimulator};
use crate::storage::PoolStore;

pub struct AppContext {
    pub cfg: SimConfig,
    pub coordinator: AcquisitionCoordinator,
    pub simulator: TurnSimulator,
    pub injector: EventInjector,
    pub store: Arc<Mutex<PoolStore>>,
    pub refresher: DailyRefresher,
}

/// API error envelope. Maps the selection error to 400 and everything else
/// to 500, always with an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(SimError);

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(SimError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_user_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        log(
            Level::Warn,
            Domain::Http,
            "request_failed",
            obj(&[
                ("status", v_num(status.as_u16() as f64)),
                ("error", v_str(&self.0.to_string())),
            ]),
        );
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Json extractor that keeps body-parse failures inside the error envelope
/// instead of axum's plain-text rejection.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(SimError::MalformedRequest {
                reason: rejection.body_text(),
            })),
        }
    }
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub assets: Vec<AssetId>,
}

#[derive(Serialize)]
pub struct StartResponse {
    #[serde(flatten)]
    pub state: GameState,
    /// Echoed so the client can post them back on every turn.
    pub simulation_parameters: MarketParameters,
}

#[derive(Deserialize)]
pub struct NextTurnRequest {
    pub simulation_parameters: MarketParameters,
    pub allocation: HashMap<AssetId, f64>,
    pub portfolio_value: f64,
    pub turn: u32,
}

#[derive(Serialize)]
pub struct NextTurnResponse {
    pub turn: u32,
    pub new_value: f64,
    pub drifted_allocation: HashMap<AssetId, f64>,
    pub prices: HashMap<AssetId, f64>,
    pub event: Option<MarketEvent>,
    pub bankrupt: bool,
    pub game_over: bool,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/start_simulation", post(start_simulation))
        .route("/next_turn", post(next_turn))
        .route("/generate_daily_market", post(generate_daily_market))
        .route("/daily_assets", get(daily_assets))
        .route("/health", get(health))
        .with_state(ctx)
}

async fn start_simulation(
    State(ctx): State<Arc<AppContext>>,
    ApiJson(req): ApiJson<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let n = req.assets.len();
    if n < ctx.cfg.min_assets || n > ctx.cfg.max_assets {
        return Err(SimError::InvalidSelection {
            min: ctx.cfg.min_assets,
            max: ctx.cfg.max_assets,
        }
        .into());
    }
    log(
        Level::Info,
        Domain::Http,
        "start_simulation",
        obj(&[("assets", v_str(&req.assets.join(",")))]),
    );
    let params = ctx.coordinator.acquire(&req.assets).await;
    let state = GameState::new(&params, ctx.cfg.max_turns, ctx.cfg.starting_cash);
    Ok(Json(StartResponse { state, simulation_parameters: params }))
}

async fn next_turn(
    State(ctx): State<Arc<AppContext>>,
    ApiJson(req): ApiJson<NextTurnRequest>,
) -> Result<Json<NextTurnResponse>, ApiError> {
    let params = &req.simulation_parameters;
    let mut shocks = GaussianShocks::new(StdRng::from_entropy());
    let outcome = ctx.simulator.step(params, &req.allocation, req.portfolio_value, &mut shocks);

    let turn = req.turn + 1;
    let (new_value, drifted_allocation, prices, bankrupt) = match outcome {
        TurnOutcome::Step { value, returns, prices } => {
            let weights: Vec<f64> = params
                .order
                .iter()
                .map(|a| req.allocation.get(a).copied().unwrap_or(0.0).max(0.0))
                .collect();
            let grown: Vec<f64> = params
                .order
                .iter()
                .zip(weights.iter())
                .map(|(a, w)| w * (1.0 + returns.get(a).copied().unwrap_or(0.0)))
                .collect();
            let total: f64 = grown.iter().sum();
            let drifted = params
                .order
                .iter()
                .zip(grown.iter())
                .map(|(a, g)| (a.clone(), if total > 0.0 { g / total } else { 0.0 }))
                .collect();
            (value, drifted, prices, false)
        }
        TurnOutcome::Bankrupt { value } => (value, HashMap::new(), HashMap::new(), true),
    };

    let event = if bankrupt {
        None
    } else {
        let mut rng = StdRng::from_entropy();
        ctx.injector.roll(&mut rng)
    };
    let game_over = bankrupt || turn >= ctx.cfg.max_turns;

    log(
        Level::Info,
        Domain::Http,
        "next_turn",
        obj(&[
            ("turn", v_num(turn as f64)),
            ("new_value", v_num(new_value)),
            ("bankrupt", json!(bankrupt)),
        ]),
    );
    Ok(Json(NextTurnResponse {
        turn,
        new_value,
        drifted_allocation,
        prices,
        event,
        bankrupt,
        game_over,
    }))
}

async fn generate_daily_market(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = ctx.refresher.refresh().await;
    Ok(Json(json!({ "success": true, "count": count })))
}

async fn daily_assets(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let latest = ctx.store.lock().await.load_latest().map_err(anyhow::Error::from)?;
    let body = match latest {
        Some((date, assets)) => json!({ "date": date, "assets": assets }),
        None => json!({ "date": null, "assets": [] }),
    };
    Ok(Json(body))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetSeries, PriceTable, SentimentSignal};
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    struct OfflineHistory;

    #[async_trait]
    impl crate::providers::HistoryProvider for OfflineHistory {
        async fn fetch(&self, _assets: &[AssetId], _lookback_days: u32) -> Result<PriceTable> {
            anyhow::bail!("offline")
        }
    }

    struct StubHistory;

    #[async_trait]
    impl crate::providers::HistoryProvider for StubHistory {
        async fn fetch(&self, assets: &[AssetId], _lookback_days: u32) -> Result<PriceTable> {
            let mut table = PriceTable::default();
            for (i, a) in assets.iter().enumerate() {
                let base = 100.0 + i as f64;
                let points = (0..30).map(|t| (t as u64, base + (t % 3) as f64)).collect();
                table.series.insert(a.clone(), AssetSeries::from_points(points));
                table.spot.insert(a.clone(), base);
            }
            Ok(table)
        }
    }

    struct OfflineSentiment;

    #[async_trait]
    impl crate::providers::SentimentProvider for OfflineSentiment {
        async fn fetch(&self, _asset: &AssetId) -> Result<SentimentSignal> {
            anyhow::bail!("offline")
        }
    }

    fn context(online: bool) -> Arc<AppContext> {
        let mut cfg = SimConfig::from_env();
        cfg.history_timeout_ms = 500;
        cfg.sentiment_timeout_ms = 200;
        let history: Arc<dyn crate::providers::HistoryProvider> = if online {
            Arc::new(StubHistory)
        } else {
            Arc::new(OfflineHistory)
        };
        let sentiment = Arc::new(OfflineSentiment);
        let coordinator =
            AcquisitionCoordinator::new(&cfg, Arc::clone(&history), sentiment);

        let file = NamedTempFile::new().unwrap();
        let mut store = PoolStore::new(file.path().to_str().unwrap()).unwrap();
        store.init().unwrap();
        // Keep the backing file alive for the test process.
        std::mem::forget(file);
        let store = Arc::new(Mutex::new(store));
        let refresher =
            DailyRefresher::new(Arc::clone(&history), Arc::clone(&store), cfg.annualization);

        Arc::new(AppContext {
            simulator: TurnSimulator::new(cfg.dt),
            injector: EventInjector::new(cfg.event_probability),
            coordinator,
            store,
            refresher,
            cfg,
        })
    }

    fn assets(names: &[&str]) -> Vec<AssetId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_rejects_bad_selection_sizes() {
        let ctx = context(false);
        for bad in [vec![], assets(&["A"]), assets(&["A", "B", "C", "D", "E", "F"])] {
            let out =
                start_simulation(State(Arc::clone(&ctx)), ApiJson(StartRequest { assets: bad }))
                    .await;
            match out {
                Err(ApiError(err)) => assert!(err.is_user_error()),
                Ok(_) => panic!("selection should have been rejected"),
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/start_simulation")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        match ApiJson::<StartRequest>::from_request(req, &()).await {
            Err(ApiError(err)) => {
                assert!(err.is_user_error());
                assert!(err.to_string().starts_with("malformed request"));
            }
            Ok(_) => panic!("garbage body should be rejected"),
        }

        let response = ApiError(SimError::MalformedRequest { reason: "bad".to_string() })
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_offline_returns_defaulted_state() {
        let ctx = context(false);
        let req = StartRequest { assets: assets(&["AAPL", "MSFT", "GOOG"]) };
        let Json(resp) = start_simulation(State(ctx), ApiJson(req)).await.unwrap();
        assert_eq!(resp.state.turn, 0);
        assert_eq!(resp.state.max_turns, 20);
        assert_eq!(resp.state.cash, 1_000_000.0);
        assert_eq!(resp.state.portfolio.len(), 3);
        let h = &resp.state.portfolio["AAPL"];
        assert_eq!(h.shares, 0.0);
        assert_eq!(h.price, 150.0);
        assert_eq!(h.sigma, 0.25);
        assert!(!resp.simulation_parameters.has_real_data);
    }

    #[tokio::test]
    async fn test_start_online_uses_fetched_prices() {
        let ctx = context(true);
        let req = StartRequest { assets: assets(&["AAPL", "MSFT", "GOOG"]) };
        let Json(resp) = start_simulation(State(ctx), ApiJson(req)).await.unwrap();
        assert!(resp.simulation_parameters.has_real_data);
        assert_eq!(resp.state.portfolio["AAPL"].price, 100.0);
        assert_eq!(resp.state.correlation_matrix.len(), 3);
    }

    #[tokio::test]
    async fn test_next_turn_advances_and_reallocates() {
        let ctx = context(false);
        let order = assets(&["A", "B", "C"]);
        let params = MarketParameters {
            order: order.clone(),
            price: order.iter().map(|a| (a.clone(), 150.0)).collect(),
            mu: order.iter().map(|a| (a.clone(), 0.05)).collect(),
            sigma: order.iter().map(|a| (a.clone(), 0.01)).collect(),
            narrative: order.iter().map(|a| (a.clone(), String::new())).collect(),
            correlation: crate::math::identity(3),
            has_real_data: false,
        };
        let allocation: HashMap<AssetId, f64> =
            order.iter().map(|a| (a.clone(), 1.0 / 3.0)).collect();
        let req = NextTurnRequest {
            simulation_parameters: params,
            allocation,
            portfolio_value: 1_000_000.0,
            turn: 0,
        };
        let Json(resp) = next_turn(State(ctx), ApiJson(req)).await.unwrap();
        assert_eq!(resp.turn, 1);
        assert!(!resp.bankrupt);
        assert!(!resp.game_over);
        assert!(resp.new_value > 0.0);
        let weight_sum: f64 = resp.drifted_allocation.values().sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_last_turn_sets_game_over() {
        let ctx = context(false);
        let order = assets(&["A", "B", "C"]);
        let params = MarketParameters {
            order: order.clone(),
            price: order.iter().map(|a| (a.clone(), 150.0)).collect(),
            mu: order.iter().map(|a| (a.clone(), 0.0)).collect(),
            sigma: order.iter().map(|a| (a.clone(), 0.0)).collect(),
            narrative: order.iter().map(|a| (a.clone(), String::new())).collect(),
            correlation: crate::math::identity(3),
            has_real_data: false,
        };
        let allocation: HashMap<AssetId, f64> =
            order.iter().map(|a| (a.clone(), 1.0 / 3.0)).collect();
        let req = NextTurnRequest {
            simulation_parameters: params,
            allocation,
            portfolio_value: 500.0,
            turn: 19,
        };
        let Json(resp) = next_turn(State(ctx), ApiJson(req)).await.unwrap();
        assert_eq!(resp.turn, 20);
        assert!(resp.game_over);
        assert_eq!(resp.new_value, 500.0);
        // Equal returns leave the allocation unchanged.
        for w in resp.drifted_allocation.values() {
            assert!((w - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_daily_assets_empty_then_refreshed() {
        let ctx = context(true);
        let Json(empty) = daily_assets(State(Arc::clone(&ctx))).await.unwrap();
        assert!(empty["date"].is_null());
        assert_eq!(empty["assets"].as_array().unwrap().len(), 0);

        let Json(gen) = generate_daily_market(State(Arc::clone(&ctx))).await.unwrap();
        assert_eq!(gen["success"], true);
        assert!(gen["count"].as_u64().unwrap() > 0);

        let Json(full) = daily_assets(State(ctx)).await.unwrap();
        assert!(full["date"].is_string());
        assert!(!full["assets"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
