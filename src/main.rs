use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use portsim::acquire::AcquisitionCoordinator;
use portsim::config::SimConfig;
use portsim::daily::DailyRefresher;
use portsim::events::EventInjector;
use portsim::logging::{log, obj, v_num, v_str, Domain, Level};
use portsim::providers::history::ChartHistoryProvider;
use portsim::providers::sentiment::HeadlineSentimentProvider;
use portsim::providers::{HistoryProvider, SentimentProvider};
use portsim::server::{self, AppContext};
use portsim::simulate::TurnSimulator;
use portsim::storage::PoolStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = SimConfig::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("config_hash", v_str(&cfg.config_hash())),
            ("bind_addr", v_str(&cfg.bind_addr)),
            ("max_turns", v_num(cfg.max_turns as f64)),
        ]),
    );

    let history: Arc<dyn HistoryProvider> =
        Arc::new(ChartHistoryProvider::new(cfg.market_data_base.clone()));
    let sentiment: Arc<dyn SentimentProvider> = Arc::new(HeadlineSentimentProvider::new(
        cfg.sentiment_base.clone(),
        cfg.sentiment_clamp,
    ));
    let coordinator = AcquisitionCoordinator::new(&cfg, Arc::clone(&history), sentiment);

    let mut store = PoolStore::new(&cfg.sqlite_path)?;
    store.init()?;
    let store = Arc::new(Mutex::new(store));
    let refresher = DailyRefresher::new(Arc::clone(&history), Arc::clone(&store), cfg.annualization);

    let ctx = Arc::new(AppContext {
        simulator: TurnSimulator::new(cfg.dt),
        injector: EventInjector::new(cfg.event_probability),
        coordinator,
        store,
        refresher,
        cfg: cfg.clone(),
    });

    let app = server::router(ctx);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    log(
        Level::Info,
        Domain::Http,
        "listening",
        obj(&[("addr", v_str(&cfg.bind_addr))]),
    );
    axum::serve(listener, app).await?;
    Ok(())
}
