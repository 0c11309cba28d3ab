pub mod acquire;
pub mod config;
pub mod daily;
pub mod error;
pub mod estimator;
pub mod events;
pub mod logging;
pub mod math;
pub mod model;
pub mod providers;
pub mod server;
pub mod simulate;
pub mod storage;
