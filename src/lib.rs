pub mod allocator;
pub mod config;
pub mod errors;
pub mod executor;
pub mod market_data;
pub mod models;
pub mod orchestrator;
pub mod performance;
pub mod risk;
pub mod sweep;

pub use config::BacktestConfig;
pub use errors::BacktestError;
pub use models::BacktestResult;
pub use orchestrator::BacktestOrchestrator;
