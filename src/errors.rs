use serde::Serialize;
use thiserror::Error;

/// Invalid construction parameters. Raised eagerly when a component is
/// built, never mid-run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial_cash must be positive, got {0}")]
    NonPositiveInitialCash(f64),
    #[error("{name} must be non-negative, got {value}")]
    NegativeValue { name: &'static str, value: f64 },
    #[error("{name} must be in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
    #[error("cash_buffer must be in [0, 1), got {0}")]
    InvalidCashBuffer(f64),
    #[error("max_position_size must be in (0, 1], got {0}")]
    InvalidMaxPositionSize(f64),
    #[error("max_total_exposure must be in (0, 1], got {0}")]
    InvalidMaxTotalExposure(f64),
    #[error("min_cash_reserve must be in [0, 1), got {0}")]
    InvalidMinCashReserve(f64),
    #[error("max_total_exposure ({exposure}) + min_cash_reserve ({reserve}) cannot exceed 1.0")]
    ExposureReserveConflict { exposure: f64, reserve: f64 },
    #[error("max_positions must be >= 1, got {0}")]
    InvalidMaxPositions(usize),
}

/// Per-order rejection. Recorded on the execution order and excluded from
/// fills; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum OrderRejectReason {
    #[error("no price available for {symbol}")]
    NoPriceAvailable { symbol: String },
    #[error("insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("insufficient shares: need {requested}, have {held}")]
    InsufficientShares { requested: u64, held: u64 },
}

/// Fatal run-level failures, propagated to the caller with no partial result.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("price data cannot be empty")]
    EmptyPriceData,
    #[error("need at least 2 trading days for a backtest, found {0}")]
    TooFewTradingDays(usize),
    #[error("backtest cancelled after {completed} of {total} trading days")]
    Cancelled { completed: usize, total: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
