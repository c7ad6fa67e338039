use crate::errors::ConfigError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How often the orchestrator rebalances, computed from the trading dates
/// actually present in the data rather than the wall calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Parameters of the heuristic allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Signals must be strictly greater than this to be considered.
    pub min_signal_threshold: f64,
    pub max_positions: usize,
    /// Fraction of the portfolio deliberately held uninvested.
    pub cash_buffer: f64,
    /// Maximum weight for a single position.
    pub max_position_size: f64,
    /// Dollar differences below this generate no order.
    pub min_trade_value: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_signal_threshold: 0.3,
            max_positions: 10,
            cash_buffer: 0.10,
            max_position_size: 0.20,
            min_trade_value: 100.0,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_signal_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                name: "min_signal_threshold",
                value: self.min_signal_threshold,
            });
        }
        if self.max_positions < 1 {
            return Err(ConfigError::InvalidMaxPositions(self.max_positions));
        }
        if !(0.0..1.0).contains(&self.cash_buffer) {
            return Err(ConfigError::InvalidCashBuffer(self.cash_buffer));
        }
        if !(self.max_position_size > 0.0 && self.max_position_size <= 1.0) {
            return Err(ConfigError::InvalidMaxPositionSize(self.max_position_size));
        }
        if self.min_trade_value < 0.0 {
            return Err(ConfigError::NegativeValue {
                name: "min_trade_value",
                value: self.min_trade_value,
            });
        }
        Ok(())
    }
}

/// Parameters of the simulated execution venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub initial_cash: f64,
    /// Slippage as a fraction of price; always applied against the trader.
    pub slippage_pct: f64,
    pub commission_per_share: f64,
    /// Minimum commission per filled order.
    pub commission_min: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            slippage_pct: 0.001,
            commission_per_share: 0.0,
            commission_min: 0.0,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_cash <= 0.0 {
            return Err(ConfigError::NonPositiveInitialCash(self.initial_cash));
        }
        if self.slippage_pct < 0.0 {
            return Err(ConfigError::NegativeValue {
                name: "slippage_pct",
                value: self.slippage_pct,
            });
        }
        if self.commission_per_share < 0.0 {
            return Err(ConfigError::NegativeValue {
                name: "commission_per_share",
                value: self.commission_per_share,
            });
        }
        if self.commission_min < 0.0 {
            return Err(ConfigError::NegativeValue {
                name: "commission_min",
                value: self.commission_min,
            });
        }
        Ok(())
    }
}

/// Risk-rule parameters for the basic validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_position_size: f64,
    pub max_total_exposure: f64,
    pub min_cash_reserve: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.20,
            max_total_exposure: 0.90,
            min_cash_reserve: 0.05,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_position_size > 0.0 && self.max_position_size <= 1.0) {
            return Err(ConfigError::InvalidMaxPositionSize(self.max_position_size));
        }
        if !(self.max_total_exposure > 0.0 && self.max_total_exposure <= 1.0) {
            return Err(ConfigError::InvalidMaxTotalExposure(self.max_total_exposure));
        }
        if !(0.0..1.0).contains(&self.min_cash_reserve) {
            return Err(ConfigError::InvalidMinCashReserve(self.min_cash_reserve));
        }
        if self.max_total_exposure + self.min_cash_reserve > 1.0 {
            return Err(ConfigError::ExposureReserveConflict {
                exposure: self.max_total_exposure,
                reserve: self.min_cash_reserve,
            });
        }
        Ok(())
    }
}

/// Top-level configuration for one backtest run. A snapshot of this struct
/// is embedded in the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub slippage_pct: f64,
    pub commission_per_share: f64,
    pub commission_min: f64,
    pub rebalance_frequency: RebalanceFrequency,
    pub min_signal_threshold: f64,
    pub max_positions: usize,
    pub max_position_size: f64,
    pub cash_buffer: f64,
    pub min_trade_value: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            slippage_pct: 0.001,
            commission_per_share: 0.0,
            commission_min: 0.0,
            rebalance_frequency: RebalanceFrequency::Daily,
            min_signal_threshold: 0.3,
            max_positions: 10,
            max_position_size: 0.25,
            cash_buffer: 0.05,
            min_trade_value: 100.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.executor_config().validate()?;
        self.allocator_config().validate()?;
        self.risk_config().validate()?;
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            initial_cash: self.initial_cash,
            slippage_pct: self.slippage_pct,
            commission_per_share: self.commission_per_share,
            commission_min: self.commission_min,
        }
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            min_signal_threshold: self.min_signal_threshold,
            max_positions: self.max_positions,
            cash_buffer: self.cash_buffer,
            max_position_size: self.max_position_size,
            min_trade_value: self.min_trade_value,
        }
    }

    /// Risk rules derived from the run parameters: the validator enforces
    /// the same position cap and keeps the cash buffer as reserve.
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_position_size: self.max_position_size,
            max_total_exposure: 1.0 - self.cash_buffer,
            min_cash_reserve: self.cash_buffer,
        }
    }
}
