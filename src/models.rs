use crate::config::BacktestConfig;
use crate::errors::OrderRejectReason;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Symbol used for the uninvested remainder in weight maps.
pub const CASH_SYMBOL: &str = "Cash";

/// One daily OHLCV bar. Only the close is consulted by the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Buy => "BUY",
            OrderAction::Sell => "SELL",
        }
    }
}

/// A rebalancing order produced by the allocator and consumed immediately
/// by the executor. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub action: OrderAction,
    pub symbol: String,
    pub shares: u64,
    pub estimated_value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

/// Execution record for a submitted order. In the simulated mode an order
/// resolves synchronously to exactly one terminal status: Filled or Rejected.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOrder {
    pub order_id: String,
    pub order: Order,
    pub status: OrderStatus,
    pub filled_qty: u64,
    pub filled_avg_price: f64,
    pub commission: f64,
    pub submitted_at: NaiveDate,
    pub filled_at: Option<NaiveDate>,
    pub reject_reason: Option<OrderRejectReason>,
}

impl ExecutionOrder {
    pub fn remaining_qty(&self) -> u64 {
        self.order.shares - self.filled_qty
    }
}

/// A single complete execution. The backtest executor never fills partially.
#[derive(Debug, Clone, Serialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub shares: u64,
    pub price: f64,
    pub commission: f64,
    pub date: NaiveDate,
    /// Realized P&L booked by this fill; only set on sells.
    pub realized_pnl: Option<f64>,
}

impl Fill {
    pub fn value(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

/// Current holding in one symbol. Created on the first buy fill, deleted
/// when shares reach exactly zero.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub shares: u64,
    pub avg_cost: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn cost_basis(&self) -> f64 {
        self.shares as f64 * self.avg_cost
    }
}

/// Account snapshot, always derived on demand from current cash, positions
/// and prices. Never cached across price updates.
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub cash: f64,
    pub portfolio_value: f64,
    pub buying_power: f64,
    pub positions_value: f64,
    pub date: NaiveDate,
}

/// Portfolio state handed to the allocator, rebuilt fresh each rebalance
/// day from the executor's live account and positions.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    /// Holdings as dollar values.
    pub positions: HashMap<String, f64>,
    pub cash: f64,
    pub total_value: f64,
    pub prices: HashMap<String, f64>,
    pub date: NaiveDate,
}

/// One filled order in the trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub action: OrderAction,
    pub shares: u64,
    pub price: f64,
    pub commission: f64,
    /// Realized P&L for sells, absent for buys.
    pub realized_pnl: Option<f64>,
}

/// One point of the daily equity curve, recorded for every trading day
/// whether or not a rebalance happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub cash: f64,
    pub positions_value: f64,
}

/// Immutable summary produced once at the end of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub config: BacktestConfig,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: Option<f64>,
    pub num_trades: usize,
    pub num_winning_trades: usize,
    pub num_losing_trades: usize,
    pub win_rate: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub daily_returns: Vec<f64>,
    pub created_at: DateTime<Utc>,
}
