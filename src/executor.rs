use crate::config::ExecutorConfig;
use crate::errors::{ConfigError, OrderRejectReason};
use crate::models::{
    AccountInfo, ExecutionOrder, Fill, Order, OrderAction, OrderStatus, Position,
};
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Execution venue contract. The orchestrator only talks to this trait;
/// a live broker adapter would implement the same surface.
pub trait OrderExecutor {
    /// Submits a batch. Each order resolves independently; a rejection
    /// never aborts the rest of the batch.
    fn submit_orders(&mut self, orders: &[Order]) -> Vec<ExecutionOrder>;
    fn get_order_status(&self, order_id: &str) -> Option<OrderStatus>;
    /// Cancels by id. In the simulation every order is already terminal,
    /// so every cancellation reports false.
    fn cancel_orders(&mut self, order_ids: &[String]) -> HashMap<String, bool>;
    fn get_positions(&self) -> HashMap<String, Position>;
    fn get_account_info(&self) -> AccountInfo;
}

/// Aggregate execution statistics for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub orders_submitted: usize,
    pub orders_filled: usize,
    pub orders_rejected: usize,
    pub total_commission: f64,
    pub total_traded_value: f64,
}

/// Simulated broker: fills market orders synchronously at the current
/// close, with adverse slippage and per-share commission.
#[derive(Debug)]
pub struct BacktestExecutor {
    config: ExecutorConfig,
    cash: f64,
    positions: HashMap<String, Position>,
    orders: HashMap<String, ExecutionOrder>,
    fills: Vec<Fill>,
    prices: HashMap<String, f64>,
    current_date: NaiveDate,
}

impl BacktestExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cash: config.initial_cash,
            config,
            positions: HashMap::new(),
            orders: HashMap::new(),
            fills: Vec::new(),
            prices: HashMap::new(),
            current_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        })
    }

    /// Replaces the full price map for the current simulation day.
    pub fn set_prices(&mut self, prices: HashMap<String, f64>) {
        self.prices = prices;
    }

    pub fn set_timestamp(&mut self, date: NaiveDate) {
        self.current_date = date;
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &ExecutionOrder> {
        self.orders.values()
    }

    /// Returns the executor to its initial state so the same instance can
    /// run another backtest.
    pub fn reset(&mut self) {
        self.cash = self.config.initial_cash;
        self.positions.clear();
        self.orders.clear();
        self.fills.clear();
        self.prices.clear();
    }

    pub fn performance_summary(&self) -> ExecutionSummary {
        let orders_filled = self
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Filled)
            .count();
        ExecutionSummary {
            orders_submitted: self.orders.len(),
            orders_filled,
            orders_rejected: self.orders.len() - orders_filled,
            total_commission: self.fills.iter().map(|fill| fill.commission).sum(),
            total_traded_value: self.fills.iter().map(Fill::value).sum(),
        }
    }

    fn commission_for(&self, shares: u64) -> f64 {
        let commission = shares as f64 * self.config.commission_per_share;
        commission.max(self.config.commission_min)
    }

    /// Slippage always moves the price against the trader.
    fn fill_price(&self, price: f64, action: OrderAction) -> f64 {
        match action {
            OrderAction::Buy => price * (1.0 + self.config.slippage_pct),
            OrderAction::Sell => price * (1.0 - self.config.slippage_pct),
        }
    }

    fn market_value_of(&self, position: &Position) -> f64 {
        // Positions with no quote today are carried at cost.
        let price = self
            .prices
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.avg_cost);
        position.shares as f64 * price
    }

    fn execute_one(&mut self, order: &Order) -> ExecutionOrder {
        let order_id = Uuid::new_v4().to_string()[..8].to_string();
        let mut execution = ExecutionOrder {
            order_id: order_id.clone(),
            order: order.clone(),
            status: OrderStatus::Submitted,
            filled_qty: 0,
            filled_avg_price: 0.0,
            commission: 0.0,
            submitted_at: self.current_date,
            filled_at: None,
            reject_reason: None,
        };

        let price = match self.prices.get(&order.symbol) {
            Some(price) if *price > 0.0 => *price,
            _ => {
                execution.status = OrderStatus::Rejected;
                execution.reject_reason = Some(OrderRejectReason::NoPriceAvailable {
                    symbol: order.symbol.clone(),
                });
                return execution;
            }
        };

        let fill_price = self.fill_price(price, order.action);
        let commission = self.commission_for(order.shares);

        match order.action {
            OrderAction::Buy => {
                let cost = order.shares as f64 * fill_price + commission;
                if cost > self.cash {
                    execution.status = OrderStatus::Rejected;
                    execution.reject_reason = Some(OrderRejectReason::InsufficientFunds {
                        needed: cost,
                        available: self.cash,
                    });
                    return execution;
                }
                self.cash -= cost;
                let position = self
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: order.symbol.clone(),
                        shares: 0,
                        avg_cost: 0.0,
                        market_value: 0.0,
                        unrealized_pnl: 0.0,
                        realized_pnl: 0.0,
                    });
                let old_basis = position.shares as f64 * position.avg_cost;
                let new_shares = position.shares + order.shares;
                position.avg_cost =
                    (old_basis + order.shares as f64 * fill_price) / new_shares as f64;
                position.shares = new_shares;
                self.record_fill(&order_id, order, fill_price, commission, None);
            }
            OrderAction::Sell => {
                let realized = match self.positions.get_mut(&order.symbol) {
                    Some(position) if position.shares >= order.shares => {
                        // Commission hits cash only, never the P&L of the lot.
                        let realized = order.shares as f64 * (fill_price - position.avg_cost);
                        position.shares -= order.shares;
                        position.realized_pnl += realized;
                        realized
                    }
                    held => {
                        execution.status = OrderStatus::Rejected;
                        execution.reject_reason = Some(OrderRejectReason::InsufficientShares {
                            requested: order.shares,
                            held: held.map(|position| position.shares).unwrap_or(0),
                        });
                        return execution;
                    }
                };
                self.cash += order.shares as f64 * fill_price - commission;
                if self.positions[&order.symbol].shares == 0 {
                    self.positions.remove(&order.symbol);
                }
                self.record_fill(&order_id, order, fill_price, commission, Some(realized));
            }
        }

        execution.status = OrderStatus::Filled;
        execution.filled_qty = order.shares;
        execution.filled_avg_price = fill_price;
        execution.commission = commission;
        execution.filled_at = Some(self.current_date);
        execution
    }

    fn record_fill(
        &mut self,
        order_id: &str,
        order: &Order,
        price: f64,
        commission: f64,
        realized_pnl: Option<f64>,
    ) {
        debug!(
            "{} {} {} @ {:.2} on {}",
            order.action.as_str(),
            order.shares,
            order.symbol,
            price,
            self.current_date
        );
        self.fills.push(Fill {
            order_id: order_id.to_string(),
            symbol: order.symbol.clone(),
            shares: order.shares,
            price,
            commission,
            date: self.current_date,
            realized_pnl,
        });
    }
}

impl OrderExecutor for BacktestExecutor {
    fn submit_orders(&mut self, orders: &[Order]) -> Vec<ExecutionOrder> {
        let mut executions = Vec::with_capacity(orders.len());
        for order in orders {
            let execution = self.execute_one(order);
            if execution.status == OrderStatus::Rejected {
                info!(
                    "Rejected {} {} {}: {}",
                    order.action.as_str(),
                    order.shares,
                    order.symbol,
                    execution
                        .reject_reason
                        .as_ref()
                        .map(|reason| reason.to_string())
                        .unwrap_or_default()
                );
            }
            self.orders
                .insert(execution.order_id.clone(), execution.clone());
            executions.push(execution);
        }
        executions
    }

    fn get_order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|order| order.status)
    }

    fn cancel_orders(&mut self, order_ids: &[String]) -> HashMap<String, bool> {
        order_ids
            .iter()
            .map(|order_id| (order_id.clone(), false))
            .collect()
    }

    fn get_positions(&self) -> HashMap<String, Position> {
        self.positions
            .iter()
            .map(|(symbol, position)| {
                let market_value = self.market_value_of(position);
                let mut position = position.clone();
                position.market_value = market_value;
                position.unrealized_pnl = market_value - position.cost_basis();
                (symbol.clone(), position)
            })
            .collect()
    }

    fn get_account_info(&self) -> AccountInfo {
        let positions_value: f64 = self
            .positions
            .values()
            .map(|position| self.market_value_of(position))
            .sum();
        AccountInfo {
            cash: self.cash,
            portfolio_value: self.cash + positions_value,
            buying_power: self.cash,
            positions_value,
            date: self.current_date,
        }
    }
}
