use crate::config::AllocatorConfig;
use crate::errors::ConfigError;
use crate::models::{Order, OrderAction, PortfolioState, CASH_SYMBOL};
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Diagnostics computed alongside every allocation.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationMetrics {
    pub position_count: usize,
    pub cash_weight: f64,
    /// Gross value of the generated orders as a fraction of portfolio
    /// value; 0.0 for a worthless portfolio.
    pub turnover: f64,
    /// Herfindahl index of the non-cash weights; 0.0 when fully in cash.
    pub herfindahl_index: f64,
    pub strong_signal_count: usize,
    pub order_count: usize,
    pub buy_order_count: usize,
    pub sell_order_count: usize,
}

#[derive(Debug, Clone)]
pub struct AllocationResult {
    pub target_weights: HashMap<String, f64>,
    pub orders: Vec<Order>,
    pub metrics: AllocationMetrics,
}

/// Signal-proportional allocator: filters signals by strength, keeps the
/// strongest few and sizes them proportionally under a per-position cap.
#[derive(Debug, Clone)]
pub struct HeuristicAllocator {
    config: AllocatorConfig,
}

impl HeuristicAllocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Maps signal strengths to target weights. Weights sum to 1.0 with the
    /// uninvested remainder under the Cash key; a portfolio with no signal
    /// above the threshold is entirely Cash.
    pub fn calculate_target_weights(&self, signals: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut strong: Vec<(&str, f64)> = signals
            .iter()
            .filter(|(_, signal)| **signal > self.config.min_signal_threshold)
            .map(|(symbol, signal)| (symbol.as_str(), *signal))
            .collect();

        if strong.is_empty() {
            debug!(
                "No signals above threshold {:.2}; allocating fully to cash",
                self.config.min_signal_threshold
            );
            return HashMap::from([(CASH_SYMBOL.to_string(), 1.0)]);
        }

        // Strongest first; ties broken by symbol so runs are reproducible.
        strong.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        strong.truncate(self.config.max_positions);

        let total_signal: f64 = strong.iter().map(|(_, signal)| signal).sum();
        let investable = 1.0 - self.config.cash_buffer;

        let mut weights: HashMap<String, f64> = HashMap::new();
        let mut excess = 0.0;
        for (symbol, signal) in &strong {
            let raw = signal / total_signal * investable;
            if raw > self.config.max_position_size {
                excess += raw - self.config.max_position_size;
                weights.insert(symbol.to_string(), self.config.max_position_size);
            } else {
                weights.insert(symbol.to_string(), raw);
            }
        }

        // One redistribution pass, proportional to each uncapped symbol's
        // weight; anything still over the cap after it is clipped and left
        // in cash. A symbol sitting exactly on the cap gets nothing.
        if excess > 0.0 {
            let uncapped: Vec<String> = strong
                .iter()
                .map(|(symbol, _)| symbol.to_string())
                .filter(|symbol| weights[symbol] < self.config.max_position_size)
                .collect();
            let uncapped_total: f64 = uncapped.iter().map(|symbol| weights[symbol]).sum();
            if uncapped_total > 0.0 {
                for symbol in &uncapped {
                    let weight = weights[symbol] + weights[symbol] / uncapped_total * excess;
                    weights.insert(symbol.clone(), weight.min(self.config.max_position_size));
                }
            }
        }

        let invested: f64 = weights.values().sum();
        weights.insert(CASH_SYMBOL.to_string(), 1.0 - invested);
        weights
    }

    /// Turns the gap between current and target weights into whole-share
    /// orders. Sells come first so their proceeds fund the buys.
    pub fn generate_orders(
        &self,
        current_weights: &HashMap<String, f64>,
        target_weights: &HashMap<String, f64>,
        portfolio_value: f64,
        prices: &HashMap<String, f64>,
    ) -> Vec<Order> {
        let symbols: BTreeSet<&str> = current_weights
            .keys()
            .chain(target_weights.keys())
            .map(String::as_str)
            .filter(|symbol| *symbol != CASH_SYMBOL)
            .collect();

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for symbol in symbols {
            let current = current_weights.get(symbol).copied().unwrap_or(0.0);
            let target = target_weights.get(symbol).copied().unwrap_or(0.0);
            let diff_value = (target - current) * portfolio_value;
            if diff_value.abs() < self.config.min_trade_value {
                continue;
            }

            let price = match prices.get(symbol) {
                Some(price) if *price > 0.0 => *price,
                _ => {
                    debug!("No usable price for {}; skipping order", symbol);
                    continue;
                }
            };

            let shares = (diff_value.abs() / price) as u64;
            if shares == 0 {
                continue;
            }

            let order = Order {
                action: if diff_value > 0.0 {
                    OrderAction::Buy
                } else {
                    OrderAction::Sell
                },
                symbol: symbol.to_string(),
                shares,
                estimated_value: shares as f64 * price,
                reason: if diff_value > 0.0 {
                    format!("Increase position to {:.1}%", target * 100.0)
                } else {
                    format!("Reduce position to {:.1}%", target * 100.0)
                },
            };
            if order.action == OrderAction::Sell {
                sells.push(order);
            } else {
                buys.push(order);
            }
        }

        sells.extend(buys);
        sells
    }

    /// Full rebalance decision: target weights, the orders to reach them,
    /// and allocation diagnostics.
    pub fn allocate(
        &self,
        signals: &HashMap<String, f64>,
        portfolio: &PortfolioState,
    ) -> AllocationResult {
        let target_weights = self.calculate_target_weights(signals);
        let current_weights = self.current_weights(portfolio);
        let orders = self.generate_orders(
            &current_weights,
            &target_weights,
            portfolio.total_value,
            &portfolio.prices,
        );

        let metrics =
            self.build_metrics(signals, &target_weights, &orders, portfolio.total_value);
        info!(
            "Allocated {} positions, {:.1}% cash, {} orders",
            metrics.position_count,
            metrics.cash_weight * 100.0,
            metrics.order_count
        );

        AllocationResult {
            target_weights,
            orders,
            metrics,
        }
    }

    /// Whether any symbol has drifted from its target by more than the
    /// given weight tolerance.
    pub fn should_rebalance(
        &self,
        current_weights: &HashMap<String, f64>,
        target_weights: &HashMap<String, f64>,
        drift_threshold: f64,
    ) -> bool {
        let symbols: BTreeSet<&str> = current_weights
            .keys()
            .chain(target_weights.keys())
            .map(String::as_str)
            .collect();
        symbols.into_iter().any(|symbol| {
            let current = current_weights.get(symbol).copied().unwrap_or(0.0);
            let target = target_weights.get(symbol).copied().unwrap_or(0.0);
            (current - target).abs() > drift_threshold
        })
    }

    /// Current portfolio weights including Cash. A worthless portfolio is
    /// reported as all cash.
    pub fn current_weights(&self, portfolio: &PortfolioState) -> HashMap<String, f64> {
        if portfolio.total_value <= 0.0 {
            return HashMap::from([(CASH_SYMBOL.to_string(), 1.0)]);
        }
        let mut weights: HashMap<String, f64> = portfolio
            .positions
            .iter()
            .map(|(symbol, value)| (symbol.clone(), value / portfolio.total_value))
            .collect();
        weights.insert(
            CASH_SYMBOL.to_string(),
            portfolio.cash / portfolio.total_value,
        );
        weights
    }

    fn build_metrics(
        &self,
        signals: &HashMap<String, f64>,
        target_weights: &HashMap<String, f64>,
        orders: &[Order],
        total_value: f64,
    ) -> AllocationMetrics {
        let cash_weight = target_weights.get(CASH_SYMBOL).copied().unwrap_or(0.0);
        let position_count = target_weights
            .iter()
            .filter(|(symbol, weight)| symbol.as_str() != CASH_SYMBOL && **weight > 0.0)
            .count();

        let turnover = if total_value > 0.0 {
            orders
                .iter()
                .map(|order| order.estimated_value)
                .sum::<f64>()
                / total_value
        } else {
            0.0
        };

        let herfindahl_index = target_weights
            .iter()
            .filter(|(symbol, _)| symbol.as_str() != CASH_SYMBOL)
            .map(|(_, weight)| weight * weight)
            .sum();

        let buy_order_count = orders
            .iter()
            .filter(|order| order.action == OrderAction::Buy)
            .count();

        AllocationMetrics {
            position_count,
            cash_weight,
            turnover,
            herfindahl_index,
            strong_signal_count: signals
                .values()
                .filter(|signal| **signal > self.config.min_signal_threshold)
                .count(),
            order_count: orders.len(),
            buy_order_count,
            sell_order_count: orders.len() - buy_order_count,
        }
    }
}
