use crate::allocator::HeuristicAllocator;
use crate::config::{BacktestConfig, RebalanceFrequency};
use crate::errors::BacktestError;
use crate::executor::{BacktestExecutor, OrderExecutor};
use crate::market_data::{MarketData, SignalData, SignalSource};
use crate::models::{
    BacktestResult, EquityPoint, OrderStatus, PortfolioState, TradeRecord,
};
use crate::performance;
use crate::risk::{BasicRiskValidator, RiskAction, RiskValidator};
use chrono::{Datelike, IsoWeek, NaiveDate};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drives one simulated run day by day: signals in, allocation, risk
/// check, order execution, daily equity snapshot.
pub struct BacktestOrchestrator {
    config: BacktestConfig,
    allocator: HeuristicAllocator,
    risk: Box<dyn RiskValidator + Send>,
    executor: BacktestExecutor,
    cancel: Option<Arc<AtomicBool>>,
}

impl BacktestOrchestrator {
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        let allocator = HeuristicAllocator::new(config.allocator_config())?;
        let risk = Box::new(BasicRiskValidator::new(config.risk_config())?);
        let executor = BacktestExecutor::new(config.executor_config())?;
        Ok(Self {
            config,
            allocator,
            risk,
            executor,
            cancel: None,
        })
    }

    /// Swaps in a different risk validator, for callers with their own
    /// rule set.
    pub fn with_risk_validator(mut self, risk: Box<dyn RiskValidator + Send>) -> Self {
        self.risk = risk;
        self
    }

    /// Installs a cancellation flag checked between day-steps. Cancelling
    /// aborts the run with no partial result.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Generates signals through the source, then runs the backtest.
    pub fn run_with_source(
        &mut self,
        data: &MarketData,
        source: &dyn SignalSource,
    ) -> Result<BacktestResult, BacktestError> {
        let signals = SignalData::from_source(data, source);
        self.run(data, &signals)
    }

    pub fn run(
        &mut self,
        data: &MarketData,
        signals: &SignalData,
    ) -> Result<BacktestResult, BacktestError> {
        if data.is_empty() {
            return Err(BacktestError::EmptyPriceData);
        }
        let dates = data.trading_dates();
        if dates.len() < 2 {
            return Err(BacktestError::TooFewTradingDays(dates.len()));
        }

        self.executor.reset();
        let rebalance_dates = rebalance_dates(&dates, self.config.rebalance_frequency);
        info!(
            "Starting backtest: {} trading days from {} to {}, {} rebalances",
            dates.len(),
            dates[0],
            dates[dates.len() - 1],
            rebalance_dates.len()
        );

        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(dates.len());
        let mut trades: Vec<TradeRecord> = Vec::new();

        for (completed, date) in dates.iter().enumerate() {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    warn!("Backtest cancelled on {}", date);
                    return Err(BacktestError::Cancelled {
                        completed,
                        total: dates.len(),
                    });
                }
            }

            let prices = data.closes_on(*date);
            if prices.is_empty() {
                debug!("No prices on {}; skipping day", date);
                continue;
            }
            self.executor.set_timestamp(*date);
            self.executor.set_prices(prices.clone());

            if rebalance_dates.contains(date) {
                self.rebalance(*date, &prices, signals, &mut trades);
            }

            let account = self.executor.get_account_info();
            equity_curve.push(EquityPoint {
                date: *date,
                portfolio_value: account.portfolio_value,
                cash: account.cash,
                positions_value: account.positions_value,
            });
        }

        let result = performance::build_result(self.config.clone(), equity_curve, trades);
        info!(
            "Backtest finished: total return {:.2}%, max drawdown {:.2}%, {} trades",
            result.total_return_pct,
            result.max_drawdown * 100.0,
            result.num_trades
        );
        Ok(result)
    }

    fn rebalance(
        &mut self,
        date: NaiveDate,
        prices: &HashMap<String, f64>,
        signals: &SignalData,
        trades: &mut Vec<TradeRecord>,
    ) {
        let day_signals = signals.signals_on(date);
        if day_signals.is_empty() {
            debug!("No signals on {}; holding current portfolio", date);
            return;
        }

        let portfolio = self.portfolio_state(date, prices);
        let allocation = self.allocator.allocate(&day_signals, &portfolio);
        let check = self.risk.validate_weights(&allocation.target_weights, &portfolio);

        let target_weights = match check.action {
            RiskAction::Approve => allocation.target_weights,
            RiskAction::Adjust => check
                .adjusted_weights
                .unwrap_or(allocation.target_weights),
            RiskAction::Reject => {
                warn!("Risk validator rejected rebalance on {}: {}", date, check.message);
                return;
            }
        };

        let current_weights = self.allocator.current_weights(&portfolio);
        let orders = self.allocator.generate_orders(
            &current_weights,
            &target_weights,
            portfolio.total_value,
            prices,
        );
        if orders.is_empty() {
            return;
        }

        let executions = self.executor.submit_orders(&orders);
        for execution in executions {
            if execution.status == OrderStatus::Filled {
                trades.push(TradeRecord {
                    date,
                    symbol: execution.order.symbol.clone(),
                    action: execution.order.action,
                    shares: execution.filled_qty,
                    price: execution.filled_avg_price,
                    commission: execution.commission,
                    realized_pnl: self
                        .executor
                        .fills()
                        .iter()
                        .rev()
                        .find(|fill| fill.order_id == execution.order_id)
                        .and_then(|fill| fill.realized_pnl),
                });
            }
        }
    }

    /// Snapshot of the live account in the shape the allocator consumes,
    /// positions as dollar values.
    fn portfolio_state(&self, date: NaiveDate, prices: &HashMap<String, f64>) -> PortfolioState {
        let account = self.executor.get_account_info();
        let positions = self
            .executor
            .get_positions()
            .into_iter()
            .map(|(symbol, position)| (symbol, position.market_value))
            .collect();
        PortfolioState {
            positions,
            cash: account.cash,
            total_value: account.portfolio_value,
            prices: prices.clone(),
            date,
        }
    }
}

/// Selects which trading dates trigger a rebalance. Weekly and monthly
/// pick the first trading date in each period, so holiday-shifted weeks
/// still rebalance exactly once.
pub fn rebalance_dates(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Vec<NaiveDate> {
    match frequency {
        RebalanceFrequency::Daily => dates.to_vec(),
        RebalanceFrequency::Weekly => {
            first_per_bucket(dates, |date| {
                let week: IsoWeek = date.iso_week();
                (week.year(), week.week())
            })
        }
        RebalanceFrequency::Monthly => {
            first_per_bucket(dates, |date| (date.year(), date.month()))
        }
    }
}

fn first_per_bucket<K: PartialEq>(
    dates: &[NaiveDate],
    key: impl Fn(&NaiveDate) -> K,
) -> Vec<NaiveDate> {
    let mut selected = Vec::new();
    let mut previous: Option<K> = None;
    for date in dates {
        let bucket = key(date);
        if previous.as_ref() != Some(&bucket) {
            selected.push(*date);
            previous = Some(bucket);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        text.parse().unwrap()
    }

    #[test]
    fn daily_rebalances_every_trading_day() {
        let dates = vec![date("2024-01-02"), date("2024-01-03"), date("2024-01-04")];
        assert_eq!(
            rebalance_dates(&dates, RebalanceFrequency::Daily),
            dates
        );
    }

    #[test]
    fn weekly_picks_first_trading_day_of_each_week() {
        // 2024-01-01 is a Monday holiday, so that week starts Tuesday.
        let dates = vec![
            date("2024-01-02"),
            date("2024-01-03"),
            date("2024-01-04"),
            date("2024-01-05"),
            date("2024-01-08"),
            date("2024-01-09"),
        ];
        assert_eq!(
            rebalance_dates(&dates, RebalanceFrequency::Weekly),
            vec![date("2024-01-02"), date("2024-01-08")]
        );
    }

    #[test]
    fn weekly_buckets_span_year_boundary() {
        // 2024-12-30 and 2025-01-02 share ISO week 1 of 2025.
        let dates = vec![date("2024-12-30"), date("2025-01-02"), date("2025-01-06")];
        assert_eq!(
            rebalance_dates(&dates, RebalanceFrequency::Weekly),
            vec![date("2024-12-30"), date("2025-01-06")]
        );
    }

    #[test]
    fn monthly_picks_first_trading_day_of_each_month() {
        let dates = vec![
            date("2024-01-02"),
            date("2024-01-31"),
            date("2024-02-01"),
            date("2024-02-15"),
            date("2025-02-03"),
        ];
        assert_eq!(
            rebalance_dates(&dates, RebalanceFrequency::Monthly),
            vec![date("2024-01-02"), date("2024-02-01"), date("2025-02-03")]
        );
    }
}
