use crate::config::BacktestConfig;
use crate::models::{BacktestResult, EquityPoint, TradeRecord};
use chrono::Utc;
use statrs::statistics::Statistics;
use uuid::Uuid;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Builds the final result from the equity curve and trade log.
pub fn build_result(
    config: BacktestConfig,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<TradeRecord>,
) -> BacktestResult {
    let initial_value = config.initial_cash;
    let final_value = equity_curve
        .last()
        .map(|point| point.portfolio_value)
        .unwrap_or(initial_value);
    let start_date = equity_curve.first().map(|point| point.date);
    let end_date = equity_curve.last().map(|point| point.date);

    let daily_returns = daily_returns(&equity_curve);
    let total_return = (final_value - initial_value) / initial_value;
    let calendar_days = match (start_date, end_date) {
        (Some(start), Some(end)) => (end - start).num_days(),
        _ => 0,
    };

    let num_trades = trades.len();
    // Break-even sells are undecided and stay out of the win rate.
    let decided: Vec<f64> = trades
        .iter()
        .filter_map(|trade| trade.realized_pnl)
        .filter(|pnl| *pnl != 0.0)
        .collect();
    let num_winning_trades = decided.iter().filter(|pnl| **pnl > 0.0).count();
    let num_losing_trades = decided.iter().filter(|pnl| **pnl < 0.0).count();
    let win_rate = if decided.is_empty() {
        0.0
    } else {
        num_winning_trades as f64 / decided.len() as f64
    };

    BacktestResult {
        id: Uuid::new_v4().to_string(),
        start_date: start_date.unwrap_or_else(|| Utc::now().date_naive()),
        end_date: end_date.unwrap_or_else(|| Utc::now().date_naive()),
        initial_value,
        final_value,
        total_return,
        total_return_pct: total_return * 100.0,
        annualized_return: annualized_return(total_return, calendar_days),
        max_drawdown: max_drawdown(&daily_returns),
        sharpe_ratio: sharpe_ratio(&daily_returns),
        num_trades,
        num_winning_trades,
        num_losing_trades,
        win_rate,
        equity_curve,
        trades,
        daily_returns,
        created_at: Utc::now(),
        config,
    }
}

/// Day-over-day percentage changes of portfolio value. One element shorter
/// than the equity curve.
pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|pair| {
            if pair[0].portfolio_value > 0.0 {
                (pair[1].portfolio_value - pair[0].portfolio_value) / pair[0].portfolio_value
            } else {
                0.0
            }
        })
        .collect()
}

/// Geometric annualization over calendar days. Zero when the span is empty.
pub fn annualized_return(total_return: f64, calendar_days: i64) -> f64 {
    if calendar_days <= 0 {
        return 0.0;
    }
    (1.0 + total_return).powf(365.0 / calendar_days as f64) - 1.0
}

/// Largest peak-to-trough decline of the compounded return path, as a
/// positive fraction.
pub fn max_drawdown(daily_returns: &[f64]) -> f64 {
    let mut cumulative = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for daily in daily_returns {
        cumulative *= 1.0 + daily;
        peak = peak.max(cumulative);
        worst = worst.min(cumulative / peak - 1.0);
    }
    worst.abs()
}

/// Annualized Sharpe ratio at a 0% risk-free rate. Absent when returns
/// have no variance.
pub fn sharpe_ratio(daily_returns: &[f64]) -> Option<f64> {
    if daily_returns.len() < 2 {
        return None;
    }
    let mean = daily_returns.mean();
    let std_dev = daily_returns.std_dev();
    if std_dev == 0.0 || std_dev.is_nan() {
        return None;
    }
    Some(mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderAction;
    use chrono::NaiveDate;

    const EPSILON: f64 = 1e-9;

    fn point(date: &str, value: f64) -> EquityPoint {
        EquityPoint {
            date: date.parse().unwrap(),
            portfolio_value: value,
            cash: value,
            positions_value: 0.0,
        }
    }

    #[test]
    fn daily_returns_are_percentage_changes() {
        let curve = vec![
            point("2024-01-02", 100_000.0),
            point("2024-01-03", 101_000.0),
            point("2024-01-04", 99_990.0),
        ];
        let returns = daily_returns(&curve);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.01).abs() < EPSILON);
        assert!((returns[1] + 0.01).abs() < EPSILON);
    }

    #[test]
    fn drawdown_of_monotonic_curve_is_zero() {
        assert!(max_drawdown(&[0.01, 0.02, 0.005]) < EPSILON);
    }

    #[test]
    fn drawdown_measures_worst_decline() {
        // 1.0 -> 1.10 -> 0.88 is a 20% drop from the peak.
        let drawdown = max_drawdown(&[0.10, -0.20]);
        assert!((drawdown - 0.20).abs() < EPSILON);
    }

    #[test]
    fn sharpe_is_absent_for_constant_returns() {
        assert!(sharpe_ratio(&[0.01, 0.01, 0.01]).is_none());
        assert!(sharpe_ratio(&[0.01]).is_none());
    }

    #[test]
    fn sharpe_is_positive_for_rising_curve() {
        let sharpe = sharpe_ratio(&[0.01, 0.02, 0.015, 0.005]).unwrap();
        assert!(sharpe > 0.0);
    }

    #[test]
    fn annualization_uses_calendar_days() {
        // 10% over exactly one year stays 10%.
        assert!((annualized_return(0.10, 365) - 0.10).abs() < EPSILON);
        // Over half a year it compounds above 20%.
        assert!(annualized_return(0.10, 182) > 0.20);
        assert_eq!(annualized_return(0.10, 0), 0.0);
    }

    #[test]
    fn win_rate_counts_only_sells_with_pnl() {
        let date: NaiveDate = "2024-01-05".parse().unwrap();
        let trades = vec![
            TradeRecord {
                date,
                symbol: "AAPL".to_string(),
                action: OrderAction::Buy,
                shares: 10,
                price: 100.0,
                commission: 0.0,
                realized_pnl: None,
            },
            TradeRecord {
                date,
                symbol: "AAPL".to_string(),
                action: OrderAction::Sell,
                shares: 5,
                price: 110.0,
                commission: 0.0,
                realized_pnl: Some(50.0),
            },
            TradeRecord {
                date,
                symbol: "AAPL".to_string(),
                action: OrderAction::Sell,
                shares: 5,
                price: 90.0,
                commission: 0.0,
                realized_pnl: Some(-50.0),
            },
            // A break-even sell is neither a win nor a loss.
            TradeRecord {
                date,
                symbol: "AAPL".to_string(),
                action: OrderAction::Sell,
                shares: 5,
                price: 100.0,
                commission: 0.0,
                realized_pnl: Some(0.0),
            },
        ];
        let curve = vec![point("2024-01-02", 100_000.0), point("2024-01-05", 100_100.0)];
        let result = build_result(BacktestConfig::default(), curve, trades);

        assert_eq!(result.num_trades, 4);
        assert_eq!(result.num_winning_trades, 1);
        assert_eq!(result.num_losing_trades, 1);
        assert!((result.win_rate - 0.5).abs() < EPSILON);
    }

    #[test]
    fn result_totals_from_equity_curve() {
        let curve = vec![
            point("2024-01-02", 100_000.0),
            point("2024-01-03", 105_000.0),
        ];
        let result = build_result(BacktestConfig::default(), curve, Vec::new());
        assert!((result.total_return - 0.05).abs() < EPSILON);
        assert!((result.total_return_pct - 5.0).abs() < EPSILON);
        assert!((result.max_drawdown - 0.0).abs() < EPSILON);
        assert_eq!(result.win_rate, 0.0);
    }
}
