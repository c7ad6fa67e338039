use crate::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::market_data::{MarketData, SignalData};
use crate::models::BacktestResult;
use crate::orchestrator::BacktestOrchestrator;
use log::info;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// One sweep run: the configuration tried and what it produced.
#[derive(Debug)]
pub struct SweepOutcome {
    pub config: BacktestConfig,
    pub result: Result<BacktestResult, BacktestError>,
}

/// Runs one backtest per configuration in parallel. Each run gets a fresh
/// orchestrator, so outcomes are independent of scheduling order; the
/// output preserves the input order.
pub fn run_sweep(
    data: &MarketData,
    signals: &SignalData,
    configs: Vec<BacktestConfig>,
    cancel: Option<Arc<AtomicBool>>,
) -> Vec<SweepOutcome> {
    info!("Running sweep over {} configurations", configs.len());
    configs
        .into_par_iter()
        .map(|config| {
            let result = BacktestOrchestrator::new(config.clone()).and_then(|mut orchestrator| {
                if let Some(cancel) = &cancel {
                    orchestrator = orchestrator.with_cancel_flag(Arc::clone(cancel));
                }
                orchestrator.run(data, signals)
            });
            SweepOutcome { config, result }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::Ordering;

    fn fixture() -> (MarketData, SignalData) {
        let mut bars = Vec::new();
        let mut by_date = BTreeMap::new();
        for day in 2..=20 {
            let date = chrono::NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
            bars.push(Bar {
                date,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + day as f64,
                volume: 10_000,
            });
            by_date.insert(date, 0.8);
        }
        let data = MarketData::new(HashMap::from([("AAPL".to_string(), bars)]));
        let mut signals = SignalData::default();
        signals.insert("AAPL", by_date);
        (data, signals)
    }

    #[test]
    fn sweep_preserves_config_order() {
        let (data, signals) = fixture();
        let configs: Vec<BacktestConfig> = [0.10, 0.20, 0.25]
            .iter()
            .map(|cap| BacktestConfig {
                max_position_size: *cap,
                ..BacktestConfig::default()
            })
            .collect();

        let outcomes = run_sweep(&data, &signals, configs, None);
        assert_eq!(outcomes.len(), 3);
        for (outcome, cap) in outcomes.iter().zip([0.10, 0.20, 0.25]) {
            assert_eq!(outcome.config.max_position_size, cap);
            assert!(outcome.result.is_ok());
        }
    }

    #[test]
    fn runs_are_independent() {
        let (data, signals) = fixture();
        let config = BacktestConfig::default();
        let first = run_sweep(&data, &signals, vec![config.clone(), config], None);
        let a = first[0].result.as_ref().unwrap();
        let b = first[1].result.as_ref().unwrap();
        assert_eq!(a.final_value, b.final_value);
        assert_eq!(a.num_trades, b.num_trades);
    }

    #[test]
    fn cancelled_sweep_reports_cancellation() {
        let (data, signals) = fixture();
        let cancel = Arc::new(AtomicBool::new(false));
        cancel.store(true, Ordering::Relaxed);

        let outcomes = run_sweep(
            &data,
            &signals,
            vec![BacktestConfig::default()],
            Some(cancel),
        );
        assert!(matches!(
            outcomes[0].result,
            Err(BacktestError::Cancelled { .. })
        ));
    }
}
