use anyhow::{Context, Result};
use backtester::config::{BacktestConfig, RebalanceFrequency};
use backtester::market_data::{MarketData, SignalData};
use backtester::orchestrator::BacktestOrchestrator;
use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backtester", about = "Signal-driven portfolio backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest from JSON price and signal files
    Run {
        /// JSON file mapping symbol to an array of daily bars
        #[arg(long)]
        prices: PathBuf,
        /// JSON file mapping symbol to {date: signal}; symbols without
        /// signals stay uninvested
        #[arg(long)]
        signals: PathBuf,
        /// Write the full result as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 100_000.0)]
        initial_cash: f64,
        #[arg(long, default_value_t = 0.001)]
        slippage_pct: f64,
        #[arg(long, default_value_t = 0.0)]
        commission_per_share: f64,
        #[arg(long, default_value_t = 0.0)]
        commission_min: f64,
        #[arg(long, value_enum, default_value = "daily")]
        rebalance: RebalanceFrequency,
        #[arg(long, default_value_t = 0.3)]
        min_signal_threshold: f64,
        #[arg(long, default_value_t = 10)]
        max_positions: usize,
        #[arg(long, default_value_t = 0.25)]
        max_position_size: f64,
        #[arg(long, default_value_t = 0.05)]
        cash_buffer: f64,
        #[arg(long, default_value_t = 100.0)]
        min_trade_value: f64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            prices,
            signals,
            output,
            initial_cash,
            slippage_pct,
            commission_per_share,
            commission_min,
            rebalance,
            min_signal_threshold,
            max_positions,
            max_position_size,
            cash_buffer,
            min_trade_value,
        } => {
            let config = BacktestConfig {
                initial_cash,
                slippage_pct,
                commission_per_share,
                commission_min,
                rebalance_frequency: rebalance,
                min_signal_threshold,
                max_positions,
                max_position_size,
                cash_buffer,
                min_trade_value,
            };

            let data = MarketData::from_json_file(&prices)?;
            let signals = SignalData::from_json_file(&signals)?;

            let mut orchestrator = BacktestOrchestrator::new(config)?;
            let result = orchestrator.run(&data, &signals)?;

            info!(
                "{} -> {}: final value ${:.2}, total return {:.2}%, annualized {:.2}%",
                result.start_date,
                result.end_date,
                result.final_value,
                result.total_return_pct,
                result.annualized_return * 100.0
            );
            info!(
                "Max drawdown {:.2}%, Sharpe {}, {} trades ({} wins / {} losses, win rate {:.1}%)",
                result.max_drawdown * 100.0,
                result
                    .sharpe_ratio
                    .map(|sharpe| format!("{:.2}", sharpe))
                    .unwrap_or_else(|| "n/a".to_string()),
                result.num_trades,
                result.num_winning_trades,
                result.num_losing_trades,
                result.win_rate * 100.0
            );

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&result)?;
                fs::write(&path, json)
                    .with_context(|| format!("writing result to {}", path.display()))?;
                info!("Result written to {}", path.display());
            }
        }
    }

    Ok(())
}
