use crate::models::Bar;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Historical price series for the symbols under test. Bars are kept
/// sorted by date per symbol; the trading calendar is the union of all
/// symbols' dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketData {
    series: BTreeMap<String, Vec<Bar>>,
}

impl MarketData {
    pub fn new(series: HashMap<String, Vec<Bar>>) -> Self {
        let series = series
            .into_iter()
            .map(|(symbol, mut bars)| {
                bars.sort_by_key(|bar| bar.date);
                (symbol, bars)
            })
            .collect();
        Self { series }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening price data file {}", path.display()))?;
        let raw: HashMap<String, Vec<Bar>> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing price data file {}", path.display()))?;
        Ok(Self::new(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|bars| bars.is_empty())
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    pub fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    /// All distinct trading dates across every symbol, ascending. Holidays
    /// never appear here; a date exists iff at least one symbol has a bar.
    pub fn trading_dates(&self) -> Vec<NaiveDate> {
        let mut dates = BTreeSet::new();
        for bars in self.series.values() {
            for bar in bars {
                dates.insert(bar.date);
            }
        }
        dates.into_iter().collect()
    }

    /// Closing prices for every symbol that has a bar on `date`. Symbols
    /// without data that day are simply absent.
    pub fn closes_on(&self, date: NaiveDate) -> HashMap<String, f64> {
        let mut prices = HashMap::new();
        for (symbol, bars) in &self.series {
            if let Ok(idx) = bars.binary_search_by_key(&date, |bar| bar.date) {
                prices.insert(symbol.clone(), bars[idx].close);
            }
        }
        prices
    }
}

/// Produces a signal series aligned to a symbol's bars. Implementations
/// live outside this crate's core; the backtest only needs the contract.
pub trait SignalSource {
    /// Returns one signal in [-1.0, 1.0] per bar, same length as `bars`.
    fn generate_signals(&self, symbol: &str, bars: &[Bar]) -> Result<Vec<f64>>;
}

/// Precomputed per-symbol signal series keyed by trading date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalData {
    series: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
}

impl SignalData {
    pub fn new(series: HashMap<String, BTreeMap<NaiveDate, f64>>) -> Self {
        Self {
            series: series.into_iter().collect(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening signal data file {}", path.display()))?;
        let raw: HashMap<String, BTreeMap<NaiveDate, f64>> =
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing signal data file {}", path.display()))?;
        Ok(Self::new(raw))
    }

    /// Runs the source once per symbol and aligns the output to bar dates.
    /// A symbol whose source fails or returns a mismatched length is
    /// skipped; it never aborts the run.
    pub fn from_source(data: &MarketData, source: &dyn SignalSource) -> Self {
        let mut series = BTreeMap::new();
        for symbol in data.symbols() {
            let bars = data.bars(symbol).unwrap_or(&[]);
            match source.generate_signals(symbol, bars) {
                Ok(values) if values.len() == bars.len() => {
                    let by_date: BTreeMap<NaiveDate, f64> = bars
                        .iter()
                        .zip(values)
                        .map(|(bar, value)| (bar.date, value))
                        .collect();
                    series.insert(symbol.to_string(), by_date);
                }
                Ok(values) => {
                    warn!(
                        "Signal source returned {} values for {} bars of {}; skipping symbol",
                        values.len(),
                        bars.len(),
                        symbol
                    );
                }
                Err(error) => {
                    warn!("Failed to generate signals for {}: {}", symbol, error);
                }
            }
        }
        Self { series }
    }

    pub fn insert(&mut self, symbol: &str, by_date: BTreeMap<NaiveDate, f64>) {
        self.series.insert(symbol.to_string(), by_date);
    }

    /// Signal values for one day. Symbols with no entry, a zero value or a
    /// NaN value are excluded for that day only.
    pub fn signals_on(&self, date: NaiveDate) -> HashMap<String, f64> {
        let mut signals = HashMap::new();
        for (symbol, by_date) in &self.series {
            match by_date.get(&date) {
                Some(value) if value.is_finite() && *value != 0.0 => {
                    signals.insert(symbol.clone(), *value);
                }
                Some(_) => {
                    debug!("Skipping {} on {}: empty or invalid signal", symbol, date);
                }
                None => {}
            }
        }
        signals
    }
}
