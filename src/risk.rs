use crate::config::RiskConfig;
use crate::errors::ConfigError;
use crate::models::{PortfolioState, CASH_SYMBOL};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;

const WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskAction {
    Approve,
    Adjust,
    Reject,
}

impl RiskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskAction::Approve => "approve",
            RiskAction::Adjust => "adjust",
            RiskAction::Reject => "reject",
        }
    }
}

/// Outcome of a risk check over proposed target weights.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheckResult {
    pub action: RiskAction,
    pub is_compliant: bool,
    pub original_weights: HashMap<String, f64>,
    /// Present when action is Adjust; the weights to trade instead.
    pub adjusted_weights: Option<HashMap<String, f64>>,
    pub violations: Vec<String>,
    pub adjustments: Vec<String>,
    pub message: String,
}

/// Validates proposed allocations before orders are generated. The
/// orchestrator trades the adjusted weights when the validator adjusts,
/// and skips the rebalance entirely when it rejects.
pub trait RiskValidator {
    fn validate_weights(
        &self,
        target_weights: &HashMap<String, f64>,
        portfolio: &PortfolioState,
    ) -> RiskCheckResult;
}

/// Rule-based validator: per-position cap, total exposure cap and a cash
/// reserve floor. It prefers adjusting weights over rejecting them.
#[derive(Debug, Clone)]
pub struct BasicRiskValidator {
    config: RiskConfig,
}

impl BasicRiskValidator {
    pub fn new(config: RiskConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

impl RiskValidator for BasicRiskValidator {
    fn validate_weights(
        &self,
        target_weights: &HashMap<String, f64>,
        _portfolio: &PortfolioState,
    ) -> RiskCheckResult {
        let mut adjusted = target_weights.clone();
        let mut violations = Vec::new();
        let mut adjustments = Vec::new();

        // Per-position cap; excess goes to cash.
        let oversized: Vec<String> = adjusted
            .iter()
            .filter(|(symbol, weight)| {
                symbol.as_str() != CASH_SYMBOL && **weight > self.config.max_position_size
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();
        for symbol in oversized {
            let weight = adjusted[&symbol];
            violations.push(format!(
                "{} weight {:.1}% exceeds max position size {:.1}%",
                symbol,
                weight * 100.0,
                self.config.max_position_size * 100.0
            ));
            let excess = weight - self.config.max_position_size;
            adjusted.insert(symbol.clone(), self.config.max_position_size);
            *adjusted.entry(CASH_SYMBOL.to_string()).or_insert(0.0) += excess;
            adjustments.push(format!(
                "Capped {} at {:.1}%, moved {:.1}% to cash",
                symbol,
                self.config.max_position_size * 100.0,
                excess * 100.0
            ));
        }

        // Total exposure cap; all positions scale down proportionally.
        let exposure: f64 = adjusted
            .iter()
            .filter(|(symbol, _)| symbol.as_str() != CASH_SYMBOL)
            .map(|(_, weight)| weight)
            .sum();
        if exposure > self.config.max_total_exposure + WEIGHT_EPSILON {
            violations.push(format!(
                "Total exposure {:.1}% exceeds max {:.1}%",
                exposure * 100.0,
                self.config.max_total_exposure * 100.0
            ));
            let scale = self.config.max_total_exposure / exposure;
            for (symbol, weight) in adjusted.iter_mut() {
                if symbol != CASH_SYMBOL {
                    *weight *= scale;
                }
            }
            let invested: f64 = adjusted
                .iter()
                .filter(|(symbol, _)| symbol.as_str() != CASH_SYMBOL)
                .map(|(_, weight)| weight)
                .sum();
            adjusted.insert(CASH_SYMBOL.to_string(), 1.0 - invested);
            adjustments.push(format!(
                "Scaled all positions by {:.3} to meet exposure limit",
                scale
            ));
        }

        // Cash reserve floor; again a proportional scale-down.
        let cash = adjusted.get(CASH_SYMBOL).copied().unwrap_or(0.0);
        if cash + WEIGHT_EPSILON < self.config.min_cash_reserve {
            violations.push(format!(
                "Cash {:.1}% below minimum reserve {:.1}%",
                cash * 100.0,
                self.config.min_cash_reserve * 100.0
            ));
            let invested: f64 = adjusted
                .iter()
                .filter(|(symbol, _)| symbol.as_str() != CASH_SYMBOL)
                .map(|(_, weight)| weight)
                .sum();
            if invested > 0.0 {
                let scale = (1.0 - self.config.min_cash_reserve) / invested;
                for (symbol, weight) in adjusted.iter_mut() {
                    if symbol != CASH_SYMBOL {
                        *weight *= scale;
                    }
                }
            }
            adjusted.insert(CASH_SYMBOL.to_string(), self.config.min_cash_reserve);
            adjustments.push(format!(
                "Raised cash to minimum reserve {:.1}%",
                self.config.min_cash_reserve * 100.0
            ));
        }

        // Keep weights a proper distribution after rounding drift.
        let total: f64 = adjusted.values().sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON && total > 0.0 {
            for weight in adjusted.values_mut() {
                *weight /= total;
            }
        }

        if violations.is_empty() {
            RiskCheckResult {
                action: RiskAction::Approve,
                is_compliant: true,
                original_weights: target_weights.clone(),
                adjusted_weights: None,
                violations,
                adjustments,
                message: "All risk checks passed".to_string(),
            }
        } else {
            warn!(
                "Risk validator adjusted weights: {}",
                violations.join("; ")
            );
            info!("Adjustments applied: {}", adjustments.join("; "));
            RiskCheckResult {
                action: RiskAction::Adjust,
                is_compliant: false,
                original_weights: target_weights.clone(),
                adjusted_weights: Some(adjusted),
                message: format!("{} violation(s) adjusted", violations.len()),
                violations,
                adjustments,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const EPSILON: f64 = 1e-9;

    fn portfolio() -> PortfolioState {
        PortfolioState {
            positions: HashMap::new(),
            cash: 100_000.0,
            total_value: 100_000.0,
            prices: HashMap::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    fn validator() -> BasicRiskValidator {
        BasicRiskValidator::new(RiskConfig {
            max_position_size: 0.20,
            max_total_exposure: 0.90,
            min_cash_reserve: 0.05,
        })
        .unwrap()
    }

    #[test]
    fn compliant_weights_are_approved() {
        let weights = HashMap::from([
            ("AAPL".to_string(), 0.15),
            ("MSFT".to_string(), 0.15),
            (CASH_SYMBOL.to_string(), 0.70),
        ]);
        let result = validator().validate_weights(&weights, &portfolio());
        assert_eq!(result.action, RiskAction::Approve);
        assert!(result.is_compliant);
        assert!(result.adjusted_weights.is_none());
    }

    #[test]
    fn oversized_position_is_capped_into_cash() {
        let weights = HashMap::from([
            ("AAPL".to_string(), 0.35),
            (CASH_SYMBOL.to_string(), 0.65),
        ]);
        let result = validator().validate_weights(&weights, &portfolio());
        assert_eq!(result.action, RiskAction::Adjust);
        let adjusted = result.adjusted_weights.unwrap();
        assert!((adjusted["AAPL"] - 0.20).abs() < EPSILON);
        assert!((adjusted[CASH_SYMBOL] - 0.80).abs() < EPSILON);
    }

    #[test]
    fn excess_exposure_scales_down_proportionally() {
        let validator = BasicRiskValidator::new(RiskConfig {
            max_position_size: 0.50,
            max_total_exposure: 0.80,
            min_cash_reserve: 0.0,
        })
        .unwrap();
        let weights = HashMap::from([
            ("AAPL".to_string(), 0.50),
            ("MSFT".to_string(), 0.50),
            (CASH_SYMBOL.to_string(), 0.0),
        ]);
        let result = validator.validate_weights(&weights, &portfolio());
        let adjusted = result.adjusted_weights.unwrap();
        assert!((adjusted["AAPL"] - 0.40).abs() < EPSILON);
        assert!((adjusted["MSFT"] - 0.40).abs() < EPSILON);
        assert!((adjusted[CASH_SYMBOL] - 0.20).abs() < EPSILON);
    }

    #[test]
    fn cash_reserve_is_enforced() {
        let validator = BasicRiskValidator::new(RiskConfig {
            max_position_size: 1.0,
            max_total_exposure: 1.0,
            min_cash_reserve: 0.10,
        })
        .unwrap();
        let weights = HashMap::from([
            ("AAPL".to_string(), 0.98),
            (CASH_SYMBOL.to_string(), 0.02),
        ]);
        let result = validator.validate_weights(&weights, &portfolio());
        let adjusted = result.adjusted_weights.unwrap();
        assert!((adjusted[CASH_SYMBOL] - 0.10).abs() < EPSILON);
        assert!((adjusted["AAPL"] - 0.90).abs() < EPSILON);
        let total: f64 = adjusted.values().sum();
        assert!((total - 1.0).abs() < EPSILON);
    }

    #[test]
    fn adjusted_weights_always_sum_to_one() {
        let weights = HashMap::from([
            ("AAPL".to_string(), 0.40),
            ("MSFT".to_string(), 0.40),
            ("GOOG".to_string(), 0.40),
            (CASH_SYMBOL.to_string(), 0.0),
        ]);
        let result = validator().validate_weights(&weights, &portfolio());
        let adjusted = result.adjusted_weights.unwrap();
        let total: f64 = adjusted.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        for (symbol, weight) in &adjusted {
            if symbol != CASH_SYMBOL {
                assert!(*weight <= 0.20 + 1e-6);
            }
        }
        assert!(adjusted[CASH_SYMBOL] >= 0.05 - 1e-6);
    }
}
