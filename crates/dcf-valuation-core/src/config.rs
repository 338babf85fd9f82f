use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::ValuationResult;

pub const MAX_SIMULATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Priors
// ---------------------------------------------------------------------------

/// Beta-distributed prior on `[lower_bound, upper_bound]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BayesianPrior {
    pub alpha: f64,
    pub beta: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl BayesianPrior {
    pub const fn new(alpha: f64, beta: f64, lower_bound: f64, upper_bound: f64) -> Self {
        BayesianPrior {
            alpha,
            beta,
            lower_bound,
            upper_bound,
        }
    }

    /// Mean of the rescaled Beta: `lower + (upper - lower) * alpha / (alpha + beta)`.
    pub fn mean(&self) -> f64 {
        self.lower_bound + (self.upper_bound - self.lower_bound) * self.alpha / (self.alpha + self.beta)
    }

    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    fn validate(&self, name: &str) -> ValuationResult<()> {
        let finite = [self.alpha, self.beta, self.lower_bound, self.upper_bound]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ValuationError::InvalidInput {
                field: format!("priors.{name}"),
                reason: "Prior parameters must be finite".into(),
            });
        }
        if self.alpha <= 0.0 || self.beta <= 0.0 {
            return Err(ValuationError::InvalidInput {
                field: format!("priors.{name}"),
                reason: format!(
                    "Beta shape parameters must be positive, got alpha={} beta={}",
                    self.alpha, self.beta
                ),
            });
        }
        if self.lower_bound >= self.upper_bound {
            return Err(ValuationError::InvalidInput {
                field: format!("priors.{name}"),
                reason: format!(
                    "Lower bound {} must be below upper bound {}",
                    self.lower_bound, self.upper_bound
                ),
            });
        }
        Ok(())
    }
}

/// Prior for every smoothed metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorTable {
    #[serde(default = "default_roe_prior")]
    pub roe: BayesianPrior,
    #[serde(default = "default_retention_prior")]
    pub retention_ratio: BayesianPrior,
    #[serde(default = "default_roic_prior")]
    pub roic: BayesianPrior,
}

fn default_roe_prior() -> BayesianPrior {
    BayesianPrior::new(2.0, 5.0, -0.1, 0.5)
}

fn default_retention_prior() -> BayesianPrior {
    BayesianPrior::new(5.0, 2.0, 0.0, 1.0)
}

fn default_roic_prior() -> BayesianPrior {
    BayesianPrior::new(2.0, 5.0, -0.1, 0.4)
}

impl Default for PriorTable {
    fn default() -> Self {
        PriorTable {
            roe: default_roe_prior(),
            retention_ratio: default_retention_prior(),
            roic: default_roic_prior(),
        }
    }
}

impl PriorTable {
    pub fn validate(&self) -> ValuationResult<()> {
        self.roe.validate("roe")?;
        self.retention_ratio.validate("retention_ratio")?;
        self.roic.validate("roic")
    }
}

// ---------------------------------------------------------------------------
// Simulation configuration
// ---------------------------------------------------------------------------

/// Run configuration for the probabilistic valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Iterations per ticker and method
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Seed for reproducible runs; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub use_bayesian_priors: bool,
    /// Weight of the prior mean in the smoothed estimate
    #[serde(default = "default_prior_weight")]
    pub prior_weight: f64,
    #[serde(default)]
    pub priors: PriorTable,
    /// Redraw rfr, beta and erp every iteration
    #[serde(default)]
    pub stochastic_discount_rates: bool,
    #[serde(default = "default_rfr_volatility")]
    pub rfr_volatility: f64,
    #[serde(default = "default_beta_volatility")]
    pub beta_volatility: f64,
    #[serde(default = "default_erp_volatility")]
    pub erp_volatility: f64,
    /// Mean-revert growth toward the terminal rate over the horizon
    #[serde(default = "default_true")]
    pub time_varying_growth: bool,
    #[serde(default = "default_mean_reversion_speed")]
    pub mean_reversion_speed: f64,
    /// Sampled ratios are capped at this multiple of the distribution median
    #[serde(default = "default_squash_threshold")]
    pub squash_threshold: f64,
    #[serde(default = "default_max_sampling_attempts")]
    pub max_sampling_attempts: u32,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_num_simulations() -> u32 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_prior_weight() -> f64 {
    0.3
}

fn default_rfr_volatility() -> f64 {
    0.005
}

fn default_beta_volatility() -> f64 {
    0.10
}

fn default_erp_volatility() -> f64 {
    0.01
}

fn default_mean_reversion_speed() -> f64 {
    0.3
}

fn default_squash_threshold() -> f64 {
    5.0
}

fn default_max_sampling_attempts() -> u32 {
    10
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_simulations: default_num_simulations(),
            seed: None,
            use_bayesian_priors: true,
            prior_weight: default_prior_weight(),
            priors: PriorTable::default(),
            stochastic_discount_rates: false,
            rfr_volatility: default_rfr_volatility(),
            beta_volatility: default_beta_volatility(),
            erp_volatility: default_erp_volatility(),
            time_varying_growth: true,
            mean_reversion_speed: default_mean_reversion_speed(),
            squash_threshold: default_squash_threshold(),
            max_sampling_attempts: default_max_sampling_attempts(),
            parallel: true,
        }
    }
}

impl SimulationConfig {
    /// Default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        SimulationConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }

    /// Prior weight actually applied: zero when priors are disabled.
    pub fn effective_prior_weight(&self) -> f64 {
        if self.use_bayesian_priors {
            self.prior_weight
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> ValuationResult<()> {
        if self.num_simulations == 0 || self.num_simulations > MAX_SIMULATIONS {
            return Err(ValuationError::InvalidInput {
                field: "num_simulations".into(),
                reason: format!("Must be between 1 and {MAX_SIMULATIONS}"),
            });
        }
        if !(0.0..=1.0).contains(&self.prior_weight) {
            return Err(ValuationError::InvalidInput {
                field: "prior_weight".into(),
                reason: "Prior weight must be in [0, 1]".into(),
            });
        }
        let volatilities = [
            ("rfr_volatility", self.rfr_volatility),
            ("beta_volatility", self.beta_volatility),
            ("erp_volatility", self.erp_volatility),
            ("mean_reversion_speed", self.mean_reversion_speed),
        ];
        for (field, value) in volatilities {
            if !value.is_finite() || value < 0.0 {
                return Err(ValuationError::InvalidInput {
                    field: field.into(),
                    reason: "Must be finite and non-negative".into(),
                });
            }
        }
        if !self.squash_threshold.is_finite() || self.squash_threshold <= 0.0 {
            return Err(ValuationError::InvalidInput {
                field: "squash_threshold".into(),
                reason: "Squash threshold must be a positive multiple of the median".into(),
            });
        }
        if self.max_sampling_attempts == 0 {
            return Err(ValuationError::InvalidInput {
                field: "max_sampling_attempts".into(),
                reason: "At least one sampling attempt is required".into(),
            });
        }
        self.priors.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_simulations, 1_000);
        assert!(config.seed.is_none());
        assert!(!config.stochastic_discount_rates);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: SimulationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.prior_weight, 0.3);
        assert_eq!(config.squash_threshold, 5.0);
        assert_eq!(config.priors.roe, BayesianPrior::new(2.0, 5.0, -0.1, 0.5));
        assert!(config.parallel);
    }

    #[test]
    fn test_prior_mean() {
        // -0.1 + 0.6 * 2/7
        let roe = default_roe_prior();
        assert!((roe.mean() - 0.071_428_571).abs() < 1e-8);
        let retention = default_retention_prior();
        assert!((retention.mean() - 5.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_effective_weight_zero_when_disabled() {
        let config = SimulationConfig {
            use_bayesian_priors: false,
            ..Default::default()
        };
        assert_eq!(config.effective_prior_weight(), 0.0);
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let config = SimulationConfig {
            num_simulations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_too_many_simulations_rejected() {
        let config = SimulationConfig {
            num_simulations: MAX_SIMULATIONS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_prior_rejected() {
        let mut config = SimulationConfig::default();
        config.priors.roic = BayesianPrior::new(0.0, 5.0, -0.1, 0.4);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("priors.roic"));

        config.priors.roic = BayesianPrior::new(2.0, 5.0, 0.4, 0.4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prior_weight_out_of_range() {
        let config = SimulationConfig {
            prior_weight: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
