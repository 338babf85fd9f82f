use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{BayesianPrior, SimulationConfig};
use crate::ValuationResult;

use super::metrics::{EmpiricalMetrics, MetricEstimate};
use super::sampling::{lognormal_params, sample_beta, sample_lognormal, sample_normal, squash};

/// Blend an empirical mean with the prior mean:
/// `(1 - w) * empirical + w * prior_mean`.
pub fn smooth(empirical_mean: f64, prior: &BayesianPrior, weight: f64) -> f64 {
    (1.0 - weight) * empirical_mean + weight * prior.mean()
}

/// Per-iteration sampling distribution of one growth driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricDistribution {
    /// `exp(N(mu, sigma))` squashed at `exp(mu) * squash_threshold`
    LogNormal {
        mu: f64,
        sigma: f64,
        squash_threshold: f64,
    },
    Normal { mean: f64, std_dev: f64 },
    /// Beta(alpha, beta) rescaled to `[lower, upper]`
    Beta {
        alpha: f64,
        beta: f64,
        lower: f64,
        upper: f64,
    },
    Constant { value: f64 },
}

/// Outcome of one draw.
#[derive(Debug, Clone, Copy)]
pub struct MetricDraw {
    pub value: f64,
    /// The lognormal sampler ran out of attempts and returned its median
    pub fell_back: bool,
    pub squashed: bool,
}

impl MetricDistribution {
    pub fn draw<R: Rng>(&self, rng: &mut R, max_attempts: u32) -> ValuationResult<MetricDraw> {
        match *self {
            MetricDistribution::LogNormal {
                mu,
                sigma,
                squash_threshold,
            } => {
                let (raw, fell_back) = sample_lognormal(rng, mu, sigma, max_attempts)?;
                let value = squash(raw, squash_threshold, mu.exp());
                Ok(MetricDraw {
                    value,
                    fell_back,
                    squashed: value < raw,
                })
            }
            MetricDistribution::Normal { mean, std_dev } => Ok(MetricDraw {
                value: sample_normal(rng, mean, std_dev)?,
                fell_back: false,
                squashed: false,
            }),
            MetricDistribution::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => Ok(MetricDraw {
                value: sample_beta(rng, alpha, beta, lower, upper)?,
                fell_back: false,
                squashed: false,
            }),
            MetricDistribution::Constant { value } => Ok(MetricDraw {
                value,
                fell_back: false,
                squashed: false,
            }),
        }
    }

    /// Distribution centre used for reporting.
    pub fn center(&self) -> f64 {
        match *self {
            MetricDistribution::LogNormal { mu, .. } => mu.exp(),
            MetricDistribution::Normal { mean, .. } => mean,
            MetricDistribution::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => lower + (upper - lower) * alpha / (alpha + beta),
            MetricDistribution::Constant { value } => value,
        }
    }
}

/// ROE / ROIC model: lognormal moment-matched to the smoothed mean and the
/// empirical deviation, squashed at `median * threshold`. A non-positive
/// smoothed mean has no lognormal counterpart and is drawn from a normal.
pub fn profitability_distribution(
    estimate: &MetricEstimate,
    prior: &BayesianPrior,
    weight: f64,
    squash_threshold: f64,
) -> ValuationResult<MetricDistribution> {
    let center = smooth(estimate.mean, prior, weight);
    if center <= 0.0 {
        return Ok(MetricDistribution::Normal {
            mean: center,
            std_dev: estimate.std_dev,
        });
    }
    let (mu, sigma) = lognormal_params(center, estimate.std_dev)?;
    Ok(MetricDistribution::LogNormal {
        mu,
        sigma,
        squash_threshold,
    })
}

/// Retention model: Beta moment-matched to the smoothed mean and empirical
/// variance on the prior's domain. Zero variance collapses to the mean; an
/// infeasible match falls back to the prior's own Beta.
pub fn retention_distribution(
    estimate: &MetricEstimate,
    prior: &BayesianPrior,
    weight: f64,
) -> MetricDistribution {
    let center = smooth(estimate.mean, prior, weight);
    if estimate.std_dev == 0.0 {
        return MetricDistribution::Constant { value: center };
    }

    let width = prior.width();
    let m = (center - prior.lower_bound) / width;
    let v = (estimate.std_dev / width).powi(2);
    if m > 0.0 && m < 1.0 && v < m * (1.0 - m) {
        let common = m * (1.0 - m) / v - 1.0;
        MetricDistribution::Beta {
            alpha: m * common,
            beta: (1.0 - m) * common,
            lower: prior.lower_bound,
            upper: prior.upper_bound,
        }
    } else {
        MetricDistribution::Beta {
            alpha: prior.alpha,
            beta: prior.beta,
            lower: prior.lower_bound,
            upper: prior.upper_bound,
        }
    }
}

/// Reinvestment rate model: normal at the empirical moments, no prior.
pub fn reinvestment_distribution(estimate: &MetricEstimate) -> MetricDistribution {
    MetricDistribution::Normal {
        mean: estimate.mean,
        std_dev: estimate.std_dev,
    }
}

/// Sampling distributions for all four drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDistributions {
    pub return_on_equity: MetricDistribution,
    pub retention_ratio: MetricDistribution,
    pub return_on_invested_capital: MetricDistribution,
    pub reinvestment_rate: MetricDistribution,
}

impl DriverDistributions {
    pub fn build(metrics: &EmpiricalMetrics, config: &SimulationConfig) -> ValuationResult<Self> {
        let w = config.effective_prior_weight();
        let priors = &config.priors;
        Ok(DriverDistributions {
            return_on_equity: profitability_distribution(
                &metrics.return_on_equity,
                &priors.roe,
                w,
                config.squash_threshold,
            )?,
            retention_ratio: retention_distribution(
                &metrics.retention_ratio,
                &priors.retention_ratio,
                w,
            ),
            return_on_invested_capital: profitability_distribution(
                &metrics.return_on_invested_capital,
                &priors.roic,
                w,
                config.squash_threshold,
            )?,
            reinvestment_rate: reinvestment_distribution(&metrics.reinvestment_rate),
        })
    }
}
