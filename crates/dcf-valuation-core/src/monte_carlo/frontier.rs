use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::ValuationResult;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One ticker's simulated per-share values and its market price.
///
/// Slots are indexed by iteration; `None` (JSON `null`) marks an iteration
/// whose value was excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierAsset {
    pub ticker: String,
    pub price: f64,
    pub simulations: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub assets: Vec<FrontierAsset>,
    /// Optional portfolio to evaluate against the surplus matrix
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

/// Surplus matrix and its first two moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInputs {
    pub tickers: Vec<String>,
    /// `surplus[i][j] = (sim_ij - price_j) / price_j`, one row per iteration
    pub surplus: Vec<Vec<f64>>,
    pub mean_surplus: Vec<f64>,
    /// Sample covariance (n - 1) across iterations
    pub covariance: Vec<Vec<f64>>,
    /// Iterations dropped because some asset had no usable value
    pub dropped_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    pub inputs: FrontierInputs,
    pub weights: Option<Vec<f64>>,
    pub expected_surplus: Option<f64>,
    pub shortfall_probability: Option<f64>,
}

impl FrontierInputs {
    /// Share of iterations in which the weighted surplus is negative.
    pub fn shortfall_probability(&self, weights: &[f64]) -> ValuationResult<f64> {
        self.validate_weights(weights)?;
        let shortfalls = self
            .surplus
            .iter()
            .filter(|row| dot(row, weights) < 0.0)
            .count();
        Ok(shortfalls as f64 / self.surplus.len() as f64)
    }

    pub fn expected_surplus(&self, weights: &[f64]) -> ValuationResult<f64> {
        self.validate_weights(weights)?;
        Ok(dot(&self.mean_surplus, weights))
    }

    fn validate_weights(&self, weights: &[f64]) -> ValuationResult<()> {
        if weights.len() != self.tickers.len() {
            return Err(ValuationError::InvalidInput {
                field: "weights".into(),
                reason: format!(
                    "Expected {} weights, got {}",
                    self.tickers.len(),
                    weights.len()
                ),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValuationError::InvalidInput {
                field: "weights".into(),
                reason: "Weights must be finite and non-negative".into(),
            });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ValuationError::InvalidInput {
                field: "weights".into(),
                reason: format!("Weights must sum to 1, got {sum}"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the surplus matrix, mean vector and covariance, and evaluate the
/// optional portfolio.
pub fn calculate_frontier(
    input: &FrontierInput,
) -> ValuationResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let inputs = frontier_inputs(&input.assets)?;
    if inputs.dropped_iterations > 0 {
        warnings.push(format!(
            "{} incomplete iterations dropped; {} remain",
            inputs.dropped_iterations,
            inputs.surplus.len()
        ));
    }
    for (j, ticker) in inputs.tickers.iter().enumerate() {
        if inputs.covariance[j][j] == 0.0 {
            warnings.push(format!("{ticker}: simulated values have zero variance"));
        }
    }

    let (expected_surplus, shortfall_probability) = match &input.weights {
        Some(w) => (
            Some(inputs.expected_surplus(w)?),
            Some(inputs.shortfall_probability(w)?),
        ),
        None => (None, None),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "tickers": inputs.tickers,
        "iterations": inputs.surplus.len(),
        "weights": input.weights,
    });

    Ok(with_metadata_f64(
        "Simulated price surplus matrix with sample covariance",
        &assumptions,
        warnings,
        elapsed,
        FrontierOutput {
            inputs,
            weights: input.weights.clone(),
            expected_surplus,
            shortfall_probability,
        },
    ))
}

/// Surplus matrix, per-ticker mean and sample covariance.
///
/// Every asset must carry the same number of iteration slots and a positive
/// price. Iterations where any asset's slot is empty or non-finite are
/// dropped; at least two complete iterations must remain.
pub fn frontier_inputs(assets: &[FrontierAsset]) -> ValuationResult<FrontierInputs> {
    let first = assets.first().ok_or_else(|| {
        ValuationError::InsufficientData("At least one asset required".into())
    })?;
    let slots = first.simulations.len();
    for asset in assets {
        if asset.simulations.len() != slots {
            return Err(ValuationError::InvalidInput {
                field: format!("assets.{}.simulations", asset.ticker),
                reason: format!(
                    "Expected {slots} iteration slots, got {}",
                    asset.simulations.len()
                ),
            });
        }
        if !asset.price.is_finite() || asset.price <= 0.0 {
            return Err(ValuationError::InvalidInput {
                field: format!("assets.{}.price", asset.ticker),
                reason: "Price must be positive".into(),
            });
        }
    }

    let k = assets.len();
    let surplus: Vec<Vec<f64>> = (0..slots)
        .filter_map(|i| {
            assets
                .iter()
                .map(|a| {
                    a.simulations[i]
                        .filter(|v| v.is_finite())
                        .map(|v| (v - a.price) / a.price)
                })
                .collect::<Option<Vec<f64>>>()
        })
        .collect();

    let iterations = surplus.len();
    if iterations < 2 {
        return Err(ValuationError::InsufficientData(format!(
            "{iterations} complete iterations across {k} assets, at least 2 required"
        )));
    }

    let n = iterations as f64;
    let mean_surplus: Vec<f64> = (0..k)
        .map(|j| surplus.iter().map(|row| row[j]).sum::<f64>() / n)
        .collect();

    let mut covariance = vec![vec![0.0; k]; k];
    for a in 0..k {
        for b in a..k {
            let sum: f64 = surplus
                .iter()
                .map(|row| (row[a] - mean_surplus[a]) * (row[b] - mean_surplus[b]))
                .sum();
            let cov = sum / (n - 1.0);
            covariance[a][b] = cov;
            covariance[b][a] = cov;
        }
    }

    Ok(FrontierInputs {
        tickers: assets.iter().map(|a| a.ticker.clone()).collect(),
        surplus,
        mean_surplus,
        covariance,
        dropped_iterations: slots - iterations,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn assets() -> Vec<FrontierAsset> {
        vec![
            FrontierAsset {
                ticker: "AAA".into(),
                price: 10.0,
                simulations: slots(&[8.0, 12.0, 11.0, 9.0]),
            },
            FrontierAsset {
                ticker: "BBB".into(),
                price: 20.0,
                simulations: slots(&[30.0, 18.0, 22.0, 10.0]),
            },
        ]
    }

    #[test]
    fn test_surplus_and_mean() {
        let f = frontier_inputs(&assets()).unwrap();
        assert_eq!(f.surplus[0], vec![-0.2, 0.5]);
        assert!((f.mean_surplus[0] - 0.0).abs() < 1e-12);
        assert!((f.mean_surplus[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_symmetric_sample() {
        let f = frontier_inputs(&assets()).unwrap();
        assert_eq!(f.covariance[0][1], f.covariance[1][0]);
        // AAA surplus: -0.2, 0.2, 0.1, -0.1 -> sum of squares 0.1 over 3
        assert!((f.covariance[0][0] - 0.1 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shortfall_probability() {
        let f = frontier_inputs(&assets()).unwrap();
        // All in AAA: iterations 0 and 3 fall short
        assert_eq!(f.shortfall_probability(&[1.0, 0.0]).unwrap(), 0.5);
        // 50/50 rows: 0.15, 0.05, 0.1, -0.3
        assert_eq!(f.shortfall_probability(&[0.5, 0.5]).unwrap(), 0.25);
    }

    #[test]
    fn test_weight_validation() {
        let f = frontier_inputs(&assets()).unwrap();
        assert!(f.shortfall_probability(&[0.6, 0.6]).is_err());
        assert!(f.shortfall_probability(&[1.2, -0.2]).is_err());
        assert!(f.shortfall_probability(&[1.0]).is_err());
        assert!(f.shortfall_probability(&[f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let mut a = assets();
        a[1].simulations.pop();
        match frontier_inputs(&a) {
            Err(ValuationError::InvalidInput { field, .. }) => {
                assert_eq!(field, "assets.BBB.simulations")
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_iterations_dropped() {
        let mut a = assets();
        a[0].simulations[1] = None;
        a[1].simulations[2] = Some(f64::NAN);
        let f = frontier_inputs(&a).unwrap();
        assert_eq!(f.dropped_iterations, 2);
        assert_eq!(f.surplus, vec![vec![-0.2, 0.5], vec![-0.1, -0.5]]);
    }

    #[test]
    fn test_too_few_complete_iterations() {
        let mut a = assets();
        for slot in a[1].simulations.iter_mut().skip(1) {
            *slot = None;
        }
        match frontier_inputs(&a) {
            Err(ValuationError::InsufficientData(msg)) => assert!(msg.contains("1 complete")),
            other => panic!("Expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn test_calculate_with_weights() {
        let out = calculate_frontier(&FrontierInput {
            assets: assets(),
            weights: Some(vec![0.5, 0.5]),
        })
        .unwrap()
        .result;
        assert_eq!(out.shortfall_probability, Some(0.25));
        assert!(out.expected_surplus.unwrap().abs() < 1e-12);
    }
}
