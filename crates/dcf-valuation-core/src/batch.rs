use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::inputs::{TimeSeriesInputs, ValuationInputs};
use crate::monte_carlo::sampling::splitmix64;
use crate::monte_carlo::simulation::{
    run_probabilistic_valuation, MethodSimulation, ProbabilisticValuation,
};
use crate::monte_carlo::statistics::Percentiles;
use crate::signal::Signal;
use crate::types::{with_metadata_f64, ComputationOutput, Money, Rate};
use crate::valuation::dcf::{calculate_dcf, DcfOutput, MethodValuation};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One ticker of a universe: the latest snapshot plus, optionally, the
/// annual history that drives the probabilistic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseRecord {
    pub inputs: ValuationInputs,
    #[serde(default)]
    pub time_series: Option<TimeSeriesInputs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Validation,
    Deterministic,
    Probabilistic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Per-method columns of a summary row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodSummary {
    pub intrinsic_value_per_share: Option<Money>,
    pub margin_of_safety: Option<Rate>,
    pub simulated_mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub percentiles: Option<Percentiles>,
    pub probability_undervalued: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub ticker: String,
    pub name: String,
    pub price: Money,
    pub fcfe: MethodSummary,
    pub fcff: MethodSummary,
    pub deterministic_signal: Option<Signal>,
    pub simulated_signal: Option<Signal>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseOutput {
    pub rows: Vec<SummaryRow>,
    /// Ticker -> FCFE value per share by iteration, `None` where excluded
    pub fcfe_simulations: BTreeMap<String, Vec<Option<f64>>>,
    /// Ticker -> FCFF value per share by iteration, `None` where excluded
    pub fcff_simulations: BTreeMap<String, Vec<Option<f64>>>,
    pub market_prices: BTreeMap<String, f64>,
    pub failures: Vec<TickerFailure>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value every record of a universe.
///
/// A ticker whose inputs fail validation is recorded as a failure and
/// skipped. A failed probabilistic run is recorded but keeps the ticker's
/// deterministic columns. No ticker's error stops the others.
pub fn value_universe(
    records: &[UniverseRecord],
    config: &SimulationConfig,
) -> ValuationResult<ComputationOutput<UniverseOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    config.validate()?;

    let mut output = UniverseOutput {
        rows: Vec::with_capacity(records.len()),
        fcfe_simulations: BTreeMap::new(),
        fcff_simulations: BTreeMap::new(),
        market_prices: BTreeMap::new(),
        failures: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        let ticker = record.inputs.ticker.clone();
        let mut fail = |stage: FailureStage, message: String| {
            warn!(%ticker, ?stage, %message, "ticker failed");
            output.failures.push(TickerFailure {
                ticker: ticker.clone(),
                stage,
                message,
            });
        };

        let inputs = match record.inputs.clone().validate() {
            Ok(v) => v,
            Err(e) => {
                fail(FailureStage::Validation, e.to_string());
                continue;
            }
        };

        let deterministic = match calculate_dcf(&inputs) {
            Ok(out) => Some(out),
            Err(e) => {
                fail(FailureStage::Deterministic, e.to_string());
                None
            }
        };

        let probabilistic = match &record.time_series {
            Some(series) => {
                let ticker_config = SimulationConfig {
                    seed: config.seed.map(|s| ticker_seed(s, index)),
                    ..config.clone()
                };
                match run_probabilistic_valuation(&inputs, series, &ticker_config) {
                    Ok(out) => Some(out),
                    Err(e) => {
                        fail(FailureStage::Probabilistic, e.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        let mut row = SummaryRow {
            ticker: ticker.clone(),
            name: inputs.name.clone(),
            price: inputs.price,
            fcfe: MethodSummary::default(),
            fcff: MethodSummary::default(),
            deterministic_signal: None,
            simulated_signal: None,
            warnings: Vec::new(),
        };
        if let Some(out) = deterministic {
            apply_deterministic(&mut row, &out.result);
            row.warnings.extend(out.warnings);
        }
        if let Some(out) = probabilistic {
            apply_probabilistic(&mut row, &out.result);
            row.warnings.extend(out.warnings);
            let result = out.result;
            output.market_prices.insert(ticker.clone(), result.price);
            output
                .fcfe_simulations
                .insert(ticker.clone(), result.fcfe.per_iteration);
            output
                .fcff_simulations
                .insert(ticker.clone(), result.fcff.per_iteration);
        } else if let Some(price) = inputs.price.to_f64() {
            output.market_prices.insert(ticker.clone(), price);
        }
        output.rows.push(row);
    }

    if !output.failures.is_empty() {
        warnings.push(format!(
            "{} of {} tickers reported failures",
            output.failures.len(),
            records.len()
        ));
    }
    info!(
        tickers = records.len(),
        valued = output.rows.len(),
        failures = output.failures.len(),
        "universe valuation complete"
    );

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata_f64(
        "Universe DCF valuation with per-ticker error isolation",
        &serde_json::json!({
            "tickers": records.len(),
            "num_simulations": config.num_simulations,
            "seed": config.seed,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Seed for the `index`-th ticker of a seeded universe run.
pub fn ticker_seed(base_seed: u64, index: usize) -> u64 {
    splitmix64(base_seed.wrapping_add(index as u64))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn apply_deterministic(row: &mut SummaryRow, dcf: &DcfOutput) {
    fn fill(summary: &mut MethodSummary, m: &MethodValuation) {
        summary.intrinsic_value_per_share = Some(m.intrinsic_value_per_share);
        summary.margin_of_safety = Some(m.margin_of_safety);
    }
    fill(&mut row.fcfe, &dcf.fcfe);
    fill(&mut row.fcff, &dcf.fcff);
    row.deterministic_signal = Some(dcf.signal);
}

fn apply_probabilistic(row: &mut SummaryRow, valuation: &ProbabilisticValuation) {
    fn fill(summary: &mut MethodSummary, sim: &MethodSimulation) {
        if let Some(stats) = &sim.statistics {
            summary.simulated_mean = Some(stats.mean);
            summary.std_dev = Some(stats.std_dev);
            summary.percentiles = Some(stats.percentiles.clone());
            summary.probability_undervalued = Some(stats.probability_undervalued);
        }
    }
    fill(&mut row.fcfe, &valuation.fcfe);
    fill(&mut row.fcff, &valuation.fcff);
    row.simulated_signal = Some(valuation.signal);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
