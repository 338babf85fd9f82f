use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::inputs::ValidatedInputs;
use crate::types::*;
use crate::ValuationResult;

use super::dcf::{constant_path, value_cash_flows};
use super::growth::{base_growth, growth_drivers};
use super::wacc::compute_cost_of_capital;

/// Additive shifts applied to the base case, with a scenario probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub probability: Rate,
    #[serde(default)]
    pub growth_shift: Rate,
    /// Added to both cost of equity and WACC
    #[serde(default)]
    pub discount_shift: Rate,
    #[serde(default)]
    pub terminal_shift: Rate,
}

/// Result for a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub probability: Rate,
    pub cost_of_equity: Rate,
    pub wacc: Rate,
    pub fcfe_growth: Rate,
    pub fcff_growth: Rate,
    pub terminal_growth_rate: Rate,
    pub fcfe_ivps: Money,
    pub fcff_ivps: Money,
    pub fcfe_deviation_from_base: Money,
    pub fcff_deviation_from_base: Money,
    pub fcfe_deviation_pct: Rate,
    pub fcff_deviation_pct: Rate,
}

/// Output of scenario analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub ticker: String,
    pub price: Money,
    pub base_fcfe_ivps: Money,
    pub base_fcff_ivps: Money,
    pub results: Vec<ScenarioResult>,
    pub probability_weighted_fcfe_ivps: Money,
    pub probability_weighted_fcff_ivps: Money,
}

/// Bear / Base / Bull with 25% / 50% / 25% weights.
pub fn default_scenarios() -> Vec<ScenarioSpec> {
    vec![
        ScenarioSpec {
            name: "Bear".into(),
            probability: dec!(0.25),
            growth_shift: dec!(-0.03),
            discount_shift: dec!(0.01),
            terminal_shift: dec!(-0.005),
        },
        ScenarioSpec {
            name: "Base".into(),
            probability: dec!(0.50),
            growth_shift: Decimal::ZERO,
            discount_shift: Decimal::ZERO,
            terminal_shift: Decimal::ZERO,
        },
        ScenarioSpec {
            name: "Bull".into(),
            probability: dec!(0.25),
            growth_shift: dec!(0.03),
            discount_shift: dec!(-0.01),
            terminal_shift: dec!(0.005),
        },
    ]
}

/// Value each scenario and the probability-weighted IVPS.
///
/// Probabilities must each lie in [0, 1] and sum to 1 within 0.001.
pub fn analyze_scenarios(
    inputs: &ValidatedInputs,
    scenarios: &[ScenarioSpec],
) -> ValuationResult<ComputationOutput<ScenarioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_probabilities(scenarios, &mut warnings)?;

    let cost_of_capital = compute_cost_of_capital(inputs);
    let drivers = growth_drivers(inputs);
    let growth = base_growth(inputs, &drivers, &mut warnings);

    let value_at = |method: Method,
                    g: Rate,
                    r: Rate,
                    tgr: Rate,
                    warnings: &mut Vec<String>|
     -> ValuationResult<Money> {
        let v = value_cash_flows(
            inputs,
            method,
            &constant_path(g, inputs.projection_years),
            r,
            tgr,
            warnings,
        )?;
        Ok(v.value_per_share)
    };

    let base_fcfe_ivps = value_at(
        Method::Fcfe,
        growth.fcfe.applied,
        cost_of_capital.cost_of_equity,
        inputs.terminal_growth_rate,
        &mut warnings,
    )?;
    let base_fcff_ivps = value_at(
        Method::Fcff,
        growth.fcff.applied,
        cost_of_capital.wacc,
        inputs.terminal_growth_rate,
        &mut warnings,
    )?;

    let mut results = Vec::with_capacity(scenarios.len());
    let mut weighted_fcfe = Decimal::ZERO;
    let mut weighted_fcff = Decimal::ZERO;

    for scenario in scenarios {
        let cost_of_equity = cost_of_capital.cost_of_equity + scenario.discount_shift;
        let wacc = cost_of_capital.wacc + scenario.discount_shift;
        let fcfe_growth = growth.fcfe.applied + scenario.growth_shift;
        let fcff_growth = growth.fcff.applied + scenario.growth_shift;
        let terminal_growth_rate = inputs.terminal_growth_rate + scenario.terminal_shift;

        let mut scenario_warnings = Vec::new();
        let fcfe_ivps = value_at(
            Method::Fcfe,
            fcfe_growth,
            cost_of_equity,
            terminal_growth_rate,
            &mut scenario_warnings,
        )?;
        let fcff_ivps = value_at(
            Method::Fcff,
            fcff_growth,
            wacc,
            terminal_growth_rate,
            &mut scenario_warnings,
        )?;
        warnings.extend(
            scenario_warnings
                .into_iter()
                .map(|w| format!("[{}] {w}", scenario.name)),
        );

        weighted_fcfe += scenario.probability * fcfe_ivps;
        weighted_fcff += scenario.probability * fcff_ivps;

        results.push(ScenarioResult {
            name: scenario.name.clone(),
            probability: scenario.probability,
            cost_of_equity,
            wacc,
            fcfe_growth,
            fcff_growth,
            terminal_growth_rate,
            fcfe_ivps,
            fcff_ivps,
            fcfe_deviation_from_base: fcfe_ivps - base_fcfe_ivps,
            fcff_deviation_from_base: fcff_ivps - base_fcff_ivps,
            fcfe_deviation_pct: deviation_pct(fcfe_ivps, base_fcfe_ivps),
            fcff_deviation_pct: deviation_pct(fcff_ivps, base_fcff_ivps),
        });
    }

    let output = ScenarioOutput {
        ticker: inputs.ticker.clone(),
        price: inputs.price,
        base_fcfe_ivps,
        base_fcff_ivps,
        results,
        probability_weighted_fcfe_ivps: weighted_fcfe,
        probability_weighted_fcff_ivps: weighted_fcff,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bear/Base/Bull DCF Scenario Analysis",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "scenarios": scenarios,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_probabilities(
    scenarios: &[ScenarioSpec],
    warnings: &mut Vec<String>,
) -> ValuationResult<()> {
    if scenarios.is_empty() {
        return Err(ValuationError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }

    for s in scenarios {
        if s.probability < Decimal::ZERO || s.probability > Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: format!("scenario:{} probability", s.name),
                reason: "Probability must be between 0 and 1".into(),
            });
        }
    }

    let total_prob: Decimal = scenarios.iter().map(|s| s.probability).sum();
    let prob_tolerance = dec!(0.001);
    if (total_prob - Decimal::ONE).abs() > prob_tolerance {
        return Err(ValuationError::InvalidInput {
            field: "probabilities".into(),
            reason: format!("Probabilities must sum to 1.0 (got {total_prob})"),
        });
    }
    if total_prob != Decimal::ONE {
        warnings.push(format!(
            "Probabilities sum to {total_prob}; treated as approximately 1.0"
        ));
    }
    Ok(())
}

fn deviation_pct(value: Money, base: Money) -> Rate {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        (value - base) / base
    }
}
