use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::inputs::ValidatedInputs;
use crate::types::*;
use crate::ValuationResult;

use super::dcf::{constant_path, value_cash_flows};
use super::growth::{base_growth, growth_drivers, BaseGrowth};
use super::wacc::{compute_cost_of_capital, CostOfCapital};

/// Which valuation input a one-way sweep replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityTarget {
    /// Constant explicit-period growth, both methods
    GrowthRate,
    /// Discount rate, used as both cost of equity and WACC
    DiscountRate,
    TerminalGrowthRate,
}

impl SensitivityTarget {
    pub const ALL: [SensitivityTarget; 3] = [
        SensitivityTarget::GrowthRate,
        SensitivityTarget::DiscountRate,
        SensitivityTarget::TerminalGrowthRate,
    ];

    /// Default sweep: growth -5%..20% by 1%, discount 4%..16% by 0.5%,
    /// terminal 0%..5% by 0.25%.
    pub fn default_sweep(&self) -> SensitivityVariable {
        let (name, min, max, step) = match self {
            SensitivityTarget::GrowthRate => ("growth_rate", dec!(-0.05), dec!(0.20), dec!(0.01)),
            SensitivityTarget::DiscountRate => ("discount_rate", dec!(0.04), dec!(0.16), dec!(0.005)),
            SensitivityTarget::TerminalGrowthRate => {
                ("terminal_growth_rate", dec!(0.0), dec!(0.05), dec!(0.0025))
            }
        };
        SensitivityVariable {
            name: name.into(),
            min,
            max,
            step,
        }
    }
}

/// IVPS under both methods at one sweep value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub value: Rate,
    pub fcfe_ivps: Money,
    pub fcff_ivps: Money,
}

/// One-way sensitivity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityTable {
    pub variable: SensitivityTarget,
    pub rows: Vec<SensitivityRow>,
    /// Row closest to the FCFE base case (base growth, cost of equity or
    /// the record's terminal growth)
    pub base_case_index: usize,
}

/// Output of the deterministic sensitivity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub ticker: String,
    pub price: Money,
    pub tables: Vec<SensitivityTable>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate the sweep values for a sensitivity variable from min to max with step.
pub fn generate_sweep_values(var: &SensitivityVariable) -> ValuationResult<Vec<Decimal>> {
    if var.step <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Step must be positive".into(),
        });
    }
    if var.min > var.max {
        return Err(ValuationError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Min must be <= max".into(),
        });
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    // Ensure max is included if step doesn't land exactly on it
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    if values.is_empty() {
        values.push(var.min);
    }

    Ok(values)
}

/// IVPS for both methods at each value of `variable`, all else at base case.
pub fn sensitivity_table(
    inputs: &ValidatedInputs,
    variable: SensitivityTarget,
    values: &[Rate],
) -> ValuationResult<ComputationOutput<SensitivityTable>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let cost_of_capital = compute_cost_of_capital(inputs);
    let drivers = growth_drivers(inputs);
    let growth = base_growth(inputs, &drivers, &mut warnings);

    let table = build_table(inputs, &cost_of_capital, &growth, variable, values, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-way DCF Sensitivity",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "variable": variable,
            "points": values.len(),
        }),
        warnings,
        elapsed,
        table,
    ))
}

/// Run the default sweeps for the requested variables (all three when empty).
pub fn calculate_sensitivity(
    inputs: &ValidatedInputs,
    variables: &[SensitivityTarget],
) -> ValuationResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let cost_of_capital = compute_cost_of_capital(inputs);
    let drivers = growth_drivers(inputs);
    let growth = base_growth(inputs, &drivers, &mut warnings);

    let targets: &[SensitivityTarget] = if variables.is_empty() {
        &SensitivityTarget::ALL
    } else {
        variables
    };

    let mut tables = Vec::with_capacity(targets.len());
    for &target in targets {
        let values = generate_sweep_values(&target.default_sweep())?;
        tables.push(build_table(
            inputs,
            &cost_of_capital,
            &growth,
            target,
            &values,
            &mut warnings,
        )?);
    }

    let output = SensitivityOutput {
        ticker: inputs.ticker.clone(),
        price: inputs.price,
        tables,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-way DCF Sensitivity (growth, discount, terminal)",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "variables": targets,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn build_table(
    inputs: &ValidatedInputs,
    cost_of_capital: &CostOfCapital,
    growth: &BaseGrowth,
    variable: SensitivityTarget,
    values: &[Rate],
    warnings: &mut Vec<String>,
) -> ValuationResult<SensitivityTable> {
    if values.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Sensitivity sweep needs at least one value".into(),
        ));
    }

    let mut rows = Vec::with_capacity(values.len());
    let mut capped = 0usize;
    for &value in values {
        let mut per_method = [Decimal::ZERO; 2];
        for (slot, method) in Method::ALL.into_iter().enumerate() {
            let (g, r, tgr) = match variable {
                SensitivityTarget::GrowthRate => (
                    value,
                    cost_of_capital.discount_rate(method),
                    inputs.terminal_growth_rate,
                ),
                SensitivityTarget::DiscountRate => (
                    growth.for_method(method).applied,
                    value,
                    inputs.terminal_growth_rate,
                ),
                SensitivityTarget::TerminalGrowthRate => (
                    growth.for_method(method).applied,
                    cost_of_capital.discount_rate(method),
                    value,
                ),
            };
            let mut point_warnings = Vec::new();
            let v = value_cash_flows(
                inputs,
                method,
                &constant_path(g, inputs.projection_years),
                r,
                tgr,
                &mut point_warnings,
            )?;
            if v.terminal_growth_capped {
                capped += 1;
            }
            per_method[slot] = v.value_per_share;
        }
        rows.push(SensitivityRow {
            value,
            fcfe_ivps: per_method[0],
            fcff_ivps: per_method[1],
        });
    }

    if capped > 0 {
        warnings.push(format!(
            "{capped} {variable:?} sensitivity point(s) had terminal growth capped below the discount rate"
        ));
    }

    let reference = match variable {
        SensitivityTarget::GrowthRate => growth.fcfe.applied,
        SensitivityTarget::DiscountRate => cost_of_capital.cost_of_equity,
        SensitivityTarget::TerminalGrowthRate => inputs.terminal_growth_rate,
    };

    Ok(SensitivityTable {
        variable,
        base_case_index: closest_index(values, reference),
        rows,
    })
}

/// Find the closest index to a target value in a sorted list.
fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}
