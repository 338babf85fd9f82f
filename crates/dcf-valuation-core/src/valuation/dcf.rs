use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ValuationError;
use crate::inputs::ValidatedInputs;
use crate::signal::{PriceRelation, Signal};
use crate::types::{with_metadata, ComputationOutput, Method, Money, ProjectionPeriod, Rate};
use crate::ValuationResult;

use super::growth::{base_growth, growth_drivers, ClampedGrowth, GrowthDrivers};
use super::implied_growth::{implied_growth_rate, ApproximateNewtonSolver, ImpliedGrowth};
use super::wacc::{compute_cost_of_capital, CostOfCapital};

/// Gap kept between the discount rate and a capped terminal growth rate.
pub const TERMINAL_GROWTH_BUFFER: Decimal = dec!(0.001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One explicit projection year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearProjection {
    pub period: ProjectionPeriod,
    pub growth_rate: Rate,
    pub net_income: Money,
    pub ebit: Money,
    pub capital_expenditure: Money,
    pub depreciation: Money,
    pub working_capital: Money,
    pub delta_working_capital: Money,
    /// Capex - depreciation + change in working capital
    pub reinvestment: Money,
    /// FCFE or FCFF depending on the method
    pub cash_flow: Money,
    pub discount_factor: Rate,
    pub present_value: Money,
}

/// Projected and discounted cash flows for one method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowValuation {
    pub method: Method,
    pub discount_rate: Rate,
    /// Terminal growth actually used (after any cap)
    pub terminal_growth_rate: Rate,
    pub terminal_growth_capped: bool,
    pub projections: Vec<YearProjection>,
    pub pv_explicit: Money,
    pub terminal_value: Money,
    pub pv_terminal: Money,
    /// Equity value (FCFE) or firm value (FCFF)
    pub present_value: Money,
    /// Intrinsic value per share
    pub value_per_share: Money,
}

/// Deterministic valuation result for one method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodValuation {
    pub method: Method,
    pub growth: ClampedGrowth,
    pub valuation: CashFlowValuation,
    pub intrinsic_value_per_share: Money,
    /// (IVPS - price) / price
    pub margin_of_safety: Rate,
    /// Constant growth rate at which the model reproduces the market value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_growth: Option<ImpliedGrowth>,
    pub relation: PriceRelation,
}

/// Output of the deterministic valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    pub ticker: String,
    pub price: Money,
    pub cost_of_capital: CostOfCapital,
    pub drivers: GrowthDrivers,
    pub fcfe: MethodValuation,
    pub fcff: MethodValuation,
    pub signal: Signal,
}

impl DcfOutput {
    pub fn method(&self, method: Method) -> &MethodValuation {
        match method {
            Method::Fcfe => &self.fcfe,
            Method::Fcff => &self.fcff,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the deterministic FCFE and FCFF valuation with implied growth rates.
pub fn calculate_dcf(inputs: &ValidatedInputs) -> ValuationResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let cost_of_capital = compute_cost_of_capital(inputs);
    let drivers = growth_drivers(inputs);
    let growth = base_growth(inputs, &drivers, &mut warnings);
    debug!(
        ticker = %inputs.ticker,
        cost_of_equity = %cost_of_capital.cost_of_equity,
        wacc = %cost_of_capital.wacc,
        fcfe_growth = %growth.fcfe.applied,
        fcff_growth = %growth.fcff.applied,
        "deterministic inputs resolved"
    );

    let solver = ApproximateNewtonSolver::default();
    let mut value_method = |method: Method| -> ValuationResult<MethodValuation> {
        let g = growth.for_method(method);
        let discount_rate = cost_of_capital.discount_rate(method);
        let path = constant_path(g.applied, inputs.projection_years);
        let valuation = value_cash_flows(
            inputs,
            method,
            &path,
            discount_rate,
            inputs.terminal_growth_rate,
            &mut warnings,
        )?;

        let implied_growth =
            match implied_growth_rate(inputs, method, discount_rate, g.applied, &solver) {
                Ok(implied) => {
                    if !implied.converged {
                        warnings.push(format!(
                            "{method} implied growth solver did not converge; best estimate {} returned",
                            implied.rate
                        ));
                    }
                    Some(implied)
                }
                Err(e) => {
                    warnings.push(format!("{method} implied growth unavailable: {e}"));
                    None
                }
            };

        let ivps = valuation.value_per_share;
        Ok(MethodValuation {
            method,
            growth: g,
            intrinsic_value_per_share: ivps,
            margin_of_safety: (ivps - inputs.price) / inputs.price,
            implied_growth,
            relation: PriceRelation::classify_decimal(ivps, inputs.price),
            valuation,
        })
    };

    let fcfe = value_method(Method::Fcfe)?;
    let fcff = value_method(Method::Fcff)?;
    let signal = Signal::from_relations(fcfe.relation, fcff.relation);

    if fcfe.intrinsic_value_per_share < Decimal::ZERO {
        warnings.push("FCFE intrinsic value per share is negative".into());
    }
    if fcff.intrinsic_value_per_share < Decimal::ZERO {
        warnings.push("FCFF intrinsic value per share is negative after debt".into());
    }

    let output = DcfOutput {
        ticker: inputs.ticker.clone(),
        price: inputs.price,
        cost_of_capital,
        drivers,
        fcfe,
        fcff,
        signal,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Deterministic FCFE/FCFF DCF with implied growth",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "projection_years": inputs.projection_years,
            "terminal_growth_rate": inputs.terminal_growth_rate.to_string(),
            "target_debt_ratio": inputs.target_debt_ratio.to_string(),
            "tax_rate": inputs.tax_rate.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Project cash flows along `growth_path` (one rate per year), discount them
/// and add a Gordon terminal value.
///
/// Every driver grows by the cumulative factor `F_t = prod(1 + g_k)`. Working
/// capital changes are taken year over year against the latest actual level.
/// A terminal growth rate at or above the discount rate is capped to
/// `discount_rate - 0.001` with a warning.
pub fn value_cash_flows(
    inputs: &ValidatedInputs,
    method: Method,
    growth_path: &[Rate],
    discount_rate: Rate,
    terminal_growth: Rate,
    warnings: &mut Vec<String>,
) -> ValuationResult<CashFlowValuation> {
    if growth_path.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Growth path must cover at least one year".into(),
        ));
    }
    if discount_rate <= -Decimal::ONE {
        return Err(ValuationError::FinancialImpossibility(format!(
            "Discount rate {discount_rate} must exceed -100%"
        )));
    }

    let (terminal_growth_rate, terminal_growth_capped) =
        cap_terminal_growth(terminal_growth, discount_rate);
    if terminal_growth_capped {
        warn!(
            ticker = %inputs.ticker,
            %method,
            %terminal_growth,
            %discount_rate,
            "terminal growth capped below discount rate"
        );
        warnings.push(format!(
            "{method} terminal growth {terminal_growth} >= discount rate {discount_rate}; capped to {terminal_growth_rate}"
        ));
    }

    let base_working_capital = inputs.working_capital();
    let after_tax = Decimal::ONE - inputs.tax_rate;
    let mut factor = Decimal::ONE;
    let mut prev_working_capital = base_working_capital;
    let mut projections = Vec::with_capacity(growth_path.len());

    for (idx, &g) in growth_path.iter().enumerate() {
        let year = idx as i64 + 1;
        factor *= Decimal::ONE + g;

        let net_income = inputs.net_income * factor;
        let ebit = inputs.ebit * factor;
        let capital_expenditure = inputs.capital_expenditure * factor;
        let depreciation = inputs.depreciation * factor;
        let working_capital = base_working_capital * factor;
        let delta_working_capital = working_capital - prev_working_capital;
        let reinvestment = capital_expenditure - depreciation + delta_working_capital;

        let cash_flow = match method {
            Method::Fcfe => {
                net_income + depreciation - capital_expenditure - delta_working_capital
                    + inputs.target_debt_ratio * reinvestment
            }
            Method::Fcff => {
                ebit * after_tax + depreciation - capital_expenditure - delta_working_capital
            }
        };

        let discount_factor = Decimal::ONE / (Decimal::ONE + discount_rate).powi(year);
        projections.push(YearProjection {
            period: ProjectionPeriod {
                year: year as i32,
                label: format!("Year {year}"),
                is_terminal: false,
            },
            growth_rate: g,
            net_income,
            ebit,
            capital_expenditure,
            depreciation,
            working_capital,
            delta_working_capital,
            reinvestment,
            cash_flow,
            discount_factor,
            present_value: cash_flow * discount_factor,
        });

        prev_working_capital = working_capital;
    }

    let last = projections.last().ok_or_else(|| {
        ValuationError::InsufficientData("No projection years generated".into())
    })?;
    let terminal_value =
        last.cash_flow * (Decimal::ONE + terminal_growth_rate) / (discount_rate - terminal_growth_rate);
    let pv_terminal = terminal_value * last.discount_factor;
    let pv_explicit: Money = projections.iter().map(|p| p.present_value).sum();
    let present_value = pv_explicit + pv_terminal;

    Ok(CashFlowValuation {
        method,
        discount_rate,
        terminal_growth_rate,
        terminal_growth_capped,
        projections,
        pv_explicit,
        terminal_value,
        pv_terminal,
        present_value,
        value_per_share: per_share_value(inputs, method, present_value),
    })
}

/// FCFE: equity value / shares. FCFF: (firm value - total debt) / shares.
pub fn per_share_value(inputs: &ValidatedInputs, method: Method, present_value: Money) -> Money {
    match method {
        Method::Fcfe => present_value / inputs.shares_outstanding,
        Method::Fcff => (present_value - inputs.total_debt) / inputs.shares_outstanding,
    }
}

/// Returns `(effective_terminal_growth, capped)`.
pub fn cap_terminal_growth(terminal_growth: Rate, discount_rate: Rate) -> (Rate, bool) {
    if terminal_growth >= discount_rate {
        (discount_rate - TERMINAL_GROWTH_BUFFER, true)
    } else {
        (terminal_growth, false)
    }
}

/// The same rate for every year of the horizon.
pub fn constant_path(rate: Rate, years: u32) -> Vec<Rate> {
    vec![rate; years as usize]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
