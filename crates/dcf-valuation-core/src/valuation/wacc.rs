use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::inputs::ValidatedInputs;
use crate::types::{with_metadata, ComputationOutput, Method, Rate};
use crate::ValuationResult;

/// Cost of capital for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostOfCapital {
    /// Levered beta via Hamada at the market capital structure
    pub levered_beta: Decimal,
    /// CAPM cost of equity
    pub cost_of_equity: Rate,
    /// Pre-tax cost of borrowing (interest expense / total debt)
    pub cost_of_borrowing: Rate,
    pub after_tax_cost_of_borrowing: Rate,
    /// E / (E + D) at market values
    pub equity_weight: Rate,
    /// D / (E + D) at market values
    pub debt_weight: Rate,
    /// Weighted average cost of capital
    pub wacc: Rate,
}

impl CostOfCapital {
    /// Discount rate for a cash flow basis: cost of equity for FCFE, WACC for FCFF.
    pub fn discount_rate(&self, method: Method) -> Rate {
        match method {
            Method::Fcfe => self.cost_of_equity,
            Method::Fcff => self.wacc,
        }
    }
}

/// Market inputs that the scenario and stochastic paths perturb.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketRates {
    pub risk_free_rate: Rate,
    pub unlevered_beta: Decimal,
    pub equity_risk_premium: Rate,
}

impl MarketRates {
    pub fn from_inputs(inputs: &ValidatedInputs) -> Self {
        MarketRates {
            risk_free_rate: inputs.risk_free_rate,
            unlevered_beta: inputs.unlevered_beta,
            equity_risk_premium: inputs.equity_risk_premium,
        }
    }
}

/// Calculate leveraged beta, cost of equity, cost of borrowing and WACC.
///
/// Beta_L = Beta_U * (1 + (1 - t) * D/E)
/// CE = Rf + Beta_L * ERP
/// CB = interest expense / total debt
/// WACC = E/(E+D) * CE + D/(E+D) * CB * (1 - t)
pub fn calculate_cost_of_capital(
    inputs: &ValidatedInputs,
) -> ValuationResult<ComputationOutput<CostOfCapital>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = compute_cost_of_capital(inputs);

    // --- Reasonableness warnings ---
    if output.levered_beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): verify market data; betas above 3.0 are unusual",
            output.levered_beta
        ));
    }
    if inputs.equity_risk_premium > dec!(0.10) {
        warnings.push(format!(
            "Equity risk premium ({}) exceeds 10%; verify estimate",
            inputs.equity_risk_premium
        ));
    }
    if output.wacc > dec!(0.20) {
        warnings.push(format!(
            "WACC of {} exceeds 20%; appropriate for high-risk situations only",
            output.wacc
        ));
    }
    if output.cost_of_borrowing > output.cost_of_equity {
        warnings.push(format!(
            "Cost of borrowing ({}) exceeds cost of equity ({}); check interest expense and total debt",
            output.cost_of_borrowing, output.cost_of_equity
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "WACC via CAPM with Hamada levered beta",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "risk_free_rate": inputs.risk_free_rate.to_string(),
            "unlevered_beta": inputs.unlevered_beta.to_string(),
            "equity_risk_premium": inputs.equity_risk_premium.to_string(),
            "tax_rate": inputs.tax_rate.to_string(),
            "market_value_equity": inputs.market_value_equity.to_string(),
            "market_value_debt": inputs.market_value_debt.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Cost of capital at the record's own market rates.
pub fn compute_cost_of_capital(inputs: &ValidatedInputs) -> CostOfCapital {
    compute_with_rates(inputs, &MarketRates::from_inputs(inputs))
}

/// Cost of capital with the market rates replaced.
pub fn compute_with_rates(inputs: &ValidatedInputs, rates: &MarketRates) -> CostOfCapital {
    let total_capital = inputs.total_capital();
    let equity_weight = inputs.market_value_equity / total_capital;
    let debt_weight = inputs.market_value_debt / total_capital;

    let levered_beta = relever_beta(
        rates.unlevered_beta,
        inputs.tax_rate,
        inputs.market_value_debt / inputs.market_value_equity,
    );
    let cost_of_equity = rates.risk_free_rate + levered_beta * rates.equity_risk_premium;
    let cost_of_borrowing = inputs.interest_expense / inputs.total_debt;
    let after_tax_cost_of_borrowing = cost_of_borrowing * (Decimal::ONE - inputs.tax_rate);
    let wacc = equity_weight * cost_of_equity + debt_weight * after_tax_cost_of_borrowing;

    CostOfCapital {
        levered_beta,
        cost_of_equity,
        cost_of_borrowing,
        after_tax_cost_of_borrowing,
        equity_weight,
        debt_weight,
        wacc,
    }
}

/// Re-lever a beta using the Hamada equation.
///
/// Beta_L = Beta_U * (1 + (1 - t) * D/E)
pub fn relever_beta(unlevered_beta: Decimal, tax_rate: Rate, debt_equity: Decimal) -> Decimal {
    unlevered_beta * (Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
