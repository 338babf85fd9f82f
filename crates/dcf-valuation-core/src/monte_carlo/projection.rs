use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::inputs::ValidatedInputs;
use crate::types::Method;
use crate::ValuationResult;

/// Gap kept between a capped terminal growth rate and the discount rate.
pub const TERMINAL_GROWTH_BUFFER: f64 = 0.001;

/// `f64` snapshot of a validated record, converted once per ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionBase {
    pub market_value_equity: f64,
    pub market_value_debt: f64,
    pub risk_free_rate: f64,
    pub unlevered_beta: f64,
    pub equity_risk_premium: f64,
    pub interest_expense: f64,
    pub total_debt: f64,
    pub tax_rate: f64,
    pub target_debt_ratio: f64,
    pub net_income: f64,
    pub ebit: f64,
    pub capital_expenditure: f64,
    pub depreciation: f64,
    pub working_capital: f64,
    pub terminal_growth_rate: f64,
    pub projection_years: u32,
    pub shares_outstanding: f64,
    pub price: f64,
    pub fcfe_bounds: (f64, f64),
    pub fcff_bounds: (f64, f64),
}

impl ProjectionBase {
    pub fn from_inputs(inputs: &ValidatedInputs) -> ValuationResult<Self> {
        let b = &inputs.growth_bounds;
        Ok(ProjectionBase {
            market_value_equity: to_f64("market_value_equity", inputs.market_value_equity)?,
            market_value_debt: to_f64("market_value_debt", inputs.market_value_debt)?,
            risk_free_rate: to_f64("risk_free_rate", inputs.risk_free_rate)?,
            unlevered_beta: to_f64("unlevered_beta", inputs.unlevered_beta)?,
            equity_risk_premium: to_f64("equity_risk_premium", inputs.equity_risk_premium)?,
            interest_expense: to_f64("interest_expense", inputs.interest_expense)?,
            total_debt: to_f64("total_debt", inputs.total_debt)?,
            tax_rate: to_f64("tax_rate", inputs.tax_rate)?,
            target_debt_ratio: to_f64("target_debt_ratio", inputs.target_debt_ratio)?,
            net_income: to_f64("net_income", inputs.net_income)?,
            ebit: to_f64("ebit", inputs.ebit)?,
            capital_expenditure: to_f64("capital_expenditure", inputs.capital_expenditure)?,
            depreciation: to_f64("depreciation", inputs.depreciation)?,
            working_capital: to_f64("working_capital", inputs.working_capital())?,
            terminal_growth_rate: to_f64("terminal_growth_rate", inputs.terminal_growth_rate)?,
            projection_years: inputs.projection_years,
            shares_outstanding: to_f64("shares_outstanding", inputs.shares_outstanding)?,
            price: to_f64("price", inputs.price)?,
            fcfe_bounds: (
                to_f64("growth_bounds.fcfe_lower", b.fcfe_lower)?,
                to_f64("growth_bounds.fcfe_upper", b.fcfe_upper)?,
            ),
            fcff_bounds: (
                to_f64("growth_bounds.fcff_lower", b.fcff_lower)?,
                to_f64("growth_bounds.fcff_upper", b.fcff_upper)?,
            ),
        })
    }

    pub fn bounds(&self, method: Method) -> (f64, f64) {
        match method {
            Method::Fcfe => self.fcfe_bounds,
            Method::Fcff => self.fcff_bounds,
        }
    }
}

/// Per-share value of one simulated path.
#[derive(Debug, Clone, Copy)]
pub struct PathValue {
    pub value_per_share: f64,
    pub terminal_growth_capped: bool,
}

/// `f64` counterpart of the deterministic projection: cumulative growth
/// factor, year-over-year working capital change, Gordon terminal value.
pub fn project_value(
    base: &ProjectionBase,
    method: Method,
    growth_path: &[f64],
    discount_rate: f64,
) -> PathValue {
    let (terminal_growth, terminal_growth_capped) =
        cap_terminal_growth(base.terminal_growth_rate, discount_rate);
    let after_tax = 1.0 - base.tax_rate;

    let mut factor = 1.0;
    let mut discount = 1.0;
    let mut prev_wc = base.working_capital;
    let mut present_value = 0.0;
    let mut last_cash_flow = f64::NAN;

    for &g in growth_path {
        factor *= 1.0 + g;
        discount /= 1.0 + discount_rate;

        let capex = base.capital_expenditure * factor;
        let depreciation = base.depreciation * factor;
        let wc = base.working_capital * factor;
        let delta_wc = wc - prev_wc;

        let cash_flow = match method {
            Method::Fcfe => {
                let reinvestment = capex - depreciation + delta_wc;
                base.net_income * factor + depreciation - capex - delta_wc
                    + base.target_debt_ratio * reinvestment
            }
            Method::Fcff => base.ebit * factor * after_tax + depreciation - capex - delta_wc,
        };
        present_value += cash_flow * discount;
        last_cash_flow = cash_flow;
        prev_wc = wc;
    }

    let terminal_value =
        last_cash_flow * (1.0 + terminal_growth) / (discount_rate - terminal_growth);
    present_value += terminal_value * discount;

    let value_per_share = match method {
        Method::Fcfe => present_value / base.shares_outstanding,
        Method::Fcff => (present_value - base.total_debt) / base.shares_outstanding,
    };
    PathValue {
        value_per_share,
        terminal_growth_capped,
    }
}

pub fn cap_terminal_growth(terminal_growth: f64, discount_rate: f64) -> (f64, bool) {
    if terminal_growth >= discount_rate {
        (discount_rate - TERMINAL_GROWTH_BUFFER, true)
    } else {
        (terminal_growth, false)
    }
}

fn to_f64(field: &str, value: Decimal) -> ValuationResult<f64> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValuationError::InvalidInput {
            field: field.into(),
            reason: format!("{value} has no finite f64 representation"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::fixtures::sample_inputs;
    use crate::valuation::dcf::{constant_path, value_cash_flows};
    use rust_decimal_macros::dec;

    #[test]
    fn test_matches_decimal_projection() {
        let inputs = sample_inputs().validate().unwrap();
        let base = ProjectionBase::from_inputs(&inputs).unwrap();

        for method in Method::ALL {
            let mut warnings = Vec::new();
            let exact = value_cash_flows(
                &inputs,
                method,
                &constant_path(dec!(0.06), 5),
                dec!(0.10),
                inputs.terminal_growth_rate,
                &mut warnings,
            )
            .unwrap()
            .value_per_share
            .to_f64()
            .unwrap();
            let approx = project_value(&base, method, &[0.06; 5], 0.10).value_per_share;
            assert!(
                ((approx - exact) / exact).abs() < 1e-9,
                "{method}: f64 {approx} vs decimal {exact}"
            );
        }
    }

    #[test]
    fn test_terminal_growth_capped() {
        let inputs = sample_inputs().validate().unwrap();
        let base = ProjectionBase::from_inputs(&inputs).unwrap();
        let value = project_value(&base, Method::Fcfe, &[0.05; 5], 0.02);
        assert!(value.terminal_growth_capped);
        assert!(value.value_per_share.is_finite());

        let (tgr, capped) = cap_terminal_growth(0.03, 0.08);
        assert_eq!((tgr, capped), (0.03, false));
    }

    #[test]
    fn test_bounds_per_method() {
        let inputs = sample_inputs().validate().unwrap();
        let base = ProjectionBase::from_inputs(&inputs).unwrap();
        assert_eq!(base.bounds(Method::Fcfe), (-0.2, 0.5));
        assert_eq!(base.bounds(Method::Fcff), (-0.2, 0.5));
    }
}
