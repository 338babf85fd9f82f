use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::inputs::ValidatedInputs;
use crate::types::{Method, Money, Rate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Latest-year profitability and reinvestment ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthDrivers {
    /// Net income / book equity
    pub return_on_equity: Rate,
    /// 1 - dividends / net income
    pub retention_ratio: Rate,
    /// EBIT * (1 - t)
    pub nopat: Money,
    /// NOPAT / invested capital
    pub return_on_invested_capital: Rate,
    /// Change in (current assets - current liabilities) over the year
    pub delta_working_capital: Money,
    /// (capex - depreciation + change in working capital) / NOPAT
    pub reinvestment_rate: Rate,
    /// Income tax expense / EBIT, reported for reference only
    pub effective_tax_rate: Rate,
}

/// Growth rate for one method, before and after clamping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClampedGrowth {
    pub raw: Rate,
    pub applied: Rate,
    pub clamped: bool,
}

/// Constant growth rates used by the deterministic projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseGrowth {
    pub fcfe: ClampedGrowth,
    pub fcff: ClampedGrowth,
}

impl BaseGrowth {
    pub fn for_method(&self, method: Method) -> ClampedGrowth {
        match method {
            Method::Fcfe => self.fcfe,
            Method::Fcff => self.fcff,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn growth_drivers(inputs: &ValidatedInputs) -> GrowthDrivers {
    let return_on_equity = inputs.net_income / inputs.book_value_equity;
    let retention_ratio = Decimal::ONE - inputs.dividends_paid / inputs.net_income;

    let nopat = inputs.ebit * (Decimal::ONE - inputs.tax_rate);
    let return_on_invested_capital = nopat / inputs.invested_capital;

    let delta_working_capital = inputs.delta_working_capital();
    let reinvestment =
        inputs.capital_expenditure - inputs.depreciation + delta_working_capital;
    let reinvestment_rate = reinvestment / nopat;

    GrowthDrivers {
        return_on_equity,
        retention_ratio,
        nopat,
        return_on_invested_capital,
        delta_working_capital,
        reinvestment_rate,
        effective_tax_rate: inputs.income_tax_expense / inputs.ebit,
    }
}

/// Clamp a growth rate to `[lower, upper]`. Returns the rate and whether it moved.
///
/// Unordered values (NaN) pass through unchanged.
pub fn clamp_growth<T: PartialOrd + Copy>(rate: T, lower: T, upper: T) -> (T, bool) {
    if rate < lower {
        (lower, true)
    } else if rate > upper {
        (upper, true)
    } else {
        (rate, false)
    }
}

/// FCFE growth = ROE x retention; FCFF growth = ROIC x reinvestment rate.
/// Both clamped to the record's bounds; a clamp adds a warning.
pub fn base_growth(
    inputs: &ValidatedInputs,
    drivers: &GrowthDrivers,
    warnings: &mut Vec<String>,
) -> BaseGrowth {
    let fcfe_raw = drivers.return_on_equity * drivers.retention_ratio;
    let fcff_raw = drivers.return_on_invested_capital * drivers.reinvestment_rate;

    BaseGrowth {
        fcfe: apply_bounds(inputs, Method::Fcfe, fcfe_raw, warnings),
        fcff: apply_bounds(inputs, Method::Fcff, fcff_raw, warnings),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn apply_bounds(
    inputs: &ValidatedInputs,
    method: Method,
    raw: Rate,
    warnings: &mut Vec<String>,
) -> ClampedGrowth {
    let (lower, upper) = inputs.growth_bounds.for_method(method);
    let (applied, clamped) = clamp_growth(raw, lower, upper);
    if clamped {
        warn!(ticker = %inputs.ticker, %method, %raw, %applied, "growth rate clamped");
        warnings.push(format!(
            "{method} growth rate {raw} clamped to {applied} (bounds [{lower}, {upper}])"
        ));
    }
    ClampedGrowth {
        raw,
        applied,
        clamped,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
