use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::error::ValuationError;
use crate::types::{Currency, Method, Money, Rate};
use crate::ValuationResult;

/// Minimum number of annual observations for the probabilistic path.
pub const MIN_ANNUAL_OBSERVATIONS: usize = 4;

/// Longest explicit projection horizon accepted.
pub const MAX_PROJECTION_YEARS: u32 = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Clamp bounds applied to base growth rates, per cash flow basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthBounds {
    #[serde(default = "default_lower_bound")]
    pub fcfe_lower: Rate,
    #[serde(default = "default_upper_bound")]
    pub fcfe_upper: Rate,
    #[serde(default = "default_lower_bound")]
    pub fcff_lower: Rate,
    #[serde(default = "default_upper_bound")]
    pub fcff_upper: Rate,
}

fn default_lower_bound() -> Rate {
    dec!(-0.20)
}

fn default_upper_bound() -> Rate {
    dec!(0.50)
}

impl Default for GrowthBounds {
    fn default() -> Self {
        GrowthBounds {
            fcfe_lower: default_lower_bound(),
            fcfe_upper: default_upper_bound(),
            fcff_lower: default_lower_bound(),
            fcff_upper: default_upper_bound(),
        }
    }
}

impl GrowthBounds {
    /// (lower, upper) for the given method.
    pub fn for_method(&self, method: Method) -> (Rate, Rate) {
        match method {
            Method::Fcfe => (self.fcfe_lower, self.fcfe_upper),
            Method::Fcff => (self.fcff_lower, self.fcff_upper),
        }
    }
}

/// Per-ticker snapshot of market data and latest-year financials.
///
/// The short keys produced by the upstream data fetcher (`mve`, `ni`, `capx`,
/// ...) are accepted as aliases of the long field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationInputs {
    /// Ticker symbol
    #[serde(default)]
    pub ticker: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Reporting currency
    #[serde(default)]
    pub currency: Currency,
    /// Market value of equity (market capitalisation)
    #[serde(alias = "mve")]
    pub market_value_equity: Money,
    /// Market value of debt
    #[serde(alias = "mvb")]
    pub market_value_debt: Money,
    /// Risk-free rate
    #[serde(alias = "rfr")]
    pub risk_free_rate: Rate,
    /// Unlevered (asset) beta
    #[serde(alias = "beta_u")]
    pub unlevered_beta: Decimal,
    /// Equity risk premium
    #[serde(alias = "erp")]
    pub equity_risk_premium: Rate,
    pub interest_expense: Money,
    pub total_debt: Money,
    /// Corporate tax rate
    #[serde(alias = "ctr")]
    pub tax_rate: Rate,
    /// Target debt ratio, used to finance reinvestment in the FCFE projection
    #[serde(alias = "tdr")]
    pub target_debt_ratio: Rate,
    #[serde(alias = "ni")]
    pub net_income: Money,
    #[serde(alias = "bve")]
    pub book_value_equity: Money,
    /// Total dividends paid over the latest year
    #[serde(alias = "dp")]
    pub dividends_paid: Money,
    pub ebit: Money,
    /// Income tax provision for the latest year, supplied under the short
    /// key `ite`. Only reported as an effective tax rate; projections and
    /// the cost of capital use `tax_rate`.
    #[serde(alias = "ite")]
    pub income_tax_expense: Money,
    #[serde(alias = "ic")]
    pub invested_capital: Money,
    #[serde(alias = "capx")]
    pub capital_expenditure: Money,
    #[serde(alias = "d")]
    pub depreciation: Money,
    #[serde(alias = "ca")]
    pub current_assets: Money,
    #[serde(alias = "cl")]
    pub current_liabilities: Money,
    #[serde(alias = "prev_ca")]
    pub prior_current_assets: Money,
    #[serde(alias = "prev_cl")]
    pub prior_current_liabilities: Money,
    #[serde(alias = "tgr")]
    pub terminal_growth_rate: Rate,
    /// Explicit projection horizon in years
    #[serde(alias = "h")]
    pub projection_years: u32,
    #[serde(alias = "so")]
    pub shares_outstanding: Decimal,
    /// Current market price per share
    pub price: Money,
    #[serde(default)]
    pub growth_bounds: GrowthBounds,
}

impl ValuationInputs {
    pub fn total_capital(&self) -> Money {
        self.market_value_equity + self.market_value_debt
    }

    pub fn working_capital(&self) -> Money {
        self.current_assets - self.current_liabilities
    }

    pub fn prior_working_capital(&self) -> Money {
        self.prior_current_assets - self.prior_current_liabilities
    }

    pub fn delta_working_capital(&self) -> Money {
        self.working_capital() - self.prior_working_capital()
    }

    /// Validate and wrap the record. This is the only way to obtain a
    /// [`ValidatedInputs`], so every formula downstream may divide freely.
    pub fn validate(self) -> ValuationResult<ValidatedInputs> {
        check_denominators(&self)?;
        check_ranges(&self)?;
        Ok(ValidatedInputs(self))
    }
}

/// A [`ValuationInputs`] record whose denominators and ranges have been checked.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ValidatedInputs(ValuationInputs);

impl ValidatedInputs {
    pub fn into_inner(self) -> ValuationInputs {
        self.0
    }
}

impl Deref for ValidatedInputs {
    type Target = ValuationInputs;

    fn deref(&self) -> &ValuationInputs {
        &self.0
    }
}

impl TryFrom<ValuationInputs> for ValidatedInputs {
    type Error = ValuationError;

    fn try_from(inputs: ValuationInputs) -> ValuationResult<Self> {
        inputs.validate()
    }
}

/// Annual history used by the probabilistic path. Most recent year first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeriesInputs {
    pub net_income: Vec<f64>,
    pub book_value_equity: Vec<f64>,
    pub ebit: Vec<f64>,
    pub invested_capital: Vec<f64>,
    pub capex: Vec<f64>,
    pub depreciation: Vec<f64>,
    pub current_assets: Vec<f64>,
    pub current_liabilities: Vec<f64>,
    #[serde(alias = "dividend_payout")]
    pub dividends_paid: Vec<f64>,
}

impl TimeSeriesInputs {
    /// Check that every series carries enough usable years.
    ///
    /// Ratio denominators and numerators (net income, book equity, EBIT,
    /// invested capital) need non-zero finite values; reinvestment series only
    /// need to be finite, since a zero dividend or capex year is legitimate.
    pub fn validate(&self) -> ValuationResult<()> {
        let strict = [
            ("net_income", &self.net_income),
            ("book_value_equity", &self.book_value_equity),
            ("ebit", &self.ebit),
            ("invested_capital", &self.invested_capital),
        ];
        for (name, series) in strict {
            let valid = series
                .iter()
                .filter(|v| v.is_finite() && **v != 0.0)
                .count();
            require_observations(name, valid)?;
        }

        let lenient = [
            ("capex", &self.capex),
            ("depreciation", &self.depreciation),
            ("current_assets", &self.current_assets),
            ("current_liabilities", &self.current_liabilities),
            ("dividends_paid", &self.dividends_paid),
        ];
        for (name, series) in lenient {
            let valid = series.iter().filter(|v| v.is_finite()).count();
            require_observations(name, valid)?;
        }
        Ok(())
    }

    /// Number of years available across all series.
    pub fn years(&self) -> usize {
        [
            self.net_income.len(),
            self.book_value_equity.len(),
            self.ebit.len(),
            self.invested_capital.len(),
            self.capex.len(),
            self.depreciation.len(),
            self.current_assets.len(),
            self.current_liabilities.len(),
            self.dividends_paid.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_observations(name: &str, valid: usize) -> ValuationResult<()> {
    if valid < MIN_ANNUAL_OBSERVATIONS {
        return Err(ValuationError::InsufficientData(format!(
            "{name}: {valid} valid annual observations, at least {MIN_ANNUAL_OBSERVATIONS} required"
        )));
    }
    Ok(())
}

fn check_denominators(input: &ValuationInputs) -> ValuationResult<()> {
    let denominators = [
        (input.total_debt, "total_debt (cost of borrowing)"),
        (input.market_value_equity, "market_value_equity (leveraged beta)"),
        (input.total_capital(), "total capital (WACC weights)"),
        (input.book_value_equity, "book_value_equity (return on equity)"),
        (input.net_income, "net_income (retention ratio)"),
        (input.invested_capital, "invested_capital (return on invested capital)"),
        (input.ebit, "ebit (reinvestment rate)"),
    ];
    for (value, context) in denominators {
        if value.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: format!("{context} for '{}'", input.ticker),
            });
        }
    }
    Ok(())
}

fn check_ranges(input: &ValuationInputs) -> ValuationResult<()> {
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }
    if input.price <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "price".into(),
            reason: "Market price must be positive".into(),
        });
    }
    if input.projection_years == 0 || input.projection_years > MAX_PROJECTION_YEARS {
        return Err(ValuationError::InvalidInput {
            field: "projection_years".into(),
            reason: format!("Projection horizon must be between 1 and {MAX_PROJECTION_YEARS} years"),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    for method in Method::ALL {
        let (lower, upper) = input.growth_bounds.for_method(method);
        if lower > upper {
            return Err(ValuationError::InvalidInput {
                field: format!("growth_bounds.{}", method.to_string().to_lowercase()),
                reason: format!("Lower bound {lower} exceeds upper bound {upper}"),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
