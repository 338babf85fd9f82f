use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::types::Method;
use crate::ValuationResult;

use super::projection::ProjectionBase;
use super::sampling::sample_normal;

/// Cost of equity and WACC for one iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiscountRates {
    pub cost_of_equity: f64,
    pub wacc: f64,
}

impl DiscountRates {
    pub fn for_method(&self, method: Method) -> f64 {
        match method {
            Method::Fcfe => self.cost_of_equity,
            Method::Fcff => self.wacc,
        }
    }
}

/// Discount rate model over the `f64` snapshot. Fixed unless
/// `stochastic` is set, in which case rfr, unlevered beta and ERP are
/// redrawn each iteration around their base values.
#[derive(Debug, Clone)]
pub struct DiscountModel {
    pub risk_free_rate: f64,
    pub unlevered_beta: f64,
    pub equity_risk_premium: f64,
    pub stochastic: bool,
    pub rfr_volatility: f64,
    pub beta_volatility: f64,
    pub erp_volatility: f64,
    debt_equity: f64,
    equity_weight: f64,
    debt_weight: f64,
    after_tax_cost_of_borrowing: f64,
    after_tax: f64,
}

impl DiscountModel {
    pub fn new(base: &ProjectionBase, config: &SimulationConfig) -> Self {
        let total_capital = base.market_value_equity + base.market_value_debt;
        let after_tax = 1.0 - base.tax_rate;
        DiscountModel {
            risk_free_rate: base.risk_free_rate,
            unlevered_beta: base.unlevered_beta,
            equity_risk_premium: base.equity_risk_premium,
            stochastic: config.stochastic_discount_rates,
            rfr_volatility: config.rfr_volatility,
            beta_volatility: config.beta_volatility,
            erp_volatility: config.erp_volatility,
            debt_equity: base.market_value_debt / base.market_value_equity,
            equity_weight: base.market_value_equity / total_capital,
            debt_weight: base.market_value_debt / total_capital,
            after_tax_cost_of_borrowing: base.interest_expense / base.total_debt * after_tax,
            after_tax,
        }
    }

    /// Rates at the base market inputs.
    pub fn base_rates(&self) -> DiscountRates {
        self.rates_at(
            self.risk_free_rate,
            self.unlevered_beta,
            self.equity_risk_premium,
        )
    }

    /// Draw this iteration's rates. Deterministic mode consumes no randomness.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ValuationResult<DiscountRates> {
        if !self.stochastic {
            return Ok(self.base_rates());
        }
        let rfr = sample_normal(rng, self.risk_free_rate, self.rfr_volatility)?;
        let beta_u = sample_normal(rng, self.unlevered_beta, self.beta_volatility)?;
        let erp = sample_normal(rng, self.equity_risk_premium, self.erp_volatility)?;
        Ok(self.rates_at(rfr, beta_u, erp))
    }

    fn rates_at(&self, rfr: f64, beta_u: f64, erp: f64) -> DiscountRates {
        let levered_beta = beta_u * (1.0 + self.after_tax * self.debt_equity);
        let cost_of_equity = rfr + levered_beta * erp;
        DiscountRates {
            cost_of_equity,
            wacc: self.equity_weight * cost_of_equity
                + self.debt_weight * self.after_tax_cost_of_borrowing,
        }
    }
}
