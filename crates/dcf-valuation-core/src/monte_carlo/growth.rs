use rand::Rng;

use crate::types::Method;
use crate::valuation::growth::clamp_growth;
use crate::ValuationResult;

use super::bayesian::DriverDistributions;

/// One iteration's base growth draw for a method.
#[derive(Debug, Clone, Copy)]
pub struct SampledGrowth {
    pub raw: f64,
    pub applied: f64,
    pub clamped: bool,
    /// Any driver hit its lognormal fallback
    pub fell_back: bool,
    /// Any driver was squashed at its cap
    pub squashed: bool,
}

/// Draw the drivers for `method` and combine them into a clamped base rate.
///
/// FCFE: ROE x retention ratio. FCFF: ROIC x reinvestment rate.
pub fn sample_base_growth<R: Rng>(
    rng: &mut R,
    distributions: &DriverDistributions,
    method: Method,
    bounds: (f64, f64),
    max_attempts: u32,
) -> ValuationResult<SampledGrowth> {
    let (profitability, reinvestment) = match method {
        Method::Fcfe => (
            distributions.return_on_equity.draw(rng, max_attempts)?,
            distributions.retention_ratio.draw(rng, max_attempts)?,
        ),
        Method::Fcff => (
            distributions.return_on_invested_capital.draw(rng, max_attempts)?,
            distributions.reinvestment_rate.draw(rng, max_attempts)?,
        ),
    };
    let raw = profitability.value * reinvestment.value;
    let (applied, clamped) = clamp_growth(raw, bounds.0, bounds.1);
    Ok(SampledGrowth {
        raw,
        applied,
        clamped,
        fell_back: profitability.fell_back || reinvestment.fell_back,
        squashed: profitability.squashed || reinvestment.squashed,
    })
}

/// Per-year growth for `years` years.
///
/// Time-varying: `g_t = g_term + (g_0 - g_term) * exp(-speed * t)` for
/// `t = 1..=years`. Otherwise `g_t = g_0` throughout.
pub fn growth_path(
    initial: f64,
    terminal: f64,
    speed: f64,
    years: u32,
    time_varying: bool,
) -> Vec<f64> {
    if !time_varying {
        return vec![initial; years as usize];
    }
    (1..=years)
        .map(|t| terminal + (initial - terminal) * (-speed * t as f64).exp())
        .collect()
}
