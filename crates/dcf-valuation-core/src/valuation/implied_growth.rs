use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValuationError;
use crate::inputs::ValidatedInputs;
use crate::types::{Method, Money, Rate};
use crate::ValuationResult;

use super::dcf::{constant_path, value_cash_flows};

/// Maximum Newton iterations before falling back to bisection
const NEWTON_MAX_ITERATIONS: u32 = 100;

/// Bisection iterations after a Newton failure
const BISECTION_MAX_ITERATIONS: u32 = 200;

/// Convergence threshold on |V(g) / target - 1|
const CONVERGENCE_THRESHOLD: Decimal = dec!(0.000001);

/// Constant pseudo-derivative scaling of the Newton step
const NEWTON_STEP_SCALE: Decimal = dec!(0.01);

/// Growth rates outside (-0.99, 0.99) leave the Newton domain
const GROWTH_DOMAIN_LIMIT: Decimal = dec!(0.99);

/// Upper bisection bound sits this far below the discount rate
const DISCOUNT_RATE_GAP: Decimal = dec!(0.000001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStage {
    Newton,
    Bisection,
}

/// Growth rate at which the model value matches the market value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedGrowth {
    pub rate: Rate,
    pub converged: bool,
    /// Total iterations across both stages
    pub iterations: u32,
    pub stage: SolverStage,
    /// V(rate) / target - 1 at the returned rate
    pub relative_error: Decimal,
}

/// Root finder for the growth rate that equates model value with a target.
pub trait ImpliedRateSolver {
    /// `value_at(g)` returns the model value at constant growth `g`. The
    /// solution must stay below `discount_rate`.
    fn solve<F>(
        &self,
        value_at: F,
        target: Money,
        initial_guess: Rate,
        discount_rate: Rate,
    ) -> ValuationResult<ImpliedGrowth>
    where
        F: Fn(Rate) -> ValuationResult<Money>;
}

/// Approximate Newton iteration with a constant pseudo-derivative,
/// `g <- g - scale * (V(g) / target - 1)`, falling back to bisection on
/// `[-0.99, discount_rate - 1e-6]`.
#[derive(Debug, Clone)]
pub struct ApproximateNewtonSolver {
    pub max_iterations: u32,
    pub bisection_iterations: u32,
    pub tolerance: Decimal,
    pub step_scale: Decimal,
}

impl Default for ApproximateNewtonSolver {
    fn default() -> Self {
        ApproximateNewtonSolver {
            max_iterations: NEWTON_MAX_ITERATIONS,
            bisection_iterations: BISECTION_MAX_ITERATIONS,
            tolerance: CONVERGENCE_THRESHOLD,
            step_scale: NEWTON_STEP_SCALE,
        }
    }
}

impl ImpliedRateSolver for ApproximateNewtonSolver {
    fn solve<F>(
        &self,
        value_at: F,
        target: Money,
        initial_guess: Rate,
        discount_rate: Rate,
    ) -> ValuationResult<ImpliedGrowth>
    where
        F: Fn(Rate) -> ValuationResult<Money>,
    {
        if target.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "implied growth target value".into(),
            });
        }

        let mut g = initial_guess;
        let mut iterations = 0u32;

        // --- Approximate Newton ---
        while iterations < self.max_iterations {
            if !in_domain(g, discount_rate) {
                break;
            }
            iterations += 1;
            let error = value_at(g)? / target - Decimal::ONE;
            if error.abs() < self.tolerance {
                return Ok(ImpliedGrowth {
                    rate: g,
                    converged: true,
                    iterations,
                    stage: SolverStage::Newton,
                    relative_error: error,
                });
            }
            g -= self.step_scale * error;
        }
        debug!(%g, iterations, "newton stage exhausted, switching to bisection");

        // --- Bisection fallback ---
        let mut lo = -GROWTH_DOMAIN_LIMIT;
        let mut hi = discount_rate - DISCOUNT_RATE_GAP;
        if hi <= lo {
            return Err(ValuationError::FinancialImpossibility(format!(
                "Discount rate {discount_rate} leaves no growth interval to search"
            )));
        }

        let mut f_lo = value_at(lo)? / target - Decimal::ONE;
        let mut mid = (lo + hi) / dec!(2);
        let mut error = f_lo;
        for _ in 0..self.bisection_iterations {
            iterations += 1;
            mid = (lo + hi) / dec!(2);
            error = value_at(mid)? / target - Decimal::ONE;
            if error.abs() < self.tolerance {
                return Ok(ImpliedGrowth {
                    rate: mid,
                    converged: true,
                    iterations,
                    stage: SolverStage::Bisection,
                    relative_error: error,
                });
            }
            if (f_lo < Decimal::ZERO) == (error < Decimal::ZERO) {
                lo = mid;
                f_lo = error;
            } else {
                hi = mid;
            }
        }

        Ok(ImpliedGrowth {
            rate: mid,
            converged: false,
            iterations,
            stage: SolverStage::Bisection,
            relative_error: error,
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Market value the model is solved against: market capitalisation for FCFE,
/// equity plus debt at market for FCFF.
pub fn market_target(inputs: &ValidatedInputs, method: Method) -> Money {
    match method {
        Method::Fcfe => inputs.price * inputs.shares_outstanding,
        Method::Fcff => inputs.total_capital(),
    }
}

/// Solve for the constant growth rate that reproduces the market value.
pub fn implied_growth_rate(
    inputs: &ValidatedInputs,
    method: Method,
    discount_rate: Rate,
    initial_guess: Rate,
    solver: &impl ImpliedRateSolver,
) -> ValuationResult<ImpliedGrowth> {
    let path_len = inputs.projection_years;
    let value_at = |g: Rate| -> ValuationResult<Money> {
        let mut scratch = Vec::new();
        let v = value_cash_flows(
            inputs,
            method,
            &constant_path(g, path_len),
            discount_rate,
            inputs.terminal_growth_rate,
            &mut scratch,
        )?;
        Ok(v.present_value)
    };
    solver.solve(value_at, market_target(inputs, method), initial_guess, discount_rate)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn in_domain(g: Rate, discount_rate: Rate) -> bool {
    g > -GROWTH_DOMAIN_LIMIT && g < GROWTH_DOMAIN_LIMIT && g < discount_rate
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
