use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::inputs::{TimeSeriesInputs, ValidatedInputs};
use crate::signal::{PriceRelation, Signal};
use crate::types::{with_metadata_f64, ComputationOutput, Method};
use crate::ValuationResult;

use super::bayesian::DriverDistributions;
use super::discount::{DiscountModel, DiscountRates};
use super::growth::{growth_path, sample_base_growth};
use super::metrics::{estimate_metrics, EmpiricalMetrics};
use super::projection::{project_value, ProjectionBase};
use super::sampling::{iteration_rng, splitmix64};
use super::statistics::{summarize, SummaryStatistics};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Simulation outcome for one cash flow basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSimulation {
    pub method: Method,
    /// Seed the per-iteration generators were derived from
    pub seed: u64,
    pub iterations: u32,
    /// Finite, non-negative per-share values in iteration order
    pub values: Vec<f64>,
    /// One slot per iteration index; `None` where the value was negative or
    /// non-finite. Kept aligned across tickers for the frontier matrix.
    #[serde(skip)]
    pub per_iteration: Vec<Option<f64>>,
    /// `None` when no iteration produced a usable value
    pub statistics: Option<SummaryStatistics>,
    pub negative_count: u32,
    pub failed_count: u32,
    pub clamped_count: u32,
    pub terminal_capped_count: u32,
    pub sampling_fallback_count: u32,
    pub squashed_count: u32,
    pub relation: PriceRelation,
}

impl MethodSimulation {
    pub fn mean(&self) -> Option<f64> {
        self.statistics.as_ref().map(|s| s.mean)
    }
}

/// Probabilistic valuation of one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilisticValuation {
    pub ticker: String,
    pub price: f64,
    pub base_seed: u64,
    pub metrics: EmpiricalMetrics,
    pub distributions: DriverDistributions,
    /// Discount rates at the base market inputs
    pub base_rates: DiscountRates,
    pub fcfe: MethodSimulation,
    pub fcff: MethodSimulation,
    pub signal: Signal,
}

impl ProbabilisticValuation {
    pub fn method(&self, method: Method) -> &MethodSimulation {
        match method {
            Method::Fcfe => &self.fcfe,
            Method::Fcff => &self.fcff,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IterationOutcome {
    value_per_share: f64,
    clamped: bool,
    terminal_capped: bool,
    fell_back: bool,
    squashed: bool,
}

/// Iteration outcomes split into retained values and counters.
#[derive(Debug, Default)]
struct Tally {
    values: Vec<f64>,
    per_iteration: Vec<Option<f64>>,
    negative_count: u32,
    failed_count: u32,
    clamped_count: u32,
    terminal_capped_count: u32,
    sampling_fallback_count: u32,
    squashed_count: u32,
}

/// Read-only state shared by every iteration of one method.
struct MethodContext<'a> {
    base: &'a ProjectionBase,
    distributions: &'a DriverDistributions,
    discount: &'a DiscountModel,
    config: &'a SimulationConfig,
    method: Method,
    seed: u64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Monte Carlo FCFE and FCFF valuation.
///
/// Growth drivers are estimated from the annual history, smoothed toward
/// their priors and redrawn every iteration; each draw is projected along a
/// mean-reverting growth path and discounted at the iteration's cost of
/// equity or WACC. Iterations own their generators, so a seeded run gives
/// the same vectors with or without `parallel`.
pub fn run_probabilistic_valuation(
    inputs: &ValidatedInputs,
    series: &TimeSeriesInputs,
    config: &SimulationConfig,
) -> ValuationResult<ComputationOutput<ProbabilisticValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    config.validate()?;
    let base = ProjectionBase::from_inputs(inputs)?;
    let metrics = estimate_metrics(series, base.tax_rate)?;
    let distributions = DriverDistributions::build(&metrics, config)?;
    let discount = DiscountModel::new(&base, config);
    let base_seed = config.seed.unwrap_or_else(rand::random);

    debug!(
        ticker = %inputs.ticker,
        iterations = config.num_simulations,
        base_seed,
        parallel = config.parallel,
        "starting probabilistic valuation"
    );

    let fcfe = simulate_method(
        &MethodContext {
            base: &base,
            distributions: &distributions,
            discount: &discount,
            config,
            method: Method::Fcfe,
            seed: base_seed,
        },
        &mut warnings,
    )?;
    let fcff = simulate_method(
        &MethodContext {
            base: &base,
            distributions: &distributions,
            discount: &discount,
            config,
            method: Method::Fcff,
            seed: splitmix64(base_seed),
        },
        &mut warnings,
    )?;

    let signal = Signal::from_relations(fcfe.relation, fcff.relation);
    let result = ProbabilisticValuation {
        ticker: inputs.ticker.clone(),
        price: base.price,
        base_seed,
        metrics,
        distributions,
        base_rates: discount.base_rates(),
        fcfe,
        fcff,
        signal,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata_f64(
        "Monte Carlo FCFE/FCFF DCF with Bayesian-smoothed growth drivers",
        &serde_json::json!({
            "ticker": inputs.ticker,
            "num_simulations": config.num_simulations,
            "base_seed": base_seed,
            "prior_weight": config.effective_prior_weight(),
            "stochastic_discount_rates": config.stochastic_discount_rates,
            "time_varying_growth": config.time_varying_growth,
            "mean_reversion_speed": config.mean_reversion_speed,
            "squash_threshold": config.squash_threshold,
            "projection_years": base.projection_years,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn simulate_method(
    ctx: &MethodContext<'_>,
    warnings: &mut Vec<String>,
) -> ValuationResult<MethodSimulation> {
    let n = ctx.config.num_simulations;
    let run = |i: u32| run_iteration(ctx, u64::from(i));

    let outcomes: Vec<IterationOutcome> = if ctx.config.parallel {
        (0..n)
            .into_par_iter()
            .map(run)
            .collect::<ValuationResult<Vec<_>>>()?
    } else {
        (0..n).map(run).collect::<ValuationResult<Vec<_>>>()?
    };

    let Tally {
        values,
        per_iteration,
        negative_count,
        failed_count,
        clamped_count,
        terminal_capped_count,
        sampling_fallback_count,
        squashed_count,
    } = tally_outcomes(&outcomes);

    let method = ctx.method;
    let price = ctx.base.price;
    if negative_count > 0 {
        warnings.push(format!(
            "{method}: {negative_count} of {n} iterations produced negative values and were excluded"
        ));
    }
    if failed_count > 0 {
        warn!(%method, failed_count, "non-finite simulated values dropped");
        warnings.push(format!(
            "{method}: {failed_count} of {n} iterations produced non-finite values and were dropped"
        ));
    }
    if clamped_count > 0 {
        warnings.push(format!(
            "{method}: growth rate clamped in {clamped_count} of {n} iterations"
        ));
    }
    if terminal_capped_count > 0 {
        warnings.push(format!(
            "{method}: terminal growth capped below the discount rate in {terminal_capped_count} of {n} iterations"
        ));
    }
    if sampling_fallback_count > 0 {
        warnings.push(format!(
            "{method}: lognormal sampling fell back to the median in {sampling_fallback_count} of {n} iterations"
        ));
    }

    let statistics = summarize(&values, price);
    if statistics.is_none() {
        warn!(%method, "no usable simulated values");
        warnings.push(format!(
            "{method}: no usable simulated values; treated as below market"
        ));
    }
    let relation = PriceRelation::from_optional(statistics.as_ref().map(|s| s.mean), price);

    debug!(
        %method,
        retained = values.len(),
        negative_count,
        failed_count,
        mean = statistics.as_ref().map(|s| s.mean),
        "method simulation complete"
    );

    Ok(MethodSimulation {
        method,
        seed: ctx.seed,
        iterations: n,
        values,
        per_iteration,
        statistics,
        negative_count,
        failed_count,
        clamped_count,
        terminal_capped_count,
        sampling_fallback_count,
        squashed_count,
        relation,
    })
}

/// Non-finite values count as failed, negative values as excluded; both
/// leave a `None` slot in the per-iteration vector.
fn tally_outcomes(outcomes: &[IterationOutcome]) -> Tally {
    let mut tally = Tally {
        values: Vec::with_capacity(outcomes.len()),
        per_iteration: Vec::with_capacity(outcomes.len()),
        ..Tally::default()
    };
    for outcome in outcomes {
        tally.clamped_count += u32::from(outcome.clamped);
        tally.terminal_capped_count += u32::from(outcome.terminal_capped);
        tally.sampling_fallback_count += u32::from(outcome.fell_back);
        tally.squashed_count += u32::from(outcome.squashed);

        let v = outcome.value_per_share;
        if !v.is_finite() {
            tally.failed_count += 1;
            tally.per_iteration.push(None);
        } else if v < 0.0 {
            tally.negative_count += 1;
            tally.per_iteration.push(None);
        } else {
            tally.values.push(v);
            tally.per_iteration.push(Some(v));
        }
    }
    tally
}

fn run_iteration(ctx: &MethodContext<'_>, index: u64) -> ValuationResult<IterationOutcome> {
    let mut rng = iteration_rng(ctx.seed, index);
    let config = ctx.config;

    let growth = sample_base_growth(
        &mut rng,
        ctx.distributions,
        ctx.method,
        ctx.base.bounds(ctx.method),
        config.max_sampling_attempts,
    )?;
    let rates = ctx.discount.sample(&mut rng)?;
    let path = growth_path(
        growth.applied,
        ctx.base.terminal_growth_rate,
        config.mean_reversion_speed,
        ctx.base.projection_years,
        config.time_varying_growth,
    );
    let value = project_value(ctx.base, ctx.method, &path, rates.for_method(ctx.method));

    Ok(IterationOutcome {
        value_per_share: value.value_per_share,
        clamped: growth.clamped,
        terminal_capped: value.terminal_growth_capped,
        fell_back: growth.fell_back,
        squashed: growth.squashed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValuationError;
    use crate::inputs::fixtures::{sample_inputs, sample_series};

    fn config(seed: u64, n: u32, parallel: bool) -> SimulationConfig {
        SimulationConfig {
            num_simulations: n,
            parallel,
            ..SimulationConfig::seeded(seed)
        }
    }

    #[test]
    fn test_seeded_run_is_reproducible() {
        let inputs = sample_inputs().validate().unwrap();
        let series = sample_series();
        let a = run_probabilistic_valuation(&inputs, &series, &config(11, 300, true)).unwrap();
        let b = run_probabilistic_valuation(&inputs, &series, &config(11, 300, true)).unwrap();
        assert_eq!(a.result.fcfe.values, b.result.fcfe.values);
        assert_eq!(a.result.fcff.values, b.result.fcff.values);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let inputs = sample_inputs().validate().unwrap();
        let series = sample_series();
        let par = run_probabilistic_valuation(&inputs, &series, &config(5, 500, true)).unwrap();
        let seq = run_probabilistic_valuation(&inputs, &series, &config(5, 500, false)).unwrap();
        assert_eq!(par.result.fcfe.values, seq.result.fcfe.values);
        assert_eq!(par.result.fcff.values, seq.result.fcff.values);
        assert_eq!(par.result.fcfe.statistics, seq.result.fcfe.statistics);
    }

    #[test]
    fn test_methods_use_distinct_streams() {
        let inputs = sample_inputs().validate().unwrap();
        let out =
            run_probabilistic_valuation(&inputs, &sample_series(), &config(9, 10, false)).unwrap();
        assert_eq!(out.result.fcfe.seed, 9);
        assert_eq!(out.result.fcff.seed, splitmix64(9));
    }

    #[test]
    fn test_counts_account_for_every_iteration() {
        let inputs = sample_inputs().validate().unwrap();
        let out =
            run_probabilistic_valuation(&inputs, &sample_series(), &config(21, 400, true)).unwrap();
        for method in Method::ALL {
            let sim = out.result.method(method);
            assert_eq!(
                sim.values.len() as u32 + sim.negative_count + sim.failed_count,
                sim.iterations
            );
            assert!(sim.values.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
    }

    #[test]
    fn test_per_iteration_slots_align_with_values() {
        let inputs = sample_inputs().validate().unwrap();
        let out =
            run_probabilistic_valuation(&inputs, &sample_series(), &config(21, 400, true)).unwrap();
        for method in Method::ALL {
            let sim = out.result.method(method);
            assert_eq!(sim.per_iteration.len() as u32, sim.iterations);
            let kept: Vec<f64> = sim.per_iteration.iter().flatten().copied().collect();
            assert_eq!(kept, sim.values);
        }
    }

    fn outcome(value_per_share: f64) -> IterationOutcome {
        IterationOutcome {
            value_per_share,
            clamped: false,
            terminal_capped: false,
            fell_back: false,
            squashed: false,
        }
    }

    #[test]
    fn test_tally_excludes_negative_and_non_finite() {
        let outcomes = [
            outcome(5.0),
            outcome(-1.5),
            outcome(f64::NAN),
            outcome(f64::INFINITY),
            outcome(3.0),
        ];
        let tally = tally_outcomes(&outcomes);
        assert_eq!(tally.values, vec![5.0, 3.0]);
        assert_eq!(tally.per_iteration, vec![Some(5.0), None, None, None, Some(3.0)]);
        assert_eq!(tally.negative_count, 1);
        assert_eq!(tally.failed_count, 2);
    }

    #[test]
    fn test_discount_rate_of_minus_one_counts_as_failed() {
        let inputs = sample_inputs().validate().unwrap();
        let base = ProjectionBase::from_inputs(&inputs).unwrap();
        let path = vec![0.05; base.projection_years as usize];
        let value = project_value(&base, Method::Fcff, &path, -1.0);
        assert!(!value.value_per_share.is_finite());

        let mut failed = outcome(value.value_per_share);
        failed.terminal_capped = value.terminal_growth_capped;
        let tally = tally_outcomes(&[outcome(12.0), failed]);
        assert_eq!(tally.failed_count, 1);
        assert_eq!(tally.negative_count, 0);
        assert_eq!(tally.terminal_capped_count, 1);
        assert_eq!(tally.per_iteration, vec![Some(12.0), None]);
    }

    #[test]
    fn test_single_iteration_has_zero_spread() {
        let inputs = sample_inputs().validate().unwrap();
        let out =
            run_probabilistic_valuation(&inputs, &sample_series(), &config(1, 1, false)).unwrap();
        for method in Method::ALL {
            if let Some(stats) = &out.result.method(method).statistics {
                assert_eq!(stats.count, 1);
                assert_eq!(stats.std_dev, 0.0);
                assert_eq!(stats.min, stats.max);
            }
        }
    }

    #[test]
    fn test_short_series_is_insufficient_data() {
        let inputs = sample_inputs().validate().unwrap();
        let mut series = sample_series();
        series.ebit.truncate(3);
        match run_probabilistic_valuation(&inputs, &series, &config(1, 10, false)) {
            Err(ValuationError::InsufficientData(_)) => {}
            other => panic!("Expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let inputs = sample_inputs().validate().unwrap();
        let bad = SimulationConfig {
            num_simulations: 0,
            ..SimulationConfig::default()
        };
        match run_probabilistic_valuation(&inputs, &sample_series(), &bad) {
            Err(ValuationError::InvalidInput { field, .. }) => {
                assert_eq!(field, "num_simulations")
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_signal_follows_relations() {
        let inputs = sample_inputs().validate().unwrap();
        let out =
            run_probabilistic_valuation(&inputs, &sample_series(), &config(3, 200, true)).unwrap();
        let r = &out.result;
        assert_eq!(r.signal, Signal::from_relations(r.fcfe.relation, r.fcff.relation));
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
