use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use statrs::distribution::Beta;
use std::f64::consts::PI;

use crate::error::ValuationError;
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// SplitMix64 finaliser, used to decorrelate nearby seeds.
pub fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Generator owned by a single iteration, seeded from `splitmix64(base_seed ^ index)`.
pub fn iteration_rng(base_seed: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(splitmix64(base_seed ^ index))
}

// ---------------------------------------------------------------------------
// Draws
// ---------------------------------------------------------------------------

/// Normal draw by the Box-Muller transform. A zero standard deviation
/// returns the mean without consuming randomness.
///
/// Drawn directly rather than through `statrs::distribution::Normal` so that
/// each draw consumes exactly two uniforms from the iteration's generator.
pub fn sample_normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> ValuationResult<f64> {
    if !std_dev.is_finite() || std_dev < 0.0 {
        return Err(ValuationError::InvalidInput {
            field: "std_dev".into(),
            reason: format!("Standard deviation must be finite and non-negative, got {std_dev}"),
        });
    }
    if std_dev == 0.0 {
        return Ok(mean);
    }
    // u1 in (0, 1] keeps ln(u1) finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    Ok(mean + std_dev * z)
}

/// `exp(N(mean_of_log, stddev_of_log))`. Non-finite draws are retried up to
/// `max_attempts` times, then the median `exp(mean_of_log)` is returned.
///
/// The flag is true when the fallback was used.
pub fn sample_lognormal<R: Rng>(
    rng: &mut R,
    mean_of_log: f64,
    stddev_of_log: f64,
    max_attempts: u32,
) -> ValuationResult<(f64, bool)> {
    for _ in 0..max_attempts {
        let value = sample_normal(rng, mean_of_log, stddev_of_log)?.exp();
        if value.is_finite() {
            return Ok((value, false));
        }
    }
    Ok((mean_of_log.exp(), true))
}

/// Standard Beta(alpha, beta) draw rescaled to `[lower, upper]`.
pub fn sample_beta<R: Rng>(
    rng: &mut R,
    alpha: f64,
    beta: f64,
    lower: f64,
    upper: f64,
) -> ValuationResult<f64> {
    let dist = Beta::new(alpha, beta).map_err(|e| ValuationError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Beta parameters: {e}"),
    })?;
    let unit: f64 = rng.sample(dist);
    Ok(lower + (upper - lower) * unit)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Drop zero, NaN and infinite entries. Fewer than two survivors is an error.
pub fn clean_array(values: &[f64]) -> ValuationResult<Vec<f64>> {
    let cleaned: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v != 0.0)
        .collect();
    if cleaned.len() < 2 {
        return Err(ValuationError::InsufficientData(format!(
            "{} usable values after cleaning, at least 2 required",
            cleaned.len()
        )));
    }
    Ok(cleaned)
}

/// Cap `value` at `reference_median * threshold`.
pub fn squash(value: f64, threshold: f64, reference_median: f64) -> f64 {
    let cap = reference_median * threshold;
    if value > cap {
        cap
    } else {
        value
    }
}

/// Moment-match an arithmetic mean and standard deviation to the parameters
/// of the underlying normal: `sigma^2 = ln(1 + sd^2 / mean^2)`,
/// `mu = ln(mean) - sigma^2 / 2`.
pub fn lognormal_params(mean: f64, std_dev: f64) -> ValuationResult<(f64, f64)> {
    if !mean.is_finite() || mean <= 0.0 {
        return Err(ValuationError::InvalidInput {
            field: "mean".into(),
            reason: format!("Lognormal mean must be positive and finite, got {mean}"),
        });
    }
    if !std_dev.is_finite() || std_dev < 0.0 {
        return Err(ValuationError::InvalidInput {
            field: "std_dev".into(),
            reason: format!("Standard deviation must be finite and non-negative, got {std_dev}"),
        });
    }
    let variance_of_log = (1.0 + (std_dev / mean).powi(2)).ln();
    let mean_of_log = mean.ln() - variance_of_log / 2.0;
    Ok((mean_of_log, variance_of_log.sqrt()))
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
