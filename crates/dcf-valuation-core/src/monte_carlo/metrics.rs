use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValuationError;
use crate::inputs::TimeSeriesInputs;
use crate::ValuationResult;

use super::sampling::{clean_array, mean_std};

/// Cleaned per-year observations of one ratio with their moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEstimate {
    pub samples: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl MetricEstimate {
    fn from_raw(name: &str, raw: &[f64]) -> ValuationResult<Self> {
        let samples = clean_array(raw).map_err(|e| match e {
            ValuationError::InsufficientData(msg) => {
                ValuationError::InsufficientData(format!("{name}: {msg}"))
            }
            other => other,
        })?;
        let (mean, std_dev) = mean_std(&samples);
        Ok(MetricEstimate {
            samples,
            mean,
            std_dev,
        })
    }
}

/// Empirical growth drivers from the annual history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmpiricalMetrics {
    pub return_on_equity: MetricEstimate,
    pub retention_ratio: MetricEstimate,
    pub return_on_invested_capital: MetricEstimate,
    pub reinvestment_rate: MetricEstimate,
}

/// Per-year ROE, retention, ROIC and reinvestment rate, cleaned of zero and
/// non-finite entries.
///
/// Series are ordered most recent first, so the working capital change for
/// year `i` is `WC[i] - WC[i + 1]` and the oldest year has no reinvestment
/// observation.
pub fn estimate_metrics(
    series: &TimeSeriesInputs,
    tax_rate: f64,
) -> ValuationResult<EmpiricalMetrics> {
    series.validate()?;
    let years = series.years();

    let mut roe = Vec::with_capacity(years);
    let mut retention = Vec::with_capacity(years);
    let mut roic = Vec::with_capacity(years);
    let mut reinvestment = Vec::with_capacity(years.saturating_sub(1));

    for i in 0..years {
        let ni = series.net_income[i];
        let nopat = series.ebit[i] * (1.0 - tax_rate);

        roe.push(ni / series.book_value_equity[i]);
        retention.push(1.0 - series.dividends_paid[i] / ni);
        roic.push(nopat / series.invested_capital[i]);

        if i + 1 < years {
            let wc = series.current_assets[i] - series.current_liabilities[i];
            let prior_wc = series.current_assets[i + 1] - series.current_liabilities[i + 1];
            let net_reinvestment = series.capex[i] - series.depreciation[i] + (wc - prior_wc);
            reinvestment.push(net_reinvestment / nopat);
        }
    }

    let metrics = EmpiricalMetrics {
        return_on_equity: MetricEstimate::from_raw("return_on_equity", &roe)?,
        retention_ratio: MetricEstimate::from_raw("retention_ratio", &retention)?,
        return_on_invested_capital: MetricEstimate::from_raw("return_on_invested_capital", &roic)?,
        reinvestment_rate: MetricEstimate::from_raw("reinvestment_rate", &reinvestment)?,
    };
    debug!(
        roe = metrics.return_on_equity.mean,
        retention = metrics.retention_ratio.mean,
        roic = metrics.return_on_invested_capital.mean,
        reinvestment = metrics.reinvestment_rate.mean,
        "empirical metrics estimated"
    );
    Ok(metrics)
}
