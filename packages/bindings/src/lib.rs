use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use dcf_valuation_core::batch::{self, UniverseRecord};
use dcf_valuation_core::config::SimulationConfig;
use dcf_valuation_core::inputs::{TimeSeriesInputs, ValidatedInputs, ValuationInputs};
use dcf_valuation_core::monte_carlo::{frontier, simulation};
use dcf_valuation_core::valuation::scenarios::{self, ScenarioSpec};
use dcf_valuation_core::valuation::sensitivity::{self, SensitivityTarget};
use dcf_valuation_core::valuation::{dcf, wacc};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn validated(input_json: &str) -> NapiResult<ValidatedInputs> {
    let raw: ValuationInputs = serde_json::from_str(input_json).map_err(to_napi_error)?;
    raw.validate().map_err(to_napi_error)
}

#[derive(Deserialize)]
struct SensitivityRequest {
    inputs: ValuationInputs,
    #[serde(default)]
    variables: Vec<SensitivityTarget>,
}

#[derive(Deserialize)]
struct ScenarioRequest {
    inputs: ValuationInputs,
    #[serde(default)]
    scenarios: Option<Vec<ScenarioSpec>>,
}

#[derive(Deserialize)]
struct ProbabilisticRequest {
    inputs: ValuationInputs,
    time_series: TimeSeriesInputs,
    #[serde(default)]
    config: SimulationConfig,
}

#[derive(Deserialize)]
struct UniverseRequest {
    records: Vec<UniverseRecord>,
    #[serde(default)]
    config: SimulationConfig,
}

// ---------------------------------------------------------------------------
// Deterministic
// ---------------------------------------------------------------------------

#[napi]
pub fn cost_of_capital(input_json: String) -> NapiResult<String> {
    let inputs = validated(&input_json)?;
    let output = wacc::calculate_cost_of_capital(&inputs).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn deterministic_valuation(input_json: String) -> NapiResult<String> {
    let inputs = validated(&input_json)?;
    let output = dcf::calculate_dcf(&inputs).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn sensitivity_analysis(request_json: String) -> NapiResult<String> {
    let request: SensitivityRequest =
        serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let inputs = request.inputs.validate().map_err(to_napi_error)?;
    let output =
        sensitivity::calculate_sensitivity(&inputs, &request.variables).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn scenario_analysis(request_json: String) -> NapiResult<String> {
    let request: ScenarioRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let inputs = request.inputs.validate().map_err(to_napi_error)?;
    let specs = request.scenarios.unwrap_or_else(scenarios::default_scenarios);
    let output = scenarios::analyze_scenarios(&inputs, &specs).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Probabilistic
// ---------------------------------------------------------------------------

#[napi]
pub fn probabilistic_valuation(request_json: String) -> NapiResult<String> {
    let request: ProbabilisticRequest =
        serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let inputs = request.inputs.validate().map_err(to_napi_error)?;
    let output =
        simulation::run_probabilistic_valuation(&inputs, &request.time_series, &request.config)
            .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn universe_valuation(request_json: String) -> NapiResult<String> {
    let request: UniverseRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let output = batch::value_universe(&request.records, &request.config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn frontier_inputs(input_json: String) -> NapiResult<String> {
    let input: frontier::FrontierInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = frontier::calculate_frontier(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
