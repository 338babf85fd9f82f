use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use dcf_valuation_core::inputs::{ValidatedInputs, ValuationInputs};
use dcf_valuation_core::types::SensitivityVariable;
use dcf_valuation_core::valuation::dcf::calculate_dcf;
use dcf_valuation_core::valuation::scenarios::{analyze_scenarios, default_scenarios, ScenarioSpec};
use dcf_valuation_core::valuation::sensitivity::{
    calculate_sensitivity, generate_sweep_values, sensitivity_table, SensitivityTarget,
};
use dcf_valuation_core::valuation::wacc::calculate_cost_of_capital;

use crate::input;

/// Arguments shared by the single-ticker commands
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct TickerArgs {
    /// Path to a JSON or YAML valuation record
    #[arg(long)]
    pub input: Option<String>,

    /// Override the terminal growth rate (e.g. 0.025)
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Override the projection horizon in years
    #[arg(long)]
    pub years: Option<u32>,
}

/// Arguments for cost of capital
#[derive(Args)]
pub struct CostOfCapitalArgs {
    #[command(flatten)]
    pub ticker: TickerArgs,
}

/// Arguments for the deterministic DCF
#[derive(Args)]
pub struct DcfArgs {
    #[command(flatten)]
    pub ticker: TickerArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VariableArg {
    Growth,
    Discount,
    Terminal,
}

impl From<VariableArg> for SensitivityTarget {
    fn from(v: VariableArg) -> Self {
        match v {
            VariableArg::Growth => SensitivityTarget::GrowthRate,
            VariableArg::Discount => SensitivityTarget::DiscountRate,
            VariableArg::Terminal => SensitivityTarget::TerminalGrowthRate,
        }
    }
}

/// Arguments for one-way sensitivity
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub ticker: TickerArgs,

    /// Variable to sweep (all three when omitted)
    #[arg(long, value_enum)]
    pub variable: Option<VariableArg>,

    /// Custom sweep as min:max:step (e.g. "0.06:0.12:0.01"); requires --variable
    #[arg(long)]
    pub range: Option<String>,
}

/// Arguments for scenario analysis
#[derive(Args)]
pub struct ScenariosArgs {
    #[command(flatten)]
    pub ticker: TickerArgs,

    /// JSON or YAML list of scenarios (Bear/Base/Bull when omitted)
    #[arg(long)]
    pub scenarios: Option<String>,
}

pub fn run_cost_of_capital(args: CostOfCapitalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = load_inputs(&args.ticker)?;
    let result = calculate_cost_of_capital(&inputs)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = load_inputs(&args.ticker)?;
    let result = calculate_dcf(&inputs)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = load_inputs(&args.ticker)?;

    match (args.variable, args.range.as_deref()) {
        (Some(variable), Some(range)) => {
            let target = SensitivityTarget::from(variable);
            let sweep = parse_range(target, range)?;
            let values = generate_sweep_values(&sweep)?;
            let result = sensitivity_table(&inputs, target, &values)?;
            Ok(serde_json::to_value(result)?)
        }
        (None, Some(_)) => Err("--range requires --variable".into()),
        (variable, None) => {
            let targets: Vec<SensitivityTarget> = variable.map(Into::into).into_iter().collect();
            let result = calculate_sensitivity(&inputs, &targets)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = load_inputs(&args.ticker)?;
    let scenarios: Vec<ScenarioSpec> = match args.scenarios {
        Some(ref path) => input::file::read_input(path)?,
        None => default_scenarios(),
    };
    let result = analyze_scenarios(&inputs, &scenarios)?;
    Ok(serde_json::to_value(result)?)
}

fn load_inputs(args: &TickerArgs) -> Result<ValidatedInputs, Box<dyn std::error::Error>> {
    let mut raw: ValuationInputs = input::load(args.input.as_deref(), "valuation")?;
    if let Some(tgr) = args.terminal_growth {
        raw.terminal_growth_rate = tgr;
    }
    if let Some(years) = args.years {
        raw.projection_years = years;
    }
    Ok(raw.validate()?)
}

fn parse_range(
    target: SensitivityTarget,
    range: &str,
) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = range.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Sweep range must be min:max:step, got '{range}'").into());
    }
    Ok(SensitivityVariable {
        name: target.default_sweep().name,
        min: parts[0].parse()?,
        max: parts[1].parse()?,
        step: parts[2].parse()?,
    })
}
