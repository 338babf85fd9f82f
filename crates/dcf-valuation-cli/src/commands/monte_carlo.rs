use clap::Args;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use dcf_valuation_core::batch::{value_universe, UniverseRecord};
use dcf_valuation_core::config::SimulationConfig;
use dcf_valuation_core::monte_carlo::frontier::{calculate_frontier, FrontierInput};

use crate::input;

/// Arguments for the batch probabilistic valuation
#[derive(Args)]
pub struct SimulateArgs {
    /// JSON or YAML list of universe records
    #[arg(long)]
    pub input: Option<String>,

    /// JSON or YAML simulation configuration
    #[arg(long)]
    pub config: Option<String>,

    /// Override the number of simulations
    #[arg(long)]
    pub simulations: Option<u32>,

    /// Override the base seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run iterations on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Directory for simulations_fcfe.csv, simulations_fcff.csv and market_prices.csv
    #[arg(long)]
    pub simulations_out: Option<String>,
}

/// Arguments for the tail-risk frontier inputs
#[derive(Args)]
pub struct FrontierArgs {
    /// JSON or YAML file with assets (ticker, price, simulations) and optional weights
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let records: Vec<UniverseRecord> = input::load(args.input.as_deref(), "simulation")?;
    let mut config: SimulationConfig = match args.config {
        Some(ref path) => input::file::read_input(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(n) = args.simulations {
        config.num_simulations = n;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.sequential {
        config.parallel = false;
    }

    let result = value_universe(&records, &config)?;

    if let Some(ref dir) = args.simulations_out {
        let dir = Path::new(dir);
        fs::create_dir_all(dir)?;
        let out = &result.result;
        write_matrix(&dir.join("simulations_fcfe.csv"), &out.fcfe_simulations)?;
        write_matrix(&dir.join("simulations_fcff.csv"), &out.fcff_simulations)?;
        write_prices(&dir.join("market_prices.csv"), &out.market_prices)?;
        info!(dir = %dir.display(), "simulation matrices written");
    }

    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let frontier_input: FrontierInput = input::load(args.input.as_deref(), "frontier")?;
    let result = calculate_frontier(&frontier_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Tickers as columns, one row per iteration. Excluded iterations are
/// written as empty cells.
fn write_matrix(
    path: &Path,
    matrix: &BTreeMap<String, Vec<Option<f64>>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(matrix.keys())?;
    let rows = matrix.values().map(Vec::len).max().unwrap_or(0);
    for i in 0..rows {
        let record: Vec<String> = matrix
            .values()
            .map(|col| {
                col.get(i)
                    .copied()
                    .flatten()
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_prices(
    path: &Path,
    prices: &BTreeMap<String, f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["ticker", "price"])?;
    for (ticker, price) in prices {
        wtr.write_record([ticker.as_str(), &price.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
