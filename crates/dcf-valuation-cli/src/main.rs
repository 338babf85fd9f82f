mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::monte_carlo::{FrontierArgs, SimulateArgs};
use commands::valuation::{CostOfCapitalArgs, DcfArgs, ScenariosArgs, SensitivityArgs};

/// Deterministic and Monte Carlo DCF equity valuation
#[derive(Parser)]
#[command(
    name = "dcfv",
    version,
    about = "Deterministic and Monte Carlo DCF equity valuation",
    long_about = "Values equities with free cash flow to equity and to the firm. \
                  Deterministic runs use decimal precision and solve for the growth \
                  rate the market implies; probabilistic runs simulate Bayesian-smoothed \
                  growth drivers across a universe of tickers."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Levered beta, cost of equity, cost of borrowing and WACC
    CostOfCapital(CostOfCapitalArgs),
    /// Deterministic FCFE/FCFF valuation with implied growth
    Dcf(DcfArgs),
    /// One-way sensitivity of intrinsic value per share
    Sensitivity(SensitivityArgs),
    /// Bear/Base/Bull scenario analysis
    Scenarios(ScenariosArgs),
    /// Batch Monte Carlo valuation of a universe
    Simulate(SimulateArgs),
    /// Surplus matrix, covariance and shortfall probability from simulations
    Frontier(FrontierArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::CostOfCapital(args) => commands::valuation::run_cost_of_capital(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::Sensitivity(args) => commands::valuation::run_sensitivity(args),
        Commands::Scenarios(args) => commands::valuation::run_scenarios(args),
        Commands::Simulate(args) => commands::monte_carlo::run_simulate(args),
        Commands::Frontier(args) => commands::monte_carlo::run_frontier(args),
        Commands::Version => {
            println!("dcfv {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
