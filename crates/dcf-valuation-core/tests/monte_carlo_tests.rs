#![cfg(feature = "monte_carlo")]

use dcf_valuation_core::batch::{value_universe, FailureStage, UniverseRecord};
use dcf_valuation_core::config::SimulationConfig;
use dcf_valuation_core::inputs::{TimeSeriesInputs, ValuationInputs};
use dcf_valuation_core::monte_carlo::frontier::{frontier_inputs, FrontierAsset};
use dcf_valuation_core::monte_carlo::growth::growth_path;
use dcf_valuation_core::monte_carlo::simulation::run_probabilistic_valuation;
use dcf_valuation_core::monte_carlo::statistics::summarize;
use dcf_valuation_core::types::Method;
use dcf_valuation_core::ValuationError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

// ===========================================================================
// Fixtures
// ===========================================================================

const UNIVERSE_JSON: &str = r#"[
    {
        "inputs": {
            "ticker": "ALFA", "name": "Alfa Industries",
            "mve": "1000000000", "mvb": "300000000", "rfr": "0.04", "beta_u": "1.1",
            "erp": "0.05", "interest_expense": "15000000", "total_debt": "300000000",
            "ctr": "0.21", "tdr": "0.23", "ni": "80000000", "bve": "500000000",
            "dp": "20000000", "ebit": "120000000", "ite": "21000000", "ic": "800000000",
            "capx": "40000000", "d": "30000000", "ca": "200000000", "cl": "150000000",
            "prev_ca": "190000000", "prev_cl": "145000000", "tgr": "0.025", "h": 5,
            "so": "10000000", "price": "50"
        },
        "time_series": {
            "net_income": [80000000, 74000000, 70000000, 65000000],
            "book_value_equity": [500000000, 470000000, 445000000, 420000000],
            "ebit": [120000000, 112000000, 106000000, 99000000],
            "invested_capital": [800000000, 770000000, 740000000, 715000000],
            "capex": [40000000, 38000000, 36000000, 35000000],
            "depreciation": [30000000, 29000000, 28000000, 27000000],
            "current_assets": [200000000, 190000000, 182000000, 175000000],
            "current_liabilities": [150000000, 145000000, 140000000, 136000000],
            "dividend_payout": [20000000, 19000000, 18000000, 17000000]
        }
    },
    {
        "inputs": {
            "ticker": "BETA", "name": "Beta Retail",
            "mve": "400000000", "mvb": "100000000", "rfr": "0.04", "beta_u": "0.9",
            "erp": "0.05", "interest_expense": "6000000", "total_debt": "100000000",
            "ctr": "0.25", "tdr": "0.2", "ni": "30000000", "bve": "200000000",
            "dp": "12000000", "ebit": "45000000", "ite": "10000000", "ic": "300000000",
            "capx": "15000000", "d": "12000000", "ca": "90000000", "cl": "70000000",
            "prev_ca": "85000000", "prev_cl": "67000000", "tgr": "0.02", "h": 5,
            "so": "20000000", "price": "18"
        },
        "time_series": {
            "net_income": [30000000, 28000000, 27000000, 25000000],
            "book_value_equity": [200000000, 190000000, 182000000, 175000000],
            "ebit": [45000000, 42000000, 40000000, 38000000],
            "invested_capital": [300000000, 290000000, 282000000, 275000000],
            "capex": [15000000, 14000000, 14000000, 13000000],
            "depreciation": [12000000, 11500000, 11000000, 10500000],
            "current_assets": [90000000, 85000000, 82000000, 80000000],
            "current_liabilities": [70000000, 67000000, 65000000, 63000000],
            "dividends_paid": [12000000, 11000000, 11000000, 10000000]
        }
    }
]"#;

fn universe() -> Vec<UniverseRecord> {
    serde_json::from_str(UNIVERSE_JSON).unwrap()
}

fn alfa() -> (ValuationInputs, TimeSeriesInputs) {
    let mut records = universe();
    let first = records.remove(0);
    (first.inputs, first.time_series.unwrap())
}

fn seeded(n: u32, parallel: bool) -> SimulationConfig {
    SimulationConfig {
        num_simulations: n,
        parallel,
        ..SimulationConfig::seeded(2024)
    }
}

// ===========================================================================
// Probabilistic valuation
// ===========================================================================

#[test]
fn test_seeded_runs_reproduce_and_parallel_matches_sequential() {
    let (inputs, series) = alfa();
    let inputs = inputs.validate().unwrap();

    let first = run_probabilistic_valuation(&inputs, &series, &seeded(1_000, true)).unwrap();
    let again = run_probabilistic_valuation(&inputs, &series, &seeded(1_000, true)).unwrap();
    let sequential = run_probabilistic_valuation(&inputs, &series, &seeded(1_000, false)).unwrap();

    for method in Method::ALL {
        let a = first.result.method(method);
        assert_eq!(a.values, again.result.method(method).values);
        assert_eq!(a.values, sequential.result.method(method).values);
        assert_eq!(a.statistics, sequential.result.method(method).statistics);
    }
}

#[test]
fn test_probability_undervalued_is_exact_share() {
    let (inputs, series) = alfa();
    let inputs = inputs.validate().unwrap();
    let out = run_probabilistic_valuation(&inputs, &series, &seeded(500, true)).unwrap();

    for method in Method::ALL {
        let sim = out.result.method(method);
        if let Some(stats) = &sim.statistics {
            let above = sim.values.iter().filter(|v| **v > out.result.price).count();
            assert_eq!(
                stats.probability_undervalued,
                above as f64 / sim.values.len() as f64
            );
            assert!((0.0..=1.0).contains(&stats.probability_undervalued));
            let p = stats.percentiles.as_array();
            assert!(p.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

#[test]
fn test_three_year_history_is_insufficient() {
    let (inputs, mut series) = alfa();
    for s in [
        &mut series.net_income,
        &mut series.book_value_equity,
        &mut series.ebit,
        &mut series.invested_capital,
        &mut series.capex,
        &mut series.depreciation,
        &mut series.current_assets,
        &mut series.current_liabilities,
        &mut series.dividends_paid,
    ] {
        s.truncate(3);
    }
    let inputs = inputs.validate().unwrap();
    match run_probabilistic_valuation(&inputs, &series, &seeded(100, true)) {
        Err(ValuationError::InsufficientData(msg)) => assert!(msg.contains("at least 4")),
        other => panic!("Expected InsufficientData, got {other:?}"),
    }
}

#[test]
fn test_single_simulation_statistics() {
    let (inputs, series) = alfa();
    let inputs = inputs.validate().unwrap();
    let out = run_probabilistic_valuation(&inputs, &series, &seeded(1, false)).unwrap();
    for method in Method::ALL {
        let sim = out.result.method(method);
        assert_eq!(sim.iterations, 1);
        if let Some(stats) = &sim.statistics {
            assert_eq!(stats.std_dev, 0.0);
            assert_eq!(stats.percentiles.p5, stats.percentiles.p95);
            assert!(stats.mean.is_finite());
        }
    }
}

#[test]
fn test_statistics_order_independent() {
    let values = vec![31.0, 54.5, 12.25, 48.0, 50.0, 77.5, 39.0, 50.5];
    let mut shuffled = values.clone();
    shuffled.rotate_left(3);
    shuffled.swap(0, 5);
    assert_eq!(summarize(&values, 50.0), summarize(&shuffled, 50.0));
}

#[test]
fn test_growth_path_converges() {
    for speed in [0.1, 0.3, 1.0] {
        let years = (20.0 / speed) as u32;
        let path = growth_path(0.35, 0.025, speed, years, true);
        let last = path[path.len() - 1];
        assert!((last - 0.025).abs() < 1e-6, "speed {speed}: {last}");
    }
}

// ===========================================================================
// Universe and frontier
// ===========================================================================

#[test]
fn test_universe_isolates_failures() {
    let mut records = universe();
    let mut broken = records[1].clone();
    broken.inputs.ticker = "BROKEN".into();
    broken.inputs.projection_years = 0;
    records.insert(1, broken);

    let out = value_universe(&records, &seeded(300, true)).unwrap().result;
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].ticker, "BROKEN");
    assert_eq!(out.failures[0].stage, FailureStage::Validation);

    let tickers: Vec<&str> = out.fcfe_simulations.keys().map(String::as_str).collect();
    assert_eq!(tickers, vec!["ALFA", "BETA"]);
    assert_eq!(out.market_prices["BETA"], 18.0);
}

#[test]
fn test_frontier_from_simulations() {
    let (inputs, series) = alfa();
    let inputs = inputs.validate().unwrap();
    let config = SimulationConfig {
        stochastic_discount_rates: true,
        ..seeded(400, true)
    };
    let out = run_probabilistic_valuation(&inputs, &series, &config).unwrap().result;

    let assets = vec![
        FrontierAsset {
            ticker: "ALFA-E".into(),
            price: out.price,
            simulations: out.fcfe.per_iteration.clone(),
        },
        FrontierAsset {
            ticker: "ALFA-F".into(),
            price: out.price,
            simulations: out.fcff.per_iteration.clone(),
        },
    ];
    let frontier = frontier_inputs(&assets).unwrap();
    assert_eq!(frontier.surplus.len() + frontier.dropped_iterations, 400);
    for a in 0..2 {
        assert!(frontier.covariance[a][a] >= 0.0);
        for b in 0..2 {
            assert_eq!(frontier.covariance[a][b], frontier.covariance[b][a]);
        }
    }
    let p = frontier.shortfall_probability(&[0.5, 0.5]).unwrap();
    assert!((0.0..=1.0).contains(&p));
}

// ===========================================================================
// Excluded iterations
// ===========================================================================

/// BETA carrying enough debt that part of its FCFF distribution falls below zero.
fn leveraged_universe() -> Vec<UniverseRecord> {
    let mut records = universe();
    records[1].inputs.total_debt = Decimal::from(450_000_000);
    records
}

fn stochastic(n: u32) -> SimulationConfig {
    SimulationConfig {
        stochastic_discount_rates: true,
        ..seeded(n, true)
    }
}

#[test]
fn test_negative_values_excluded_but_counted() {
    let mut records = leveraged_universe();
    let beta = records.remove(1);
    let inputs = beta.inputs.validate().unwrap();
    let series = beta.time_series.unwrap();
    let out = run_probabilistic_valuation(&inputs, &series, &stochastic(1_000)).unwrap();

    let sim = &out.result.fcff;
    assert!(sim.negative_count > 0);
    assert!((sim.values.len() as u32) < sim.iterations);
    assert_eq!(
        sim.values.len() as u32 + sim.negative_count + sim.failed_count,
        sim.iterations
    );
    assert!(sim.values.iter().all(|v| *v >= 0.0));
    assert!(out.warnings.iter().any(|w| w.starts_with("FCFF:")
        && w.contains("produced negative values and were excluded")));

    let stats = sim.statistics.as_ref().unwrap();
    assert_eq!(stats.count, sim.values.len());
    let above = sim.values.iter().filter(|v| **v > out.result.price).count();
    assert_eq!(
        stats.probability_undervalued,
        above as f64 / sim.values.len() as f64
    );
}

#[test]
fn test_universe_output_feeds_frontier() {
    let out = value_universe(&leveraged_universe(), &stochastic(1_000))
        .unwrap()
        .result;
    assert!(out.failures.is_empty());

    let assets: Vec<FrontierAsset> = out
        .fcff_simulations
        .iter()
        .map(|(ticker, simulations)| FrontierAsset {
            ticker: ticker.clone(),
            price: out.market_prices[ticker],
            simulations: simulations.clone(),
        })
        .collect();
    assert!(assets.iter().all(|a| a.simulations.len() == 1_000));
    let excluded = assets[1].simulations.iter().filter(|v| v.is_none()).count();
    assert!(excluded > 0);

    let frontier = frontier_inputs(&assets).unwrap();
    assert_eq!(frontier.tickers, vec!["ALFA", "BETA"]);
    assert!(frontier.dropped_iterations >= excluded);
    assert_eq!(frontier.surplus.len() + frontier.dropped_iterations, 1_000);
    let p = frontier.shortfall_probability(&[0.5, 0.5]).unwrap();
    assert!((0.0..=1.0).contains(&p));
}
