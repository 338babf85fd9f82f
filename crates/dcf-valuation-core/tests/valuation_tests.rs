use dcf_valuation_core::inputs::{GrowthBounds, ValuationInputs};
use dcf_valuation_core::signal::Signal;
use dcf_valuation_core::types::{Currency, Method};
use dcf_valuation_core::valuation::dcf::{calculate_dcf, cap_terminal_growth, TERMINAL_GROWTH_BUFFER};
use dcf_valuation_core::valuation::growth::clamp_growth;
use dcf_valuation_core::valuation::implied_growth::{
    implied_growth_rate, market_target, ApproximateNewtonSolver,
};
use dcf_valuation_core::valuation::scenarios::{analyze_scenarios, default_scenarios};
use dcf_valuation_core::valuation::sensitivity::{calculate_sensitivity, SensitivityTarget};
use dcf_valuation_core::valuation::wacc::calculate_cost_of_capital;
use dcf_valuation_core::ValuationError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

fn reference_inputs() -> ValuationInputs {
    ValuationInputs {
        ticker: "REF".into(),
        name: "Reference Industrial".into(),
        currency: Currency::USD,
        market_value_equity: dec!(1_000_000_000),
        market_value_debt: dec!(300_000_000),
        risk_free_rate: dec!(0.04),
        unlevered_beta: dec!(1.1),
        equity_risk_premium: dec!(0.05),
        interest_expense: dec!(15_000_000),
        total_debt: dec!(300_000_000),
        tax_rate: dec!(0.21),
        target_debt_ratio: dec!(0.23),
        net_income: dec!(80_000_000),
        book_value_equity: dec!(500_000_000),
        dividends_paid: dec!(20_000_000),
        ebit: dec!(120_000_000),
        income_tax_expense: dec!(21_000_000),
        invested_capital: dec!(800_000_000),
        capital_expenditure: dec!(40_000_000),
        depreciation: dec!(30_000_000),
        current_assets: dec!(200_000_000),
        current_liabilities: dec!(150_000_000),
        prior_current_assets: dec!(190_000_000),
        prior_current_liabilities: dec!(145_000_000),
        terminal_growth_rate: dec!(0.025),
        projection_years: 5,
        shares_outstanding: dec!(10_000_000),
        price: dec!(50),
        growth_bounds: GrowthBounds::default(),
    }
}

// ===========================================================================
// Input handling
// ===========================================================================

#[test]
fn test_short_keys_deserialize() {
    let json = r#"{
        "ticker": "SHORT",
        "mve": "1000000000", "mvb": "300000000", "rfr": "0.04", "beta_u": "1.1",
        "erp": "0.05", "interest_expense": "15000000", "total_debt": "300000000",
        "ctr": "0.21", "tdr": "0.23", "ni": "80000000", "bve": "500000000",
        "dp": "20000000", "ebit": "120000000", "ite": "21000000", "ic": "800000000",
        "capx": "40000000", "d": "30000000", "ca": "200000000", "cl": "150000000",
        "prev_ca": "190000000", "prev_cl": "145000000", "tgr": "0.025", "h": 5,
        "so": "10000000", "price": "50"
    }"#;
    let inputs: ValuationInputs = serde_json::from_str(json).unwrap();
    assert_eq!(inputs.market_value_equity, dec!(1_000_000_000));
    assert_eq!(inputs.projection_years, 5);
    assert_eq!(inputs.currency, Currency::USD);
    assert_eq!(inputs.growth_bounds.fcfe_upper, dec!(0.50));
    assert!(inputs.validate().is_ok());
}

#[test]
fn test_zero_denominators_rejected_before_computation() {
    let zeroed: [fn(&mut ValuationInputs); 4] = [
        |i| i.total_debt = Decimal::ZERO,
        |i| i.book_value_equity = Decimal::ZERO,
        |i| i.net_income = Decimal::ZERO,
        |i| i.ebit = Decimal::ZERO,
    ];
    for zero in zeroed {
        let mut inputs = reference_inputs();
        zero(&mut inputs);
        match inputs.validate() {
            Err(ValuationError::DivisionByZero { .. }) => {}
            other => panic!("Expected DivisionByZero, got {other:?}"),
        }
    }
}

// ===========================================================================
// Cost of capital
// ===========================================================================

#[test]
fn test_end_to_end_reference_ticker() {
    let inputs = reference_inputs().validate().unwrap();

    let coc = calculate_cost_of_capital(&inputs).unwrap().result;
    assert!(coc.levered_beta > dec!(1.1));
    assert_eq!(
        coc.cost_of_equity,
        dec!(0.04) + coc.levered_beta * dec!(0.05)
    );
    let low = coc.cost_of_equity.min(coc.cost_of_borrowing);
    let high = coc.cost_of_equity.max(coc.cost_of_borrowing);
    assert!(coc.wacc > coc.after_tax_cost_of_borrowing && coc.wacc < high);
    assert!(coc.wacc >= low.min(coc.after_tax_cost_of_borrowing));

    let dcf = calculate_dcf(&inputs).unwrap();
    let fcfe = dcf.result.fcfe.intrinsic_value_per_share;
    assert!(fcfe > Decimal::ZERO, "FCFE IVPS {fcfe}");
    assert_eq!(dcf.metadata.precision, "rust_decimal_128bit");
    assert_eq!(
        dcf.result.signal,
        Signal::from_relations(dcf.result.fcfe.relation, dcf.result.fcff.relation)
    );
}

#[test]
fn test_wacc_within_component_costs_across_leverage() {
    for debt in [dec!(50_000_000), dec!(300_000_000), dec!(900_000_000)] {
        let mut raw = reference_inputs();
        raw.market_value_debt = debt;
        raw.total_debt = debt;
        raw.interest_expense = debt * dec!(0.05);
        let coc = calculate_cost_of_capital(&raw.validate().unwrap())
            .unwrap()
            .result;
        let low = coc.cost_of_equity.min(coc.after_tax_cost_of_borrowing);
        let high = coc.cost_of_equity.max(coc.cost_of_borrowing);
        assert!(coc.wacc >= low && coc.wacc <= high, "debt {debt}: {}", coc.wacc);
    }
}

// ===========================================================================
// Growth and terminal value
// ===========================================================================

#[test]
fn test_clamp_growth_properties() {
    let (lower, upper) = (dec!(-0.20), dec!(0.50));
    for g in [dec!(-0.9), dec!(-0.2), dec!(0.0), dec!(0.12), dec!(0.5), dec!(3.0)] {
        let (applied, clamped) = clamp_growth(g, lower, upper);
        assert!(applied >= lower && applied <= upper);
        if g >= lower && g <= upper {
            assert_eq!(applied, g);
            assert!(!clamped);
        }
    }
}

#[test]
fn test_terminal_growth_capped_exactly() {
    let (tgr, capped) = cap_terminal_growth(dec!(0.09), dec!(0.08));
    assert!(capped);
    assert_eq!(tgr, dec!(0.08) - TERMINAL_GROWTH_BUFFER);
    assert_eq!(tgr, dec!(0.079));
}

#[test]
fn test_high_terminal_growth_warns() {
    let mut raw = reference_inputs();
    raw.terminal_growth_rate = dec!(0.15);
    let out = calculate_dcf(&raw.validate().unwrap()).unwrap();
    assert!(out.result.fcfe.valuation.terminal_growth_capped);
    assert!(out.warnings.iter().any(|w| w.contains("capped")));
}

// ===========================================================================
// Implied growth
// ===========================================================================

#[test]
fn test_implied_growth_round_trip() {
    let inputs = reference_inputs().validate().unwrap();
    let dcf = calculate_dcf(&inputs).unwrap().result;
    let solver = ApproximateNewtonSolver::default();

    for method in Method::ALL {
        let r = dcf.cost_of_capital.discount_rate(method);
        let implied = implied_growth_rate(&inputs, method, r, dec!(0.05), &solver).unwrap();
        let target = market_target(&inputs, method);

        let mut warnings = Vec::new();
        let value = dcf_valuation_core::valuation::dcf::value_cash_flows(
            &inputs,
            method,
            &dcf_valuation_core::valuation::dcf::constant_path(
                implied.rate,
                inputs.projection_years,
            ),
            r,
            inputs.terminal_growth_rate,
            &mut warnings,
        )
        .unwrap();
        let firm_or_equity = value.present_value;
        let rel = ((firm_or_equity - target) / target).abs();
        assert!(rel < dec!(0.0001), "{method}: relative error {rel}");
    }
}

// ===========================================================================
// Sensitivity and scenarios
// ===========================================================================

#[test]
fn test_default_sensitivity_sweeps() {
    let inputs = reference_inputs().validate().unwrap();
    let out = calculate_sensitivity(&inputs, &[]).unwrap().result;
    let sizes: Vec<usize> = out.tables.iter().map(|t| t.rows.len()).collect();
    assert_eq!(sizes, vec![26, 25, 21]);

    let growth = &out.tables[0];
    assert_eq!(growth.variable, SensitivityTarget::GrowthRate);
    for pair in growth.rows.windows(2) {
        assert!(pair[1].fcfe_ivps > pair[0].fcfe_ivps);
    }
}

#[test]
fn test_scenarios_weighted_value_between_extremes() {
    let inputs = reference_inputs().validate().unwrap();
    let out = analyze_scenarios(&inputs, &default_scenarios())
        .unwrap()
        .result;
    assert_eq!(out.results.len(), 3);
    let bear = &out.results[0];
    let bull = &out.results[2];
    assert!(bear.fcfe_ivps < out.base_fcfe_ivps);
    assert!(bull.fcfe_ivps > out.base_fcfe_ivps);
    assert!(out.probability_weighted_fcfe_ivps > bear.fcfe_ivps);
    assert!(out.probability_weighted_fcfe_ivps < bull.fcfe_ivps);
}

#[test]
fn test_scenario_probabilities_must_sum_to_one() {
    let inputs = reference_inputs().validate().unwrap();
    let mut scenarios = default_scenarios();
    scenarios[1].probability = dec!(0.30);
    match analyze_scenarios(&inputs, &scenarios) {
        Err(ValuationError::InvalidInput { field, .. }) => assert_eq!(field, "probabilities"),
        other => panic!("Expected InvalidInput, got {other:?}"),
    }
}
