use serde_json::Value;

use super::format_scalar;

/// Print just the headline answer.
///
/// Universe runs print one `ticker signal` line per row; other results
/// print the first well-known headline field present.
pub fn print_minimal(value: &Value) {
    let result = value.get("result").unwrap_or(value);

    if let Some(Value::Array(rows)) = result.get("rows") {
        if result.get("variable").is_none() {
            for row in rows {
                let signal = row
                    .get("simulated_signal")
                    .filter(|s| !s.is_null())
                    .or_else(|| row.get("deterministic_signal"))
                    .map(format_scalar)
                    .unwrap_or_default();
                println!(
                    "{} {}",
                    row.get("ticker").map(format_scalar).unwrap_or_default(),
                    signal
                );
            }
            return;
        }
    }

    let priority_keys = [
        "signal",
        "wacc",
        "probability_weighted_fcfe_ivps",
        "shortfall_probability",
        "base_case_index",
    ];
    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key).filter(|v| !v.is_null()) {
                println!("{}", format_scalar(val));
                return;
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_scalar(val));
            return;
        }
    }

    println!("{}", format_scalar(result));
}
