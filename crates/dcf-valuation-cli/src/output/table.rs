use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten, row_matrix, tabular_rows};

/// Render a result envelope as tables: row-shaped results as one table,
/// anything else as field/value pairs, followed by warnings.
pub fn print_table(value: &Value) {
    if let Some(rows) = tabular_rows(value) {
        print_rows(&rows);
    } else {
        print_fields(value.get("result").unwrap_or(value));
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_fields(value: &Value) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in flatten(value) {
        builder.push_record([key, val]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(rows: &[Value]) {
    if rows.is_empty() {
        println!("(empty)");
        return;
    }
    let (headers, cells) = row_matrix(rows);
    let mut builder = Builder::default();
    builder.push_record(headers);
    for record in cells {
        builder.push_record(record);
    }
    println!("{}", Table::from(builder));
}
