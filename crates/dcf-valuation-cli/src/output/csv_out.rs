use serde_json::Value;
use std::io;

use super::{flatten, row_matrix, tabular_rows};

/// Write a result envelope as CSV to stdout: one line per row for
/// row-shaped results, field/value pairs otherwise.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    if let Some(rows) = tabular_rows(value) {
        let (headers, cells) = row_matrix(&rows);
        let _ = wtr.write_record(&headers);
        for record in &cells {
            let _ = wtr.write_record(record);
        }
    } else {
        let _ = wtr.write_record(["field", "value"]);
        for (key, val) in flatten(value.get("result").unwrap_or(value)) {
            let _ = wtr.write_record([key, val]);
        }
    }

    let _ = wtr.flush();
}
