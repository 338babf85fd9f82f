pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Row-shaped part of a result envelope, if it has one: universe summary
/// rows, scenario results, or sensitivity rows tagged with their variable.
pub fn tabular_rows(value: &Value) -> Option<Vec<Value>> {
    let result = value.get("result")?;
    if let Some(Value::Array(rows)) = result.get("rows") {
        if result.get("variable").is_none() {
            return Some(rows.clone());
        }
    }
    if let Some(Value::Array(results)) = result.get("results") {
        return Some(results.clone());
    }
    let tables: Vec<&Value> = match result.get("tables") {
        Some(Value::Array(tables)) => tables.iter().collect(),
        _ if result.get("variable").is_some() => vec![result],
        _ => return None,
    };
    let mut rows = Vec::new();
    for table in tables {
        let variable = table.get("variable").cloned().unwrap_or(Value::Null);
        if let Some(Value::Array(table_rows)) = table.get("rows") {
            for row in table_rows {
                let mut tagged = Map::new();
                tagged.insert("variable".into(), variable.clone());
                if let Value::Object(fields) = row {
                    tagged.extend(fields.clone());
                }
                rows.push(Value::Object(tagged));
            }
        }
    }
    Some(rows)
}

/// Headers (union of flattened keys, first-seen order) and cells for a
/// set of rows.
pub fn row_matrix(rows: &[Value]) -> (Vec<String>, Vec<Vec<String>>) {
    let flat: Vec<Vec<(String, String)>> = rows.iter().map(flatten).collect();
    let mut headers: Vec<String> = Vec::new();
    for row in &flat {
        for (key, _) in row {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    let cells = flat
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| {
                    row.iter()
                        .find(|(k, _)| k == h)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();
    (headers, cells)
}

/// Flatten nested objects into dotted column names.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&name, val, out);
            }
        }
        other => out.push((prefix.to_string(), format_scalar(other))),
    }
}

pub fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_scalar).collect();
            items.join("; ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_row() {
        let row = json!({"ticker": "AAA", "fcfe": {"std_dev": 1.5, "percentiles": null}});
        let mut flat = flatten(&row);
        flat.sort();
        assert_eq!(
            flat,
            vec![
                ("fcfe.percentiles".to_string(), String::new()),
                ("fcfe.std_dev".to_string(), "1.5".to_string()),
                ("ticker".to_string(), "AAA".to_string()),
            ]
        );
    }

    #[test]
    fn test_sensitivity_rows_are_tagged() {
        let envelope = json!({"result": {"tables": [
            {"variable": "growth_rate", "rows": [{"value": "0.01"}, {"value": "0.02"}]},
            {"variable": "discount_rate", "rows": [{"value": "0.05"}]}
        ]}});
        let rows = tabular_rows(&envelope).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["variable"], "discount_rate");
    }

    #[test]
    fn test_row_matrix_unions_headers() {
        let rows = vec![
            json!({"ticker": "AAA", "fcfe": null}),
            json!({"ticker": "BBB", "fcfe": {"std_dev": 2.0}}),
        ];
        let (headers, cells) = row_matrix(&rows);
        assert_eq!(headers.len(), 3);
        assert_eq!(cells[0].len(), 3);
        let col = headers.iter().position(|h| h == "fcfe.std_dev").unwrap();
        assert_eq!(cells[1][col], "2.0");
        assert_eq!(cells[0][col], "");
    }

    #[test]
    fn test_plain_result_has_no_rows() {
        assert!(tabular_rows(&json!({"result": {"wacc": "0.09"}})).is_none());
    }
}
