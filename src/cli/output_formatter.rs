use colored::*;
use serde_json::{json, Value as JsonValue};

use crate::cli::cli_args::OutputFormat;
use crate::utils::types::{QueryOutput, Value};

/// Formats query results for CLI output
pub struct OutputFormatter;

impl OutputFormatter {
    /// Format query results according to the specified format
    pub fn format_result(output: &QueryOutput, format: &OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(output),
            OutputFormat::Json => Self::format_json(output),
            OutputFormat::Csv => Self::format_csv(output),
        }
    }

    /// Format results as a colored table
    fn format_table(output: &QueryOutput) -> String {
        if output.rows.is_empty() {
            return "No results found.".dimmed().to_string();
        }

        let mut widths: Vec<usize> = output.columns.iter().map(|c| c.len()).collect();
        for row in &output.rows {
            for (i, value) in row.values.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(Self::value_to_string(value).len());
                }
            }
        }

        let mut text = String::new();
        text.push('|');
        for (i, column) in output.columns.iter().enumerate() {
            let padding = widths[i] - column.len();
            text.push_str(&format!(
                " {}{} |",
                column.bold().cyan(),
                " ".repeat(padding)
            ));
        }
        text.push('\n');
        text.push('|');
        for width in &widths {
            text.push_str(&format!("{}|", "-".repeat(width + 2)));
        }
        text.push('\n');

        for row in &output.rows {
            text.push('|');
            for (i, value) in row.values.iter().enumerate() {
                if i < widths.len() {
                    let rendered = Self::value_to_string(value);
                    let padding = widths[i] - rendered.len();
                    let colored = match value {
                        Value::Null => rendered.dimmed().to_string(),
                        _ => rendered,
                    };
                    text.push_str(&format!(" {}{} |", colored, " ".repeat(padding)));
                }
            }
            text.push('\n');
        }

        text.push_str(
            &format!(
                "{} rows ({} ms, {} rows scanned)",
                output.row_count(),
                output.stats.execution_time_ms,
                output.stats.rows_scanned
            )
            .dimmed()
            .to_string(),
        );
        text
    }

    fn format_json(output: &QueryOutput) -> String {
        let rows: Vec<JsonValue> = output
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, JsonValue> = output
                    .columns
                    .iter()
                    .zip(&row.values)
                    .map(|(column, value)| (column.clone(), Self::value_to_json(value)))
                    .collect();
                JsonValue::Object(object)
            })
            .collect();
        let document = json!({
            "columns": output.columns,
            "rows": rows,
            "stats": {
                "execution_time_ms": output.stats.execution_time_ms,
                "rows_scanned": output.stats.rows_scanned,
            },
        });
        serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_csv(output: &QueryOutput) -> String {
        let mut lines = vec![output.columns.join(",")];
        for row in &output.rows {
            let cells: Vec<String> = row
                .values
                .iter()
                .map(|value| {
                    let text = Self::value_to_string(value);
                    if text.contains(',') || text.contains('"') {
                        format!("\"{}\"", text.replace('"', "\"\""))
                    } else {
                        text
                    }
                })
                .collect();
            lines.push(cells.join(","));
        }
        lines.join("\n")
    }

    fn value_to_string(value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            other => format!("{}", other),
        }
    }

    fn value_to_json(value: &Value) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => json!(b),
            Value::Integer(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Text(s) => json!(s),
            Value::Timestamp(ts) => json!(ts.to_rfc3339()),
            Value::Opaque(v) => v.clone(),
        }
    }
}
