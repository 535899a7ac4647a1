use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::connectors::connector_trait::{Connector, ConnectorType};
use crate::utils::{
    error::{FetchError, WeaveResult},
    types::{Predicate, Row, RowBatch, Value},
};

/// Connector backed by a directory of CSV files, one table per file.
///
/// The header row names the columns; cell types are inferred per value
/// (integer, float, boolean, RFC 3339 timestamp, text; empty cells are NULL).
/// No pushdown: the engine filters fetched rows in memory.
pub struct CsvConnector {
    database: String,
    directory: PathBuf,
}

impl CsvConnector {
    pub fn new(database: &str, directory: PathBuf) -> Self {
        Self {
            database: database.to_string(),
            directory,
        }
    }

    /// Table names available in the directory, from `*.csv` file stems.
    pub fn list_tables(&self) -> Vec<String> {
        let pattern = format!("{}/*.csv", self.directory.display());
        let mut tables: Vec<String> = glob::glob(&pattern)
            .map(|paths| {
                paths
                    .filter_map(Result::ok)
                    .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        tables.sort();
        tables
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.directory.join(format!("{}.csv", table))
    }

    fn infer_value(cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = cell.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = cell.parse::<f64>() {
            return Value::Float(f);
        }
        match cell {
            "true" | "TRUE" => return Value::Boolean(true),
            "false" | "FALSE" => return Value::Boolean(false),
            _ => {}
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(cell) {
            return Value::Timestamp(ts.with_timezone(&Utc));
        }
        Value::Text(cell.to_string())
    }

    fn read_table(&self, table: &str) -> WeaveResult<RowBatch> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(FetchError::UnknownTable {
                database: self.database.clone(),
                table: table.to_string(),
            }
            .into());
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| FetchError::Unreachable {
            database: self.database.clone(),
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| FetchError::Backend {
                database: self.database.clone(),
                message: format!("bad header in {}: {}", path.display(), e),
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut batch = RowBatch::new(columns);
        for record in reader.records() {
            let record = record.map_err(|e| FetchError::Backend {
                database: self.database.clone(),
                message: format!("bad record in {}: {}", path.display(), e),
            })?;
            let values = record.iter().map(Self::infer_value).collect();
            batch.rows.push(Row::new(values));
        }
        Ok(batch)
    }
}

#[async_trait]
impl Connector for CsvConnector {
    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        _filter: Option<&Predicate>,
    ) -> WeaveResult<RowBatch> {
        let batch = self.read_table(table)?;
        if columns.is_empty() {
            return Ok(batch);
        }
        batch.project_named(columns).map_err(|missing| {
            FetchError::Backend {
                database: self.database.clone(),
                message: format!("table '{}' has no column '{}'", table, missing),
            }
            .into()
        })
    }

    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Csv
    }
}
