use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::connectors::connector_trait::{Connector, ConnectorType};
use crate::utils::{
    error::{FetchError, WeaveResult},
    types::{Predicate, Row, RowBatch, Value},
};

/// In-memory connector with deterministic tables, for tests and demos.
///
/// Advertises pushdown support and applies pushed predicates itself, so the
/// engine's pushdown path is exercised without a real backend. Every `fetch`
/// is counted, letting tests assert zero-fetch and single-flight properties.
pub struct MemoryConnector {
    database: String,
    tables: RwLock<HashMap<String, RowBatch>>,
    fetch_count: AtomicU64,
}

impl MemoryConnector {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            tables: RwLock::new(HashMap::new()),
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Seed a table from column names and value rows.
    pub fn add_table(&self, name: &str, columns: Vec<&str>, rows: Vec<Vec<Value>>) {
        let batch = RowBatch {
            columns: columns.into_iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter().map(Row::new).collect(),
        };
        self.tables
            .write()
            .expect("table map poisoned")
            .insert(name.to_string(), batch);
    }

    /// Builder-style seeding for test setup.
    pub fn with_table(self, name: &str, columns: Vec<&str>, rows: Vec<Vec<Value>>) -> Self {
        self.add_table(name, columns, rows);
        self
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        filter: Option<&Predicate>,
    ) -> WeaveResult<RowBatch> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let full = {
            let tables = self.tables.read().expect("table map poisoned");
            tables
                .get(table)
                .cloned()
                .ok_or_else(|| FetchError::UnknownTable {
                    database: self.database.clone(),
                    table: table.to_string(),
                })?
        };

        let filtered = match filter {
            Some(predicate) => {
                let mut kept = Vec::new();
                for row in &full.rows {
                    if predicate.evaluate(&full, row)? {
                        kept.push(row.clone());
                    }
                }
                RowBatch {
                    columns: full.columns.clone(),
                    rows: kept,
                }
            }
            None => full,
        };

        if columns.is_empty() {
            return Ok(filtered);
        }

        filtered
            .project_named(columns)
            .map_err(|missing| {
                FetchError::Backend {
                    database: self.database.clone(),
                    message: format!("table '{}' has no column '{}'", table, missing),
                }
                .into()
            })
    }

    fn supports_pushdown(&self) -> bool {
        true
    }

    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Memory
    }
}
