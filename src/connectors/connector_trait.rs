use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::utils::{
    error::{WeaveError, WeaveResult},
    types::{Predicate, RowBatch},
};

/// Connector kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectorType {
    Memory,
    Csv,
    Custom(String),
}

/// The single capability the engine needs from a backend.
///
/// A connector serves one logical database. The engine asks it for a table's
/// rows, optionally narrowed to a column list and, when the connector
/// advertises pushdown support, pre-filtered by a predicate. Everything else
/// (joins, grouping, sorting) happens inside the engine.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Fetch rows of `table`. `columns` empty means all columns. `filter` is
    /// only passed to connectors that advertise pushdown support.
    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        filter: Option<&Predicate>,
    ) -> WeaveResult<RowBatch>;

    /// Whether WHERE conjuncts local to this source may be evaluated at the
    /// backend instead of in-memory after fetch.
    fn supports_pushdown(&self) -> bool {
        false
    }

    /// Get the type of this connector
    fn connector_type(&self) -> ConnectorType;
}

/// Registry mapping logical database names to connector instances.
///
/// Planning resolves every `TableRef.database` here before any fetch is
/// issued; an unresolved name fails the query with zero backend calls.
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Register a connector under a logical database name
    pub fn register(&mut self, database: &str, connector: Arc<dyn Connector>) -> WeaveResult<()> {
        if self.connectors.contains_key(database) {
            return Err(WeaveError::Configuration(format!(
                "database '{}' is already registered",
                database
            )));
        }
        self.connectors.insert(database.to_string(), connector);
        Ok(())
    }

    /// Get a connector by logical database name
    pub fn get(&self, database: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(database).cloned()
    }

    /// Check if a database name is registered
    pub fn contains(&self, database: &str) -> bool {
        self.connectors.contains_key(database)
    }

    /// List all registered database names, sorted for stable messages
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
