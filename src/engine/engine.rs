use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::connectors::{Connector, ConnectorRegistry, CsvConnector, MemoryConnector};
use crate::engine::explain::{describe, PlanDescription};
use crate::engine::query_cache::{
    fingerprint, CacheLookup, EngineStatistics, Flight, ResultCache, StatisticsSnapshot,
};
use crate::engine::query_executor::QueryExecutor;
use crate::engine::query_parser::QueryParser;
use crate::engine::query_planner::QueryPlanner;
use crate::utils::{
    config::{EngineConfig, SourceConfig},
    error::WeaveResult,
    types::{QueryOutput, QueryStats},
};

/// The federation engine: parse → plan → fetch → join → aggregate → sort →
/// limit, wrapped by the result cache, single-flight de-duplication, and
/// execution statistics.
pub struct Engine {
    config: EngineConfig,
    parser: QueryParser,
    planner: QueryPlanner,
    executor: QueryExecutor,
    registry: ConnectorRegistry,
    cache: ResultCache,
    statistics: EngineStatistics,
}

impl Engine {
    /// Create an engine, building a connector per configured source.
    pub fn new(config: EngineConfig) -> WeaveResult<Self> {
        let mut registry = ConnectorRegistry::new();
        for (database, source) in &config.sources {
            let connector: Arc<dyn Connector> = match source {
                SourceConfig::Csv { path } => {
                    Arc::new(CsvConnector::new(database, path.clone()))
                }
                SourceConfig::Memory => Arc::new(MemoryConnector::new(database)),
            };
            registry.register(database, connector)?;
        }
        info!(
            sources = registry.len(),
            cache_enabled = config.cache.enabled,
            "engine initialized"
        );
        let cache = ResultCache::new(config.cache.enabled, config.cache_ttl());
        Ok(Self {
            config,
            parser: QueryParser::new(),
            planner: QueryPlanner::new(),
            executor: QueryExecutor::new(),
            registry,
            cache,
            statistics: EngineStatistics::default(),
        })
    }

    /// Register an additional connector under a logical database name.
    pub fn register_connector(
        &mut self,
        database: &str,
        connector: Arc<dyn Connector>,
    ) -> WeaveResult<()> {
        self.registry.register(database, connector)
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Execute a query end-to-end.
    ///
    /// The fingerprint is checked against the cache first; on a miss the
    /// caller either leads the execution or blocks on an identical one
    /// already in flight and shares its outcome. A caller served without
    /// backend work — cached or joined in flight — records a cache hit.
    pub async fn execute(&self, sql: &str) -> WeaveResult<QueryOutput> {
        let started = Instant::now();
        self.statistics.record_query();

        let key = fingerprint(sql);
        if let CacheLookup::Hit(output) = self.cache.lookup(&key) {
            self.statistics.record_cache_hit();
            return Ok(output.with_stats(started.elapsed(), 0));
        }

        match self.cache.begin(&key) {
            Flight::Wait(rx) => {
                debug!(key = %key, "joining in-flight execution");
                self.statistics.record_cache_hit();
                let shared = ResultCache::wait(rx).await?;
                Ok(shared.with_stats(started.elapsed(), 0))
            }
            Flight::Lead(tx) => {
                self.statistics.record_cache_miss();
                match self.run_pipeline(sql, started).await {
                    Ok(output) => {
                        let shared = Arc::new(output.clone());
                        self.cache.store(&key, shared.clone());
                        self.cache.publish(&key, tx, Ok(shared));
                        Ok(output)
                    }
                    Err(error) => {
                        self.cache.publish(&key, tx, Err(error.clone()));
                        Err(error)
                    }
                }
            }
        }
    }

    async fn run_pipeline(&self, sql: &str, started: Instant) -> WeaveResult<QueryOutput> {
        let statement = self.parser.parse(sql)?;
        let plan = self.planner.plan(&statement, &self.registry)?;
        let outcome = self
            .executor
            .execute(&plan, &self.registry, self.config.fetch_timeout())
            .await?;
        self.statistics.record_rows_fetched(outcome.rows_scanned);
        Ok(QueryOutput {
            columns: outcome.batch.columns,
            rows: outcome.batch.rows,
            stats: QueryStats {
                execution_time_ms: started.elapsed().as_millis() as u64,
                rows_scanned: outcome.rows_scanned,
            },
        })
    }

    /// Describe how a query would run, without executing it. Read-only:
    /// neither the cache nor the statistics change.
    pub fn explain(&self, sql: &str) -> WeaveResult<PlanDescription> {
        let statement = self.parser.parse(sql)?;
        let plan = self.planner.plan(&statement, &self.registry)?;
        Ok(describe(&plan))
    }

    /// Current engine counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Explicitly evict one query's cached result.
    pub fn invalidate_cached(&self, sql: &str) {
        self.cache.invalidate(&fingerprint(sql));
    }

    /// Explicitly evict every cached result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Builder for engines assembled piecewise in tests and embedding code.
pub struct EngineBuilder {
    config: EngineConfig,
    connectors: Vec<(String, Arc<dyn Connector>)>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            connectors: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_connector(mut self, database: &str, connector: Arc<dyn Connector>) -> Self {
        self.connectors.push((database.to_string(), connector));
        self
    }

    pub fn build(self) -> WeaveResult<Engine> {
        let mut engine = Engine::new(self.config)?;
        for (database, connector) in self.connectors {
            engine.register_connector(&database, connector)?;
        }
        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::Value;

    fn engine() -> Engine {
        let users = MemoryConnector::new("users_db").with_table(
            "users",
            vec!["id", "name"],
            vec![
                vec![Value::Integer(1), Value::Text("Alice".into())],
                vec![Value::Integer(2), Value::Text("Bob".into())],
            ],
        );
        EngineBuilder::new()
            .with_connector("users_db", Arc::new(users))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_simple_query() {
        let engine = engine();
        let output = engine
            .execute("SELECT name FROM users_db.users ORDER BY name")
            .await
            .unwrap();
        assert_eq!(output.columns, vec!["name"]);
        assert_eq!(output.row_count(), 2);
        assert_eq!(output.stats.rows_scanned, 2);
    }

    #[tokio::test]
    async fn test_repeat_execution_hits_cache() {
        let engine = engine();
        let sql = "SELECT name FROM users_db.users";
        let first = engine.execute(sql).await.unwrap();
        let second = engine.execute(sql).await.unwrap();
        assert_eq!(first.rows, second.rows);
        // The cached execution fetched nothing.
        assert_eq!(second.stats.rows_scanned, 0);

        let stats = engine.statistics();
        assert_eq!(stats.queries_executed, 2);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.total_data_transferred, 2);
    }

    #[tokio::test]
    async fn test_fingerprint_insensitive_to_formatting() {
        let engine = engine();
        engine
            .execute("SELECT name FROM users_db.users")
            .await
            .unwrap();
        engine
            .execute("select   name\nFROM users_db.users")
            .await
            .unwrap();
        assert_eq!(engine.statistics().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reexecution() {
        let engine = engine();
        let sql = "SELECT name FROM users_db.users";
        engine.execute(sql).await.unwrap();
        engine.invalidate_cached(sql);
        engine.execute(sql).await.unwrap();
        assert_eq!(engine.statistics().cache_misses, 2);
    }

    #[tokio::test]
    async fn test_explain_does_not_touch_cache_or_stats() {
        let engine = engine();
        let description = engine.explain("SELECT name FROM users_db.users").unwrap();
        assert!(description.to_string().contains("fetch users_db.users"));

        let stats = engine.statistics();
        assert_eq!(stats.queries_executed, 0);
        assert_eq!(stats.cache_hits + stats.cache_misses, 0);
    }

    #[tokio::test]
    async fn test_engine_from_config_sources() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "sources": { "scratch": { "kind": "memory" } } }"#,
        )
        .unwrap();
        let engine = Engine::new(config).unwrap();
        assert!(engine.registry().contains("scratch"));
    }
}
