use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use weave_engine::connectors::{Connector, ConnectorType, MemoryConnector};
use weave_engine::engine::{Engine, EngineBuilder};
use weave_engine::utils::config::EngineConfig;
use weave_engine::utils::error::{PlanError, WeaveError, WeaveResult};
use weave_engine::utils::types::{Predicate, RowBatch, Value};

fn users_connector() -> Arc<MemoryConnector> {
    Arc::new(MemoryConnector::new("users_db").with_table(
        "users",
        vec!["id", "name"],
        vec![
            vec![Value::Integer(1), Value::Text("Alice".into())],
            vec![Value::Integer(2), Value::Text("Bob".into())],
            vec![Value::Integer(3), Value::Text("Charlie".into())],
        ],
    ))
}

fn orders_connector() -> Arc<MemoryConnector> {
    Arc::new(MemoryConnector::new("orders_db").with_table(
        "orders",
        vec!["user_id", "total"],
        vec![
            vec![Value::Integer(2), Value::Integer(200)],
            vec![Value::Integer(3), Value::Integer(300)],
            vec![Value::Integer(4), Value::Integer(400)],
        ],
    ))
}

fn federation() -> (Engine, Arc<MemoryConnector>, Arc<MemoryConnector>) {
    let users = users_connector();
    let orders = orders_connector();
    let engine = EngineBuilder::new()
        .with_connector("users_db", users.clone())
        .with_connector("orders_db", orders.clone())
        .build()
        .unwrap();
    (engine, users, orders)
}

/// Scenario A run through SQL: the two sources cannot natively join, so the
/// engine performs the join itself across all four kinds.
#[tokio::test]
async fn test_scenario_a_over_sql() {
    let (engine, _, _) = federation();

    let inner = engine
        .execute(
            "SELECT u.name, o.total FROM users_db.users u \
             INNER JOIN orders_db.orders o ON u.id = o.user_id ORDER BY o.total",
        )
        .await
        .unwrap();
    assert_eq!(inner.row_count(), 2);
    assert_eq!(inner.rows[0].values[0], Value::Text("Bob".into()));
    assert_eq!(inner.rows[0].values[1], Value::Integer(200));

    let left = engine
        .execute(
            "SELECT u.name, o.total FROM users_db.users u \
             LEFT JOIN orders_db.orders o ON u.id = o.user_id ORDER BY u.name",
        )
        .await
        .unwrap();
    assert_eq!(left.row_count(), 3);
    assert_eq!(left.rows[0].values[0], Value::Text("Alice".into()));
    assert_eq!(left.rows[0].values[1], Value::Null);

    let right = engine
        .execute(
            "SELECT u.name, o.total FROM users_db.users u \
             RIGHT JOIN orders_db.orders o ON u.id = o.user_id ORDER BY o.total",
        )
        .await
        .unwrap();
    assert_eq!(right.row_count(), 3);
    assert_eq!(right.rows[2].values[0], Value::Null);
    assert_eq!(right.rows[2].values[1], Value::Integer(400));

    let full = engine
        .execute(
            "SELECT u.name, o.total FROM users_db.users u \
             FULL JOIN orders_db.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();
    assert_eq!(full.row_count(), 4);
}

/// Scenario C: an unregistered database fails planning with zero fetches.
#[tokio::test]
async fn test_scenario_c_unknown_database_no_fetches() {
    let (engine, users, orders) = federation();

    let result = engine
        .execute(
            "SELECT u.name, m.score FROM users_db.users u \
             JOIN metrics_db.scores m ON u.id = m.user_id",
        )
        .await;

    match result {
        Err(WeaveError::Plan(PlanError::UnknownDatabase { database, .. })) => {
            assert_eq!(database, "metrics_db");
        }
        other => panic!("expected UnknownDatabase, got {:?}", other.map(|o| o.rows)),
    }
    assert_eq!(users.fetch_count(), 0);
    assert_eq!(orders.fetch_count(), 0);
}

#[tokio::test]
async fn test_aggregation_group_having_order_limit() {
    let orders = Arc::new(MemoryConnector::new("orders_db").with_table(
        "orders",
        vec!["user_id", "total"],
        vec![
            vec![Value::Integer(1), Value::Integer(10)],
            vec![Value::Integer(1), Value::Integer(20)],
            vec![Value::Integer(2), Value::Integer(5)],
            vec![Value::Integer(2), Value::Null],
            vec![Value::Integer(3), Value::Integer(100)],
        ],
    ));
    let engine = EngineBuilder::new()
        .with_connector("orders_db", orders)
        .build()
        .unwrap();

    let output = engine
        .execute(
            "SELECT user_id, COUNT(*) AS orders, SUM(total) AS spent \
             FROM orders_db.orders GROUP BY user_id \
             HAVING COUNT(*) > 1 ORDER BY user_id LIMIT 10",
        )
        .await
        .unwrap();

    assert_eq!(output.columns, vec!["user_id", "orders", "spent"]);
    assert_eq!(output.row_count(), 2);
    assert_eq!(output.rows[0].values[1], Value::Integer(2));
    assert_eq!(output.rows[0].values[2], Value::Integer(30));
    // SUM ignores the NULL total for user 2.
    assert_eq!(output.rows[1].values[2], Value::Integer(5));
}

#[tokio::test]
async fn test_statistics_accounting_across_repeats() {
    let (engine, _, _) = federation();

    // N = 3 distinct fingerprints, M = 2 repeats of the first.
    let queries = [
        "SELECT name FROM users_db.users",
        "SELECT id FROM users_db.users",
        "SELECT total FROM orders_db.orders",
    ];
    for sql in &queries {
        engine.execute(sql).await.unwrap();
    }
    for _ in 0..2 {
        engine.execute(queries[0]).await.unwrap();
    }

    let stats = engine.statistics();
    assert_eq!(stats.queries_executed, 5);
    assert_eq!(stats.cache_misses, 3);
    assert_eq!(stats.cache_hits, 2);
    // 3 + 3 + 3 rows fetched on the misses, nothing on the hits.
    assert_eq!(stats.total_data_transferred, 9);
}

/// Connector that delays every fetch long enough for a second caller to pile
/// onto the in-flight execution.
struct SlowCounting {
    inner: Arc<MemoryConnector>,
}

#[async_trait]
impl Connector for SlowCounting {
    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        filter: Option<&Predicate>,
    ) -> WeaveResult<RowBatch> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.fetch(table, columns, filter).await
    }

    fn supports_pushdown(&self) -> bool {
        self.inner.supports_pushdown()
    }

    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Custom("slow-memory".to_string())
    }
}

#[tokio::test]
async fn test_single_flight_deduplicates_concurrent_executions() {
    let users = users_connector();
    let engine = Arc::new(
        EngineBuilder::new()
            .with_connector(
                "users_db",
                Arc::new(SlowCounting {
                    inner: users.clone(),
                }),
            )
            .build()
            .unwrap(),
    );

    let sql = "SELECT name FROM users_db.users ORDER BY name";
    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.execute(sql).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.execute(sql).await }
    });

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    // Exactly one backend fetch sequence ran; both callers observe the same
    // row data.
    assert_eq!(users.fetch_count(), 1);
    assert_eq!(first.rows, second.rows);

    let stats = engine.statistics();
    assert_eq!(stats.queries_executed, 2);
    assert_eq!(stats.cache_misses + stats.cache_hits, 2);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn test_expired_ttl_is_a_miss() {
    let config: EngineConfig =
        serde_json::from_str(r#"{ "cache": { "enabled": true, "ttl_secs": 0 } }"#).unwrap();
    let users = users_connector();
    let engine = EngineBuilder::new()
        .with_config(config)
        .with_connector("users_db", users.clone())
        .build()
        .unwrap();

    let sql = "SELECT name FROM users_db.users";
    engine.execute(sql).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.execute(sql).await.unwrap();

    // The entry expired between runs, so the second execution re-fetched.
    assert_eq!(users.fetch_count(), 2);
    assert_eq!(engine.statistics().cache_misses, 2);
}

#[tokio::test]
async fn test_parse_error_has_no_side_effects_on_backends() {
    let (engine, users, orders) = federation();
    let result = engine.execute("SELECT FROM WHERE").await;
    assert!(matches!(result, Err(WeaveError::Parse(_))));
    assert_eq!(users.fetch_count(), 0);
    assert_eq!(orders.fetch_count(), 0);
}

#[tokio::test]
async fn test_failure_is_shared_with_concurrent_waiter() {
    let engine = Arc::new(
        EngineBuilder::new()
            .with_connector(
                "users_db",
                Arc::new(SlowCounting {
                    inner: Arc::new(MemoryConnector::new("users_db")),
                }),
            )
            .build()
            .unwrap(),
    );

    // The table does not exist, so the leader fails; the waiter must see the
    // same failure instead of hanging or retrying.
    let sql = "SELECT name FROM users_db.users";
    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.execute(sql).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.execute(sql).await }
    });

    assert!(a.await.unwrap().is_err());
    assert!(b.await.unwrap().is_err());
}

#[tokio::test]
async fn test_opaque_values_pass_through() {
    let events = Arc::new(MemoryConnector::new("events_db").with_table(
        "events",
        vec!["id", "payload"],
        vec![
            vec![
                Value::Integer(1),
                Value::Opaque(serde_json::json!({"kind": "click", "tags": ["a"]})),
            ],
            vec![Value::Integer(2), Value::Null],
        ],
    ));
    let engine = EngineBuilder::new()
        .with_connector("events_db", events)
        .build()
        .unwrap();

    let output = engine
        .execute("SELECT payload FROM events_db.events ORDER BY id")
        .await
        .unwrap();
    assert_eq!(
        output.rows[0].values[0],
        Value::Opaque(serde_json::json!({"kind": "click", "tags": ["a"]}))
    );
    assert_eq!(output.rows[1].values[0], Value::Null);
}
