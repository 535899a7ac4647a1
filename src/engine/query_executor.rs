use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connectors::ConnectorRegistry;
use crate::engine::aggregate::{
    apply_aggregate, apply_filter, apply_limit, apply_projection, apply_sort,
};
use crate::engine::join_engine::hash_join;
use crate::engine::query_planner::{ExecutionPlan, FetchStep};
use crate::utils::error::{TimeoutError, WeaveError, WeaveResult};
use crate::utils::types::RowBatch;

/// Result of running one plan: the projected batch plus how many rows the
/// backends actually delivered (before in-memory filtering).
pub struct ExecutionOutcome {
    pub batch: RowBatch,
    pub rows_scanned: u64,
}

/// Executes plans produced by the planner.
///
/// All fetch steps are spawned concurrently — they share no mutable state —
/// and each pairwise join suspends until the two inputs it needs are ready:
/// a small dependency DAG rather than one global barrier. Any fetch failure
/// or deadline overrun aborts the whole query; partial results are never
/// returned.
pub struct QueryExecutor;

impl QueryExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        registry: &ConnectorRegistry,
        fetch_timeout: Duration,
    ) -> WeaveResult<ExecutionOutcome> {
        let mut handles = self.spawn_fetches(plan, registry, fetch_timeout)?;
        let mut rows_scanned = 0u64;

        let (mut current, fetched) = await_fetch(handles.remove(0)).await?;
        rows_scanned += fetched;

        for (join, handle) in plan.joins.iter().zip(handles) {
            let (right, fetched) = await_fetch(handle).await?;
            rows_scanned += fetched;
            debug!(
                kind = %join.kind,
                right = %join.right_alias,
                left_rows = current.row_count(),
                right_rows = right.row_count(),
                "joining"
            );
            current = hash_join(
                &current,
                &right,
                &join.left_column,
                &join.right_column,
                join.kind,
            )?;
        }

        if let Some(post_filter) = &plan.post_filter {
            current = apply_filter(current, post_filter)?;
        }
        if let Some(aggregate) = &plan.aggregate {
            current = apply_aggregate(&current, aggregate)?;
        }
        apply_sort(&mut current, &plan.order_by)?;
        if let Some(limit) = plan.limit {
            apply_limit(&mut current, limit);
        }
        let batch = apply_projection(&current, &plan.projection)?;

        Ok(ExecutionOutcome {
            batch,
            rows_scanned,
        })
    }

    /// Spawn every fetch step as its own task. Each task fetches under the
    /// caller-supplied deadline, namespaces the columns by source alias, and
    /// applies the step's residual filter before the batch reaches a join.
    fn spawn_fetches(
        &self,
        plan: &ExecutionPlan,
        registry: &ConnectorRegistry,
        fetch_timeout: Duration,
    ) -> WeaveResult<Vec<JoinHandle<WeaveResult<(RowBatch, u64)>>>> {
        let mut handles = Vec::with_capacity(plan.fetches.len());
        for step in &plan.fetches {
            let connector = registry.get(&step.database).ok_or_else(|| {
                WeaveError::Internal(format!(
                    "database '{}' vanished from registry after planning",
                    step.database
                ))
            })?;
            let step: FetchStep = step.clone();
            handles.push(tokio::spawn(async move {
                debug!(
                    database = %step.database,
                    table = %step.table,
                    pushdown = step.pushdown.is_some(),
                    "fetching"
                );
                let fetched = tokio::time::timeout(
                    fetch_timeout,
                    connector.fetch(&step.table, &step.columns, step.pushdown.as_ref()),
                )
                .await
                .map_err(|_| TimeoutError {
                    database: step.database.clone(),
                    table: step.table.clone(),
                    deadline_ms: fetch_timeout.as_millis() as u64,
                })??;

                let rows_fetched = fetched.row_count() as u64;
                let mut batch = fetched.qualified(&step.alias);
                if let Some(residual) = &step.residual {
                    batch = apply_filter(batch, residual)?;
                }
                Ok((batch, rows_fetched))
            }));
        }
        Ok(handles)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

async fn await_fetch(
    handle: JoinHandle<WeaveResult<(RowBatch, u64)>>,
) -> WeaveResult<(RowBatch, u64)> {
    handle
        .await
        .map_err(|e| WeaveError::Internal(format!("fetch task failed: {}", e)))?
}
