use std::collections::BTreeSet;
use tracing::debug;

use crate::connectors::ConnectorRegistry;
use crate::utils::error::{PlanError, WeaveResult};
use crate::utils::types::{
    ColumnRef, Direction, JoinKind, Predicate, SelectStatement,
};

/// One backend fetch: a source table, the columns the query needs from it,
/// and the filters decided for it — `pushdown` travels to the backend,
/// `residual` is evaluated in memory after fetch, before joining.
#[derive(Debug, Clone)]
pub struct FetchStep {
    pub database: String,
    pub table: String,
    pub alias: String,
    /// Columns requested from the backend; empty means all.
    pub columns: Vec<String>,
    pub pushdown: Option<Predicate>,
    pub residual: Option<Predicate>,
}

/// One pairwise join: the accumulated left side against the fetch named by
/// `right_alias`.
#[derive(Debug, Clone)]
pub struct JoinStep {
    pub kind: JoinKind,
    pub left_column: ColumnRef,
    pub right_column: ColumnRef,
    pub right_alias: String,
}

/// Grouping and aggregate computation, with the optional HAVING filter
/// applied to the aggregated partitions.
#[derive(Debug, Clone)]
pub struct AggregateStep {
    pub group_by: Vec<ColumnRef>,
    pub aggregates: Vec<ColumnRef>,
    pub having: Option<Predicate>,
}

/// Complete execution plan: fetch steps in FROM/JOIN order, pairwise join
/// steps left to right (written order, no cost-based reordering), then the
/// in-memory relational tail.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub fetches: Vec<FetchStep>,
    pub joins: Vec<JoinStep>,
    /// Filter conjuncts spanning several sources (reachable through OR);
    /// evaluated once the full join output exists.
    pub post_filter: Option<Predicate>,
    pub aggregate: Option<AggregateStep>,
    pub order_by: Vec<(ColumnRef, Direction)>,
    pub limit: Option<u64>,
    pub projection: Vec<ColumnRef>,
}

/// Plans one parsed statement against the connector registry.
///
/// Validation happens entirely up front: every logical database must resolve
/// before a single fetch is issued, so a planning failure has no partial
/// side effects.
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(
        &self,
        statement: &SelectStatement,
        registry: &ConnectorRegistry,
    ) -> WeaveResult<ExecutionPlan> {
        let tables = statement.tables();

        // Resolve every database first; unknown names fail with zero fetches.
        for table in &tables {
            if !registry.contains(&table.database) {
                return Err(PlanError::UnknownDatabase {
                    database: table.database.clone(),
                    available: registry.databases(),
                }
                .into());
            }
        }

        self.check_join_order(statement)?;
        let aggregate = self.build_aggregate_step(statement);
        if aggregate.is_some() {
            self.check_aggregate_usage(statement)?;
        }

        let mut fetches: Vec<FetchStep> = tables
            .iter()
            .map(|table| FetchStep {
                database: table.database.clone(),
                table: table.table.clone(),
                alias: table.alias.clone(),
                columns: Vec::new(),
                pushdown: None,
                residual: None,
            })
            .collect();

        self.assign_requested_columns(statement, &mut fetches)?;
        let post_filter = self.assign_filters(statement, &mut fetches, registry)?;

        let joins = statement
            .joins
            .iter()
            .map(|join| JoinStep {
                kind: join.kind,
                left_column: join.left_column.clone(),
                right_column: join.right_column.clone(),
                right_alias: join.table.alias.clone(),
            })
            .collect();

        let plan = ExecutionPlan {
            fetches,
            joins,
            post_filter,
            aggregate,
            order_by: statement.order_by.clone(),
            limit: statement.limit,
            projection: statement.columns.clone(),
        };
        debug!(
            fetches = plan.fetches.len(),
            joins = plan.joins.len(),
            grouped = plan.aggregate.is_some(),
            "execution plan built"
        );
        Ok(plan)
    }

    /// Joins run left to right, so each ON condition may only look at the
    /// joined table and aliases accumulated before it.
    fn check_join_order(&self, statement: &SelectStatement) -> WeaveResult<()> {
        let mut seen: Vec<&str> = vec![&statement.from.alias];
        for join in &statement.joins {
            let left_source = join.left_column.source.as_deref().unwrap_or_default();
            if !seen.contains(&left_source) {
                return Err(PlanError::UnsupportedJoin {
                    reason: format!(
                        "ON condition references '{}' before it is joined",
                        join.left_column.render()
                    ),
                }
                .into());
            }
            seen.push(&join.table.alias);
        }
        Ok(())
    }

    /// With aggregates in play, every bare projection column must be grouped.
    fn check_aggregate_usage(&self, statement: &SelectStatement) -> WeaveResult<()> {
        for column in &statement.columns {
            if column.aggregate.is_some() {
                continue;
            }
            let grouped = statement
                .group_by
                .iter()
                .any(|g| g.source == column.source && g.name == column.name);
            if !grouped {
                return Err(PlanError::InvalidAggregate {
                    column: column.render(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Work out which columns each source must deliver. A wildcard reference
    /// widens its source (or every source) to a full fetch.
    fn assign_requested_columns(
        &self,
        statement: &SelectStatement,
        fetches: &mut [FetchStep],
    ) -> WeaveResult<()> {
        let single_alias = match fetches {
            [only] => Some(only.alias.clone()),
            _ => None,
        };
        let mut wants_all: BTreeSet<String> = BTreeSet::new();
        let mut wanted: Vec<BTreeSet<String>> = vec![BTreeSet::new(); fetches.len()];

        let mut references: Vec<ColumnRef> = statement.columns.clone();
        references.extend(statement.group_by.iter().cloned());
        references.extend(statement.order_by.iter().map(|(c, _)| c.clone()));
        for join in &statement.joins {
            references.push(join.left_column.clone());
            references.push(join.right_column.clone());
        }
        if let Some(selection) = &statement.selection {
            selection.columns(&mut references);
        }
        if let Some(having) = &statement.having {
            having.columns(&mut references);
        }

        for reference in references {
            if reference.is_wildcard() {
                match &reference.source {
                    Some(source) => {
                        wants_all.insert(source.clone());
                    }
                    None => {
                        for fetch in fetches.iter() {
                            wants_all.insert(fetch.alias.clone());
                        }
                    }
                }
                continue;
            }
            let alias = match (&reference.source, &single_alias) {
                (Some(source), _) => source.clone(),
                (None, Some(alias)) => alias.clone(),
                (None, None) => {
                    return Err(PlanError::AmbiguousColumn {
                        column: reference.render(),
                    }
                    .into())
                }
            };
            if let Some(idx) = fetches.iter().position(|f| f.alias == alias) {
                wanted[idx].insert(reference.name.clone());
            }
        }

        for (idx, fetch) in fetches.iter_mut().enumerate() {
            if wants_all.contains(&fetch.alias) {
                fetch.columns = Vec::new();
            } else {
                fetch.columns = wanted[idx].iter().cloned().collect();
            }
        }
        Ok(())
    }

    /// Classify WHERE conjuncts: single-source conjuncts travel to their
    /// source (pushed down when the connector supports it, residual
    /// otherwise); anything spanning several sources runs after the joins.
    fn assign_filters(
        &self,
        statement: &SelectStatement,
        fetches: &mut [FetchStep],
        registry: &ConnectorRegistry,
    ) -> WeaveResult<Option<Predicate>> {
        let selection = match &statement.selection {
            Some(selection) => selection.clone(),
            None => return Ok(None),
        };
        let single_alias = match fetches {
            [only] => Some(only.alias.clone()),
            _ => None,
        };

        let mut pushdown: Vec<Vec<Predicate>> = vec![Vec::new(); fetches.len()];
        let mut residual: Vec<Vec<Predicate>> = vec![Vec::new(); fetches.len()];
        let mut post_join: Vec<Predicate> = Vec::new();

        for conjunct in selection.conjuncts() {
            let mut columns = Vec::new();
            conjunct.columns(&mut columns);
            let aliases: BTreeSet<String> = columns
                .iter()
                .map(|c| {
                    c.source
                        .clone()
                        .or_else(|| single_alias.clone())
                        .unwrap_or_default()
                })
                .collect();

            let owner = match (aliases.len(), aliases.iter().next()) {
                (1, Some(alias)) => fetches.iter().position(|f| &f.alias == alias),
                _ => None,
            };
            match owner {
                Some(idx) => {
                    let supported = registry
                        .get(&fetches[idx].database)
                        .map(|c| c.supports_pushdown())
                        .unwrap_or(false);
                    if supported {
                        debug!(
                            alias = %fetches[idx].alias,
                            filter = %conjunct.render(),
                            "pushing filter down"
                        );
                        pushdown[idx].push(strip_source(conjunct));
                    } else {
                        residual[idx].push(conjunct);
                    }
                }
                None => post_join.push(conjunct),
            }
        }

        for (idx, fetch) in fetches.iter_mut().enumerate() {
            fetch.pushdown = Predicate::from_conjuncts(std::mem::take(&mut pushdown[idx]));
            fetch.residual = Predicate::from_conjuncts(std::mem::take(&mut residual[idx]));
        }
        Ok(Predicate::from_conjuncts(post_join))
    }

    /// Aggregates needed at execution: those in the SELECT list plus any
    /// referenced only by HAVING or ORDER BY, deduplicated by rendering.
    fn build_aggregate_step(&self, statement: &SelectStatement) -> Option<AggregateStep> {
        let mut aggregates: Vec<ColumnRef> = Vec::new();
        let mut add = |column: &ColumnRef| {
            if column.aggregate.is_some()
                && !aggregates.iter().any(|a| a.render() == column.render())
            {
                aggregates.push(column.clone());
            }
        };
        for column in &statement.columns {
            add(column);
        }
        let mut having_columns = Vec::new();
        if let Some(having) = &statement.having {
            having.columns(&mut having_columns);
        }
        for column in &having_columns {
            add(column);
        }
        for (column, _) in &statement.order_by {
            add(column);
        }

        // HAVING forces aggregation even without GROUP BY or aggregate
        // functions, so its filter is never silently dropped.
        if aggregates.is_empty() && statement.group_by.is_empty() && statement.having.is_none() {
            return None;
        }
        Some(AggregateStep {
            group_by: statement.group_by.clone(),
            aggregates,
            having: statement.having.clone(),
        })
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// A predicate pushed to a backend refers to the backend's own bare column
/// names; the source alias only means something inside the engine.
fn strip_source(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::And(l, r) => {
            Predicate::And(Box::new(strip_source(*l)), Box::new(strip_source(*r)))
        }
        Predicate::Or(l, r) => {
            Predicate::Or(Box::new(strip_source(*l)), Box::new(strip_source(*r)))
        }
        Predicate::Compare { column, op, value } => Predicate::Compare {
            column: ColumnRef {
                source: None,
                ..column
            },
            op,
            value,
        },
        Predicate::IsNull { column, negated } => Predicate::IsNull {
            column: ColumnRef {
                source: None,
                ..column
            },
            negated,
        },
    }
}
