use crate::engine::query_planner::ExecutionPlan;
use crate::utils::types::Direction;

/// Human-readable description of an execution plan: fetch order, per-step
/// pushdown decision, join kinds, and the in-memory tail. Building one reads
/// the plan only — cache and statistics are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDescription {
    pub steps: Vec<String>,
}

impl std::fmt::Display for PlanDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, step) in self.steps.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Render a plan into its step list.
pub fn describe(plan: &ExecutionPlan) -> PlanDescription {
    let mut steps = Vec::new();

    for fetch in &plan.fetches {
        let mut line = format!("fetch {}.{} AS {}", fetch.database, fetch.table, fetch.alias);
        if fetch.columns.is_empty() {
            line.push_str(" (all columns)");
        } else {
            line.push_str(&format!(" (columns: {})", fetch.columns.join(", ")));
        }
        match &fetch.pushdown {
            Some(predicate) => line.push_str(&format!(" pushdown: {}", predicate.render())),
            None => line.push_str(" pushdown: none"),
        }
        if let Some(residual) = &fetch.residual {
            line.push_str(&format!(" filter after fetch: {}", residual.render()));
        }
        steps.push(line);
    }

    for (idx, join) in plan.joins.iter().enumerate() {
        steps.push(format!(
            "join {}: {} JOIN {} ON {} = {}",
            idx + 1,
            join.kind,
            join.right_alias,
            join.left_column.render(),
            join.right_column.render()
        ));
    }

    if let Some(post_filter) = &plan.post_filter {
        steps.push(format!("filter after joins: {}", post_filter.render()));
    }

    if let Some(aggregate) = &plan.aggregate {
        let mut line = String::from("aggregate:");
        if !aggregate.group_by.is_empty() {
            let keys: Vec<String> = aggregate.group_by.iter().map(|c| c.render()).collect();
            line.push_str(&format!(" group by {}", keys.join(", ")));
        } else {
            line.push_str(" all rows as one group");
        }
        if !aggregate.aggregates.is_empty() {
            let fns: Vec<String> = aggregate.aggregates.iter().map(|c| c.render()).collect();
            line.push_str(&format!("; compute {}", fns.join(", ")));
        }
        if let Some(having) = &aggregate.having {
            line.push_str(&format!("; having {}", having.render()));
        }
        steps.push(line);
    }

    if !plan.order_by.is_empty() {
        let keys: Vec<String> = plan
            .order_by
            .iter()
            .map(|(column, direction)| {
                let direction = match direction {
                    Direction::Ascending => "ASC",
                    Direction::Descending => "DESC",
                };
                format!("{} {}", column.render(), direction)
            })
            .collect();
        steps.push(format!("sort: {}", keys.join(", ")));
    }

    if let Some(limit) = plan.limit {
        steps.push(format!("limit: {}", limit));
    }

    let projection: Vec<String> = plan.projection.iter().map(|c| c.render()).collect();
    steps.push(format!("project: {}", projection.join(", ")));

    PlanDescription { steps }
}
