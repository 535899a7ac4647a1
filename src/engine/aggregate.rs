use std::collections::HashMap;

use crate::engine::query_planner::AggregateStep;
use crate::utils::error::{WeaveError, WeaveResult};
use crate::utils::types::{
    AggregateFn, ColumnRef, Direction, Predicate, Row, RowBatch, Value,
};

/// Hashable projection of a group-key value.
///
/// Unlike join keys, NULL is a real group key: rows with a NULL group value
/// form their own partition (SQL GROUP BY convention), while a NULL join key
/// matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(u64),
    Text(String),
    Timestamp(i64),
    Opaque(String),
}

fn group_key(value: &Value) -> GroupKey {
    match value {
        Value::Null => GroupKey::Null,
        Value::Boolean(b) => GroupKey::Boolean(*b),
        Value::Integer(i) => GroupKey::Integer(*i),
        Value::Float(f) => {
            let normalized = if *f == 0.0 { 0.0 } else { *f };
            GroupKey::Float(normalized.to_bits())
        }
        Value::Text(s) => GroupKey::Text(s.clone()),
        Value::Timestamp(ts) => GroupKey::Timestamp(ts.timestamp_micros()),
        Value::Opaque(v) => GroupKey::Opaque(v.to_string()),
    }
}

/// Keep only rows matching the predicate.
pub fn apply_filter(batch: RowBatch, predicate: &Predicate) -> WeaveResult<RowBatch> {
    let mut kept = Vec::with_capacity(batch.rows.len());
    for row in &batch.rows {
        if predicate.evaluate(&batch, row)? {
            kept.push(row.clone());
        }
    }
    Ok(RowBatch {
        columns: batch.columns,
        rows: kept,
    })
}

/// Partition rows by the group-key tuple and compute the step's aggregates.
///
/// Output columns are the group keys (under their incoming names) followed
/// by the aggregates (under their canonical rendering), so later stages
/// resolve references the same way they would against any other batch.
/// Partitions appear in first-seen order. HAVING filters the aggregated
/// partitions at the end.
pub fn apply_aggregate(batch: &RowBatch, step: &AggregateStep) -> WeaveResult<RowBatch> {
    let key_indices: Vec<usize> = step
        .group_by
        .iter()
        .map(|column| {
            batch.column_index(column).ok_or_else(|| {
                WeaveError::Internal(format!(
                    "group column '{}' not found in row set",
                    column.render()
                ))
            })
        })
        .collect::<WeaveResult<_>>()?;

    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut partitions: HashMap<Vec<GroupKey>, usize> = HashMap::new();
    for (row_idx, row) in batch.rows.iter().enumerate() {
        let key: Vec<GroupKey> = key_indices
            .iter()
            .map(|&i| group_key(row.get(i).unwrap_or(&Value::Null)))
            .collect();
        match partitions.get(&key) {
            Some(&slot) => order[slot].push(row_idx),
            None => {
                partitions.insert(key, order.len());
                order.push(vec![row_idx]);
            }
        }
    }

    // A global aggregate (no GROUP BY) always yields exactly one row, even
    // over empty input: COUNT(*) = 0, SUM = 0, AVG = NULL.
    if step.group_by.is_empty() && order.is_empty() {
        order.push(Vec::new());
    }

    let mut columns: Vec<String> = key_indices
        .iter()
        .map(|&i| batch.columns[i].clone())
        .collect();
    columns.extend(step.aggregates.iter().map(|a| a.render()));

    let mut out = RowBatch::new(columns);
    for members in &order {
        let mut values: Vec<Value> = key_indices
            .iter()
            .map(|&i| {
                members
                    .first()
                    .map(|&row| batch.rows[row].get(i).cloned().unwrap_or(Value::Null))
                    .unwrap_or(Value::Null)
            })
            .collect();
        for aggregate in &step.aggregates {
            values.push(compute_aggregate(batch, members, aggregate)?);
        }
        out.rows.push(Row::new(values));
    }

    match &step.having {
        Some(having) => apply_filter(out, having),
        None => Ok(out),
    }
}

fn compute_aggregate(
    batch: &RowBatch,
    members: &[usize],
    aggregate: &ColumnRef,
) -> WeaveResult<Value> {
    let function = aggregate
        .aggregate
        .ok_or_else(|| WeaveError::Internal("aggregate step without function".to_string()))?;

    // COUNT(*) counts rows, NULLs included.
    if aggregate.is_wildcard() {
        return Ok(Value::Integer(members.len() as i64));
    }

    let input = ColumnRef {
        aggregate: None,
        alias: None,
        ..aggregate.clone()
    };
    let idx = batch.column_index(&input).ok_or_else(|| {
        WeaveError::Internal(format!(
            "aggregate input '{}' not found in row set",
            input.render()
        ))
    })?;
    let values = members
        .iter()
        .map(|&row| batch.rows[row].get(idx).unwrap_or(&Value::Null))
        .filter(|v| !v.is_null());

    match function {
        AggregateFn::Count => Ok(Value::Integer(values.count() as i64)),
        AggregateFn::Sum => sum_values(values),
        AggregateFn::Avg => {
            let mut count = 0u64;
            let mut total = 0.0f64;
            for value in values {
                match value {
                    Value::Integer(i) => total += *i as f64,
                    Value::Float(f) => total += f,
                    other => return Err(non_numeric(function, other)),
                }
                count += 1;
            }
            if count == 0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(total / count as f64))
            }
        }
        AggregateFn::Min | AggregateFn::Max => {
            let mut best: Option<&Value> = None;
            for value in values {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let keep_new = match function {
                            AggregateFn::Min => value.sort_cmp(current).is_lt(),
                            _ => value.sort_cmp(current).is_gt(),
                        };
                        if keep_new {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
    }
}

/// SUM ignores NULLs and is integer 0 over zero contributing values; any
/// float input promotes the whole sum to float.
fn sum_values<'a>(values: impl Iterator<Item = &'a Value>) -> WeaveResult<Value> {
    let mut int_sum = 0i64;
    let mut float_sum = 0.0f64;
    let mut saw_float = false;
    for value in values {
        match value {
            Value::Integer(i) => {
                int_sum = int_sum.wrapping_add(*i);
                float_sum += *i as f64;
            }
            Value::Float(f) => {
                saw_float = true;
                float_sum += f;
            }
            other => return Err(non_numeric(AggregateFn::Sum, other)),
        }
    }
    if saw_float {
        Ok(Value::Float(float_sum))
    } else {
        Ok(Value::Integer(int_sum))
    }
}

fn non_numeric(function: AggregateFn, value: &Value) -> WeaveError {
    WeaveError::Internal(format!(
        "{} over non-numeric value of type {}",
        function.name(),
        value.type_name()
    ))
}

/// Stable multi-key sort; NULLs sort before non-NULL values, ascending by
/// default.
pub fn apply_sort(batch: &mut RowBatch, keys: &[(ColumnRef, Direction)]) -> WeaveResult<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let resolved: Vec<(usize, Direction)> = keys
        .iter()
        .map(|(column, direction)| {
            batch
                .column_index(column)
                .map(|idx| (idx, *direction))
                .ok_or_else(|| {
                    WeaveError::Internal(format!(
                        "sort column '{}' not found in row set",
                        column.render()
                    ))
                })
        })
        .collect::<WeaveResult<_>>()?;

    batch.rows.sort_by(|a, b| {
        for (idx, direction) in &resolved {
            let left = a.get(*idx).unwrap_or(&Value::Null);
            let right = b.get(*idx).unwrap_or(&Value::Null);
            let ordering = left.sort_cmp(right);
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if !ordering.is_eq() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

/// Truncate to the first `limit` rows. Applied last, after sort.
pub fn apply_limit(batch: &mut RowBatch, limit: u64) {
    let limit = limit as usize;
    if batch.rows.len() > limit {
        batch.rows.truncate(limit);
    }
}

/// Re-project the namespaced working batch to the SELECT list, giving each
/// output column its display name. Wildcards expand in place; their columns
/// drop the `alias.` prefix when the bare name is unambiguous.
pub fn apply_projection(batch: &RowBatch, projection: &[ColumnRef]) -> WeaveResult<RowBatch> {
    let mut indices: Vec<usize> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for column in projection {
        if column.is_wildcard() && column.aggregate.is_none() {
            let prefix = column.source.as_ref().map(|s| format!("{}.", s));
            for (idx, name) in batch.columns.iter().enumerate() {
                if let Some(prefix) = &prefix {
                    if !name.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                indices.push(idx);
                names.push(display_name(&batch.columns, name));
            }
            continue;
        }
        let idx = batch.column_index(column).ok_or_else(|| {
            WeaveError::Internal(format!(
                "projection column '{}' not found in row set",
                column.render()
            ))
        })?;
        indices.push(idx);
        names.push(column.output_name());
    }

    let rows = batch
        .rows
        .iter()
        .map(|row| {
            Row::new(
                indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect();
    Ok(RowBatch {
        columns: names,
        rows,
    })
}

fn display_name(all: &[String], qualified: &str) -> String {
    let bare = match qualified.split_once('.') {
        Some((_, bare)) => bare,
        None => return qualified.to_string(),
    };
    let suffix = format!(".{}", bare);
    let collisions = all.iter().filter(|c| c.ends_with(&suffix)).count();
    if collisions > 1 {
        qualified.to_string()
    } else {
        bare.to_string()
    }
}
