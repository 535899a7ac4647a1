use std::collections::HashMap;

use crate::utils::error::{JoinError, WeaveError, WeaveResult};
use crate::utils::types::{ColumnRef, JoinKind, Row, RowBatch, Value};

/// Hashable projection of a join-key value.
///
/// `Value` holds `f64`, so it cannot be a hash key directly; NULL
/// deliberately has no projection — a NULL join key never enters the index
/// and never matches (three-valued NULL semantics).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Boolean(bool),
    Integer(i64),
    Float(u64),
    Text(String),
    Timestamp(i64),
    Opaque(String),
}

fn join_key(value: &Value) -> Option<JoinKey> {
    match value {
        Value::Null => None,
        Value::Boolean(b) => Some(JoinKey::Boolean(*b)),
        Value::Integer(i) => Some(JoinKey::Integer(*i)),
        Value::Float(f) => {
            // Normalize the two zero encodings so 0.0 and -0.0 join.
            let normalized = if *f == 0.0 { 0.0 } else { *f };
            Some(JoinKey::Float(normalized.to_bits()))
        }
        Value::Text(s) => Some(JoinKey::Text(s.clone())),
        Value::Timestamp(ts) => Some(JoinKey::Timestamp(ts.timestamp_micros())),
        Value::Opaque(v) => Some(JoinKey::Opaque(v.to_string())),
    }
}

/// Join two row batches on one equality condition.
///
/// Builds a hash index on the right operand as supplied by the plan — never
/// on whichever side happens to be smaller — then probes with each left row:
/// O(N+M) time, memory proportional to the right side. The output schema is
/// the left columns followed by the right columns.
pub fn hash_join(
    left: &RowBatch,
    right: &RowBatch,
    left_column: &ColumnRef,
    right_column: &ColumnRef,
    kind: JoinKind,
) -> WeaveResult<RowBatch> {
    let left_idx = resolve(left, left_column)?;
    let right_idx = resolve(right, right_column)?;
    check_types(left, left_idx, right, right_idx, left_column, right_column)?;

    let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(key) = row.get(right_idx).and_then(join_key) {
            index.entry(key).or_default().push(i);
        }
    }

    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().cloned());
    let mut out = RowBatch::new(columns);
    let mut matched_right = vec![false; right.rows.len()];

    for left_row in &left.rows {
        let matches = left_row
            .get(left_idx)
            .and_then(join_key)
            .and_then(|key| index.get(&key));
        match matches {
            Some(right_indices) => {
                for &ri in right_indices {
                    matched_right[ri] = true;
                    out.rows.push(concat(left_row, &right.rows[ri]));
                }
            }
            None => {
                if matches!(kind, JoinKind::Left | JoinKind::Full) {
                    out.rows.push(concat(left_row, &null_row(right.columns.len())));
                }
            }
        }
    }

    if matches!(kind, JoinKind::Right | JoinKind::Full) {
        let left_nulls = null_row(left.columns.len());
        for (ri, matched) in matched_right.iter().enumerate() {
            if !matched {
                out.rows.push(concat(&left_nulls, &right.rows[ri]));
            }
        }
    }

    Ok(out)
}

fn resolve(batch: &RowBatch, column: &ColumnRef) -> WeaveResult<usize> {
    batch.column_index(column).ok_or_else(|| {
        WeaveError::Internal(format!(
            "join column '{}' not found in row set",
            column.render()
        ))
    })
}

/// Join columns must hold one scalar type per side and the same type on both
/// sides, NULLs aside. Cross-type joins (including integer against float)
/// are an error, not a silent non-match.
fn check_types(
    left: &RowBatch,
    left_idx: usize,
    right: &RowBatch,
    right_idx: usize,
    left_column: &ColumnRef,
    right_column: &ColumnRef,
) -> WeaveResult<()> {
    let left_type = column_type(left, left_idx, left_column)?;
    let right_type = column_type(right, right_idx, right_column)?;
    if let (Some(lt), Some(rt)) = (left_type, right_type) {
        if lt != rt {
            return Err(JoinError::TypeMismatch {
                left_column: left_column.render(),
                right_column: right_column.render(),
                left_type: lt.to_string(),
                right_type: rt.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn column_type(
    batch: &RowBatch,
    idx: usize,
    column: &ColumnRef,
) -> WeaveResult<Option<&'static str>> {
    let mut seen: Option<&'static str> = None;
    for row in &batch.rows {
        let value = row.get(idx).unwrap_or(&Value::Null);
        if value.is_null() {
            continue;
        }
        match seen {
            None => seen = Some(value.type_name()),
            Some(kind) if kind != value.type_name() => {
                return Err(JoinError::TypeMismatch {
                    left_column: column.render(),
                    right_column: column.render(),
                    left_type: kind.to_string(),
                    right_type: value.type_name().to_string(),
                }
                .into());
            }
            Some(_) => {}
        }
    }
    Ok(seen)
}

fn concat(left: &Row, right: &Row) -> Row {
    let mut values = Vec::with_capacity(left.values.len() + right.values.len());
    values.extend(left.values.iter().cloned());
    values.extend(right.values.iter().cloned());
    Row::new(values)
}

fn null_row(width: usize) -> Row {
    Row::new(vec![Value::Null; width])
}
