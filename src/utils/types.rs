use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::time::Duration;

use crate::utils::error::{WeaveError, WeaveResult};

/// Individual cell values flowing through the engine.
///
/// `Opaque` carries backend-native rich types (JSON documents, arrays) through
/// the pipeline untouched; it supports equality comparison only.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Opaque(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Ordering comparison between two non-null values.
    ///
    /// Returns `None` when the pair is incomparable: mixed scalar types
    /// (other than integer/float, which coerce) and anything involving an
    /// opaque value. Callers treat `None` as unknown.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            // Timestamp columns are frequently compared against string
            // literals; parse the literal rather than failing the comparison.
            (Value::Timestamp(a), Value::Text(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
            (Value::Text(a), Value::Timestamp(b)) => parse_timestamp(a).map(|a| a.cmp(b)),
            _ => None,
        }
    }

    /// Total ordering used by ORDER BY: NULLs sort before non-NULL values,
    /// incomparable pairs fall back to a type-rank comparison so the sort
    /// stays consistent.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| format!("{}", self).cmp(&format!("{}", other)))
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Opaque(_) => 5,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Opaque(v) => write!(f, "{}", v),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

/// A row of data: values positional against the owning batch's column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// A set of rows sharing one ordered column list.
///
/// Backends contribute different column sets, so the schema travels with the
/// batch rather than living in a fixed struct. During multi-way joins the
/// columns are namespaced as `alias.column`; the final projection re-maps
/// them to the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Prefix every column with a source alias, producing `alias.column`
    /// names that stay unambiguous once several sources are joined.
    pub fn qualified(mut self, alias: &str) -> Self {
        self.columns = self
            .columns
            .iter()
            .map(|c| format!("{}.{}", alias, c))
            .collect();
        self
    }

    /// Narrow the batch to the named columns, in request order. Returns the
    /// first missing name on failure.
    pub fn project_named(&self, columns: &[String]) -> Result<RowBatch, String> {
        let mut indices = Vec::with_capacity(columns.len());
        for wanted in columns {
            match self.columns.iter().position(|c| c == wanted) {
                Some(idx) => indices.push(idx),
                None => return Err(wanted.clone()),
            }
        }
        let rows = self
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
            columns: columns.to_vec(),
            rows,
        })
    }

    /// Resolve a column reference against this batch's columns.
    ///
    /// Aggregate references resolve by their rendered output name (they only
    /// exist after the aggregation stage). Qualified references match
    /// `source.name` exactly; unqualified ones match a bare name or a unique
    /// `*.name` suffix.
    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        if column.aggregate.is_some() {
            let rendered = column.render();
            return self.columns.iter().position(|c| *c == rendered);
        }
        if let Some(source) = &column.source {
            let qualified = format!("{}.{}", source, column.name);
            return self.columns.iter().position(|c| *c == qualified);
        }
        if let Some(idx) = self.columns.iter().position(|c| *c == column.name) {
            return Some(idx);
        }
        let suffix = format!(".{}", column.name);
        let mut matches = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }
}

/// Aggregate functions supported in the SELECT list and HAVING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

/// A column reference: optionally source-qualified, optionally wrapped in an
/// aggregate, optionally carrying an output alias from `AS`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub source: Option<String>,
    pub name: String,
    pub aggregate: Option<AggregateFn>,
    pub alias: Option<String>,
}

impl ColumnRef {
    pub fn new(name: &str) -> Self {
        Self {
            source: None,
            name: name.to_string(),
            aggregate: None,
            alias: None,
        }
    }

    pub fn qualified(source: &str, name: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            name: name.to_string(),
            aggregate: None,
            alias: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// Canonical rendering: `sum(o.total)`, `count(*)`, `u.name`, `name`.
    pub fn render(&self) -> String {
        let base = match &self.source {
            Some(source) => format!("{}.{}", source, self.name),
            None => self.name.clone(),
        };
        match self.aggregate {
            Some(agg) => format!("{}({})", agg.name(), base),
            None => base,
        }
    }

    /// Name the column carries in final output: the `AS` alias when present,
    /// the canonical aggregate rendering for aggregates, the bare column name
    /// otherwise.
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if self.aggregate.is_some() {
            return self.render();
        }
        self.name.clone()
    }
}

/// Source table qualified by a logical backend name.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub database: String,
    pub table: String,
    pub alias: String,
}

/// The four supported join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        };
        write!(f, "{}", name)
    }
}

/// One JOIN clause: a table and exactly one equality condition, one column
/// from each side.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub left_column: ColumnRef,
    pub right_column: ColumnRef,
}

/// Comparison operators usable in WHERE and HAVING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// A filter expression tree over comparisons, IS [NOT] NULL, AND and OR.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
}

impl Predicate {
    /// Evaluate against one row under three-valued NULL semantics: a
    /// comparison touching NULL is unknown and unknown collapses to false.
    /// NOT is not part of the surface grammar, so the collapse is sound for
    /// AND/OR composition.
    pub fn evaluate(&self, columns: &RowBatch, row: &Row) -> WeaveResult<bool> {
        match self {
            Predicate::And(left, right) => {
                Ok(left.evaluate(columns, row)? && right.evaluate(columns, row)?)
            }
            Predicate::Or(left, right) => {
                Ok(left.evaluate(columns, row)? || right.evaluate(columns, row)?)
            }
            Predicate::Compare { column, op, value } => {
                let cell = Self::cell(columns, row, column)?;
                Ok(compare_cell(cell, *op, value))
            }
            Predicate::IsNull { column, negated } => {
                let cell = Self::cell(columns, row, column)?;
                Ok(cell.is_null() != *negated)
            }
        }
    }

    fn cell<'a>(columns: &RowBatch, row: &'a Row, column: &ColumnRef) -> WeaveResult<&'a Value> {
        let index = columns.column_index(column).ok_or_else(|| {
            WeaveError::Internal(format!(
                "filter column '{}' not present in row set",
                column.render()
            ))
        })?;
        Ok(row.get(index).unwrap_or(&Value::Null))
    }

    /// Collect every column reference in the tree, for pushdown
    /// classification by the planner.
    pub fn columns(&self, out: &mut Vec<ColumnRef>) {
        match self {
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.columns(out);
                right.columns(out);
            }
            Predicate::Compare { column, .. } | Predicate::IsNull { column, .. } => {
                out.push(column.clone());
            }
        }
    }

    /// Split the top-level AND chain into its conjuncts.
    pub fn conjuncts(self) -> Vec<Predicate> {
        match self {
            Predicate::And(left, right) => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Reassemble a conjunct list into one AND tree.
    pub fn from_conjuncts(mut parts: Vec<Predicate>) -> Option<Predicate> {
        let first = match parts.is_empty() {
            true => return None,
            false => parts.remove(0),
        };
        Some(parts.into_iter().fold(first, |acc, p| {
            Predicate::And(Box::new(acc), Box::new(p))
        }))
    }

    pub fn render(&self) -> String {
        match self {
            Predicate::And(left, right) => format!("({} AND {})", left.render(), right.render()),
            Predicate::Or(left, right) => format!("({} OR {})", left.render(), right.render()),
            Predicate::Compare { column, op, value } => {
                format!("{} {} {}", column.render(), op.symbol(), value)
            }
            Predicate::IsNull { column, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", column.render())
                } else {
                    format!("{} IS NULL", column.render())
                }
            }
        }
    }
}

fn compare_cell(cell: &Value, op: CompareOp, literal: &Value) -> bool {
    if cell.is_null() || literal.is_null() {
        return false;
    }
    // Opaque values support equality only; ordering against them is unknown.
    if matches!(cell, Value::Opaque(_)) || matches!(literal, Value::Opaque(_)) {
        return match op {
            CompareOp::Eq => cell == literal,
            CompareOp::NotEq => cell != literal,
            _ => false,
        };
    }
    match cell.compare(literal) {
        Some(ordering) => match op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        },
        None => false,
    }
}

/// Sort direction for ORDER BY keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Parsed representation of one SELECT statement. Transient: created per
/// parse call and discarded after planning.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<ColumnRef>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub selection: Option<Predicate>,
    pub group_by: Vec<ColumnRef>,
    pub having: Option<Predicate>,
    pub order_by: Vec<(ColumnRef, Direction)>,
    pub limit: Option<u64>,
}

impl SelectStatement {
    /// All source tables in FROM/JOIN order.
    pub fn tables(&self) -> Vec<&TableRef> {
        let mut tables = vec![&self.from];
        tables.extend(self.joins.iter().map(|j| &j.table));
        tables
    }
}

/// Per-query execution metrics reported alongside the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    pub execution_time_ms: u64,
    pub rows_scanned: u64,
}

/// Final result of `Engine::execute`.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub stats: QueryStats,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Copy of this output with per-execution stats replaced, used when a
    /// cached result is served under a new call's timing.
    pub fn with_stats(&self, execution_time: Duration, rows_scanned: u64) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            stats: QueryStats {
                execution_time_ms: execution_time.as_millis() as u64,
                rows_scanned,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(columns: &[&str], rows: Vec<Vec<Value>>) -> RowBatch {
        RowBatch {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter().map(Row::new).collect(),
        }
    }

    #[test]
    fn test_value_compare_numeric_coercion() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Float(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(1.5).compare(&Value::Integer(2)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_value_compare_mixed_types_unknown() {
        assert_eq!(Value::Integer(1).compare(&Value::Text("1".into())), None);
        assert_eq!(
            Value::Opaque(serde_json::json!({"a": 1})).compare(&Value::Integer(1)),
            None
        );
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(0)), Ordering::Less);
        assert_eq!(Value::Integer(0).sort_cmp(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.sort_cmp(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_column_resolution() {
        let b = batch(&["u.id", "u.name", "o.total"], vec![]);

        let qualified = ColumnRef::qualified("u", "id");
        assert_eq!(b.column_index(&qualified), Some(0));

        let unqualified = ColumnRef::new("total");
        assert_eq!(b.column_index(&unqualified), Some(2));

        let missing = ColumnRef::new("missing");
        assert_eq!(b.column_index(&missing), None);
    }

    #[test]
    fn test_column_resolution_ambiguous_suffix() {
        let b = batch(&["u.id", "o.id"], vec![]);
        assert_eq!(b.column_index(&ColumnRef::new("id")), None);
    }

    #[test]
    fn test_aggregate_resolution_by_rendered_name() {
        let b = batch(&["u.city", "count(*)"], vec![]);
        let count_star = ColumnRef {
            source: None,
            name: "*".into(),
            aggregate: Some(AggregateFn::Count),
            alias: None,
        };
        assert_eq!(b.column_index(&count_star), Some(1));
    }

    #[test]
    fn test_predicate_null_comparison_is_unknown() {
        let b = batch(&["age"], vec![vec![Value::Null]]);
        let pred = Predicate::Compare {
            column: ColumnRef::new("age"),
            op: CompareOp::Eq,
            value: Value::Null,
        };
        // NULL = NULL is unknown, not true.
        assert!(!pred.evaluate(&b, &b.rows[0]).unwrap());
    }

    #[test]
    fn test_predicate_and_or() {
        let b = batch(
            &["age", "name"],
            vec![vec![Value::Integer(30), Value::Text("Ada".into())]],
        );
        let age = |op, v| Predicate::Compare {
            column: ColumnRef::new("age"),
            op,
            value: Value::Integer(v),
        };
        let both = Predicate::And(
            Box::new(age(CompareOp::Gt, 18)),
            Box::new(age(CompareOp::Lt, 25)),
        );
        assert!(!both.evaluate(&b, &b.rows[0]).unwrap());

        let either = Predicate::Or(
            Box::new(age(CompareOp::Gt, 18)),
            Box::new(age(CompareOp::Lt, 25)),
        );
        assert!(either.evaluate(&b, &b.rows[0]).unwrap());
    }

    #[test]
    fn test_predicate_is_null() {
        let b = batch(&["email"], vec![vec![Value::Null]]);
        let is_null = Predicate::IsNull {
            column: ColumnRef::new("email"),
            negated: false,
        };
        let not_null = Predicate::IsNull {
            column: ColumnRef::new("email"),
            negated: true,
        };
        assert!(is_null.evaluate(&b, &b.rows[0]).unwrap());
        assert!(!not_null.evaluate(&b, &b.rows[0]).unwrap());
    }

    #[test]
    fn test_opaque_equality_only() {
        let doc = Value::Opaque(serde_json::json!({"tags": ["a", "b"]}));
        let b = batch(&["meta"], vec![vec![doc.clone()]]);
        let eq = Predicate::Compare {
            column: ColumnRef::new("meta"),
            op: CompareOp::Eq,
            value: doc.clone(),
        };
        let lt = Predicate::Compare {
            column: ColumnRef::new("meta"),
            op: CompareOp::Lt,
            value: doc,
        };
        assert!(eq.evaluate(&b, &b.rows[0]).unwrap());
        assert!(!lt.evaluate(&b, &b.rows[0]).unwrap());
    }

    #[test]
    fn test_conjunct_splitting() {
        let leaf = |name: &str| Predicate::IsNull {
            column: ColumnRef::new(name),
            negated: false,
        };
        let tree = Predicate::And(
            Box::new(leaf("a")),
            Box::new(Predicate::And(
                Box::new(leaf("b")),
                Box::new(Predicate::Or(Box::new(leaf("c")), Box::new(leaf("d")))),
            )),
        );
        let parts = tree.conjuncts();
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[2], Predicate::Or(_, _)));
    }

    #[test]
    fn test_qualified_batch() {
        let b = batch(&["id", "name"], vec![]).qualified("u");
        assert_eq!(b.columns, vec!["u.id".to_string(), "u.name".to_string()]);
    }

    #[test]
    fn test_column_ref_rendering() {
        let plain = ColumnRef::qualified("o", "total");
        assert_eq!(plain.render(), "o.total");
        assert_eq!(plain.output_name(), "total");

        let agg = ColumnRef {
            source: Some("o".into()),
            name: "total".into(),
            aggregate: Some(AggregateFn::Sum),
            alias: None,
        };
        assert_eq!(agg.render(), "sum(o.total)");
        assert_eq!(agg.output_name(), "sum(o.total)");

        let aliased = ColumnRef {
            alias: Some("revenue".into()),
            ..agg
        };
        assert_eq!(aliased.output_name(), "revenue");
    }
}
