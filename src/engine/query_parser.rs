use regex::Regex;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, GroupByExpr, JoinConstraint, JoinOperator,
    ObjectName, OrderByExpr, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};

use crate::utils::error::{ParseError, WeaveResult};
use crate::utils::types::{
    AggregateFn, ColumnRef, CompareOp, Direction, JoinClause, JoinKind, Predicate, SelectStatement,
    TableRef, Value,
};

/// SQL front end: parses the federated SELECT subset into a
/// [`SelectStatement`].
///
/// `sqlparser` handles tokenization and grammar; the conversion layer here
/// enforces the engine's subset — every table qualified as
/// `database.table`, single-equality ON conditions, no subqueries/CTEs/
/// windows — and rejects anything else with a `ParseError` naming the
/// construct, instead of a best-effort guess.
pub struct QueryParser {
    dialect: GenericDialect,
    error_format: Regex,
}

impl QueryParser {
    pub fn new() -> Self {
        // sqlparser reports errors as
        // "Expected <thing>, found: <token> at Line: <l>, Column: <c>".
        let error_format =
            Regex::new(r"(?s)^Expected:?\s*(.+?),\s*found:\s*(.+?)(?:\s+at Line:\s*(\d+),\s*Column:?\s*(\d+))?$")
                .expect("error format regex is valid");
        Self {
            dialect: GenericDialect {},
            error_format,
        }
    }

    /// Parse query text into the engine's AST.
    pub fn parse(&self, sql: &str) -> WeaveResult<SelectStatement> {
        let mut statements =
            Parser::parse_sql(&self.dialect, sql).map_err(|e| self.convert_parser_error(e))?;

        if statements.is_empty() {
            return Err(ParseError::Syntax {
                line: 0,
                column: 0,
                expected: "a SELECT statement".to_string(),
                found: "empty query".to_string(),
            }
            .into());
        }
        if statements.len() > 1 {
            return Err(unsupported("multiple statements in one query").into());
        }

        let statement = match statements.remove(0) {
            Statement::Query(query) => self.convert_query(*query)?,
            _ => return Err(unsupported("non-SELECT statement").into()),
        };

        validate(&statement)?;
        Ok(statement)
    }

    fn convert_parser_error(&self, error: ParserError) -> ParseError {
        let message = match error {
            ParserError::ParserError(msg) | ParserError::TokenizerError(msg) => msg,
            ParserError::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
        };
        if let Some(caps) = self.error_format.captures(&message) {
            let position = |idx: usize| {
                caps.get(idx)
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .unwrap_or(0)
            };
            return ParseError::Syntax {
                line: position(3),
                column: position(4),
                expected: caps[1].to_string(),
                found: caps[2].to_string(),
            };
        }
        ParseError::Syntax {
            line: 0,
            column: 0,
            expected: "a supported SELECT statement".to_string(),
            found: message,
        }
    }

    fn convert_query(&self, query: Query) -> Result<SelectStatement, ParseError> {
        if query.with.is_some() {
            return Err(unsupported("common table expression (WITH)"));
        }
        if query.offset.is_some() {
            return Err(unsupported("OFFSET"));
        }
        if !query.limit_by.is_empty() {
            return Err(unsupported("LIMIT BY"));
        }

        let select = match *query.body {
            SetExpr::Select(select) => *select,
            SetExpr::SetOperation { .. } => {
                return Err(unsupported("set operation (UNION/INTERSECT/EXCEPT)"))
            }
            SetExpr::Query(_) => return Err(unsupported("subquery")),
            _ => return Err(unsupported("non-SELECT query body")),
        };

        let (from, joins) = self.convert_from(&select)?;
        let columns = self.convert_projection(&select.projection)?;
        let selection = select
            .selection
            .as_ref()
            .map(|expr| self.convert_predicate(expr))
            .transpose()?;
        let group_by = self.convert_group_by(&select.group_by)?;
        let having = select
            .having
            .as_ref()
            .map(|expr| self.convert_predicate(expr))
            .transpose()?;
        let order_by = self.convert_order_by(&query.order_by)?;
        let limit = query
            .limit
            .as_ref()
            .map(|expr| self.convert_limit(expr))
            .transpose()?;

        Ok(SelectStatement {
            columns,
            from,
            joins,
            selection,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn convert_from(&self, select: &Select) -> Result<(TableRef, Vec<JoinClause>), ParseError> {
        if select.distinct.is_some() {
            return Err(unsupported("DISTINCT"));
        }
        if select.from.len() != 1 {
            return Err(unsupported(
                "comma-separated FROM list (use explicit JOIN clauses)",
            ));
        }
        let table_with_joins = &select.from[0];
        let from = self.convert_table(&table_with_joins.relation)?;

        let mut joins = Vec::with_capacity(table_with_joins.joins.len());
        for join in &table_with_joins.joins {
            let table = self.convert_table(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                JoinOperator::Inner(c) => (JoinKind::Inner, c),
                JoinOperator::LeftOuter(c) => (JoinKind::Left, c),
                JoinOperator::RightOuter(c) => (JoinKind::Right, c),
                JoinOperator::FullOuter(c) => (JoinKind::Full, c),
                JoinOperator::CrossJoin => return Err(unsupported("CROSS JOIN")),
                _ => return Err(unsupported("non-standard join operator")),
            };
            let (left_column, right_column) = self.convert_join_constraint(constraint, &table)?;
            joins.push(JoinClause {
                kind,
                table,
                left_column,
                right_column,
            });
        }
        Ok((from, joins))
    }

    fn convert_table(&self, factor: &TableFactor) -> Result<TableRef, ParseError> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let ObjectName(parts) = name;
                if parts.len() != 2 {
                    return Err(unsupported(
                        "unqualified table name (every table must be database.table)",
                    ));
                }
                let table = parts[1].value.clone();
                let alias = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| table.clone());
                Ok(TableRef {
                    database: parts[0].value.clone(),
                    table,
                    alias,
                })
            }
            TableFactor::Derived { .. } => Err(unsupported("subquery in FROM")),
            _ => Err(unsupported("non-table FROM item")),
        }
    }

    /// An ON clause must be exactly one equality between one column of the
    /// joined table and one column of the accumulated left side; the pair is
    /// normalized so the joined table's column lands on the right.
    fn convert_join_constraint(
        &self,
        constraint: &JoinConstraint,
        joined: &TableRef,
    ) -> Result<(ColumnRef, ColumnRef), ParseError> {
        let on = match constraint {
            JoinConstraint::On(expr) => expr,
            JoinConstraint::Using(_) => return Err(unsupported("USING join constraint")),
            JoinConstraint::Natural => return Err(unsupported("NATURAL join")),
            JoinConstraint::None => return Err(unsupported("join without ON condition")),
        };
        let (left, op, right) = match on {
            Expr::BinaryOp { left, op, right } => (left.as_ref(), op, right.as_ref()),
            _ => return Err(unsupported("non-equality join predicate")),
        };
        match op {
            BinaryOperator::Eq => {}
            BinaryOperator::And | BinaryOperator::Or => {
                return Err(unsupported("multiple conditions in one ON clause"))
            }
            _ => return Err(unsupported("non-equality join predicate")),
        }

        let left = self.convert_column(left)?;
        let right = self.convert_column(right)?;
        if left.aggregate.is_some() || right.aggregate.is_some() {
            return Err(unsupported("aggregate in ON clause"));
        }

        // Whichever side names the joined table becomes the right column.
        let joined_alias = Some(joined.alias.clone());
        if right.source == joined_alias {
            Ok((left, right))
        } else if left.source == joined_alias {
            Ok((right, left))
        } else {
            Err(unsupported(&format!(
                "ON condition that does not reference joined table '{}'",
                joined.alias
            )))
        }
    }

    fn convert_projection(&self, projection: &[SelectItem]) -> Result<Vec<ColumnRef>, ParseError> {
        let mut columns = Vec::with_capacity(projection.len());
        for item in projection {
            match item {
                SelectItem::UnnamedExpr(expr) => columns.push(self.convert_column(expr)?),
                SelectItem::ExprWithAlias { expr, alias } => {
                    let mut column = self.convert_column(expr)?;
                    column.alias = Some(alias.value.clone());
                    columns.push(column);
                }
                SelectItem::Wildcard(_) => columns.push(ColumnRef::new("*")),
                SelectItem::QualifiedWildcard(name, _) => {
                    let ObjectName(parts) = name;
                    columns.push(ColumnRef::qualified(&parts[0].value, "*"));
                }
            }
        }
        Ok(columns)
    }

    fn convert_column(&self, expr: &Expr) -> Result<ColumnRef, ParseError> {
        match expr {
            Expr::Identifier(ident) => Ok(ColumnRef::new(&ident.value)),
            Expr::CompoundIdentifier(parts) => {
                if parts.len() != 2 {
                    return Err(unsupported("deeply qualified column name"));
                }
                Ok(ColumnRef::qualified(&parts[0].value, &parts[1].value))
            }
            Expr::Function(func) => self.convert_aggregate(func),
            Expr::Nested(inner) => self.convert_column(inner),
            Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. } => {
                Err(unsupported("subquery"))
            }
            other => Err(unsupported(&format!("expression '{}'", other))),
        }
    }

    fn convert_aggregate(&self, func: &sqlparser::ast::Function) -> Result<ColumnRef, ParseError> {
        if func.over.is_some() {
            return Err(unsupported("window function"));
        }
        let name = func.name.to_string().to_lowercase();
        let aggregate = match name.as_str() {
            "count" => AggregateFn::Count,
            "sum" => AggregateFn::Sum,
            "avg" => AggregateFn::Avg,
            "min" => AggregateFn::Min,
            "max" => AggregateFn::Max,
            _ => return Err(unsupported(&format!("function '{}'", name))),
        };
        if func.distinct {
            return Err(unsupported("aggregate DISTINCT"));
        }
        if func.args.len() != 1 {
            return Err(unsupported(&format!(
                "{} with {} arguments",
                name,
                func.args.len()
            )));
        }
        let mut column = match &func.args[0] {
            FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                if aggregate != AggregateFn::Count {
                    return Err(unsupported(&format!("{}(*)", name)));
                }
                ColumnRef::new("*")
            }
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => {
                let inner = self.convert_column(expr)?;
                if inner.aggregate.is_some() {
                    return Err(unsupported("nested aggregate"));
                }
                inner
            }
            _ => return Err(unsupported(&format!("argument of {}", name))),
        };
        column.aggregate = Some(aggregate);
        Ok(column)
    }

    fn convert_predicate(&self, expr: &Expr) -> Result<Predicate, ParseError> {
        match expr {
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => Ok(Predicate::And(
                    Box::new(self.convert_predicate(left)?),
                    Box::new(self.convert_predicate(right)?),
                )),
                BinaryOperator::Or => Ok(Predicate::Or(
                    Box::new(self.convert_predicate(left)?),
                    Box::new(self.convert_predicate(right)?),
                )),
                _ => self.convert_comparison(left, op, right),
            },
            Expr::IsNull(inner) => Ok(Predicate::IsNull {
                column: self.convert_column(inner)?,
                negated: false,
            }),
            Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
                column: self.convert_column(inner)?,
                negated: true,
            }),
            Expr::Nested(inner) => self.convert_predicate(inner),
            Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. } => {
                Err(unsupported("subquery"))
            }
            other => Err(unsupported(&format!("filter expression '{}'", other))),
        }
    }

    fn convert_comparison(
        &self,
        left: &Expr,
        op: &BinaryOperator,
        right: &Expr,
    ) -> Result<Predicate, ParseError> {
        let op = match op {
            BinaryOperator::Eq => CompareOp::Eq,
            BinaryOperator::NotEq => CompareOp::NotEq,
            BinaryOperator::Lt => CompareOp::Lt,
            BinaryOperator::LtEq => CompareOp::LtEq,
            BinaryOperator::Gt => CompareOp::Gt,
            BinaryOperator::GtEq => CompareOp::GtEq,
            other => return Err(unsupported(&format!("operator '{}'", other))),
        };
        // Accept both `col op literal` and `literal op col`, normalizing the
        // latter by mirroring the operator.
        if let Ok(value) = self.convert_literal(right) {
            let column = self.convert_column(left)?;
            return Ok(Predicate::Compare { column, op, value });
        }
        if let Ok(value) = self.convert_literal(left) {
            let column = self.convert_column(right)?;
            let mirrored = match op {
                CompareOp::Lt => CompareOp::Gt,
                CompareOp::LtEq => CompareOp::GtEq,
                CompareOp::Gt => CompareOp::Lt,
                CompareOp::GtEq => CompareOp::LtEq,
                symmetric => symmetric,
            };
            return Ok(Predicate::Compare {
                column,
                op: mirrored,
                value,
            });
        }
        Err(unsupported(
            "comparison without a literal operand (column-to-column filters are join conditions)",
        ))
    }

    fn convert_literal(&self, expr: &Expr) -> Result<Value, ParseError> {
        match expr {
            Expr::Value(value) => self.convert_sql_value(value),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match self.convert_literal(expr)? {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ParseError::InvalidLiteral {
                    fragment: format!("-{}", other),
                }),
            },
            other => Err(ParseError::InvalidLiteral {
                fragment: other.to_string(),
            }),
        }
    }

    fn convert_sql_value(&self, value: &SqlValue) -> Result<Value, ParseError> {
        match value {
            SqlValue::Number(text, _) => {
                if let Ok(i) = text.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = text.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(ParseError::InvalidLiteral {
                        fragment: text.clone(),
                    })
                }
            }
            SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
                Ok(Value::Text(s.clone()))
            }
            SqlValue::Boolean(b) => Ok(Value::Boolean(*b)),
            SqlValue::Null => Ok(Value::Null),
            other => Err(ParseError::InvalidLiteral {
                fragment: other.to_string(),
            }),
        }
    }

    fn convert_group_by(&self, group_by: &GroupByExpr) -> Result<Vec<ColumnRef>, ParseError> {
        let exprs = match group_by {
            GroupByExpr::Expressions(exprs) => exprs,
            GroupByExpr::All => return Err(unsupported("GROUP BY ALL")),
        };
        let mut columns = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let column = self.convert_column(expr)?;
            if column.aggregate.is_some() {
                return Err(unsupported("aggregate in GROUP BY"));
            }
            columns.push(column);
        }
        Ok(columns)
    }

    fn convert_order_by(
        &self,
        order_by: &[OrderByExpr],
    ) -> Result<Vec<(ColumnRef, Direction)>, ParseError> {
        let mut keys = Vec::with_capacity(order_by.len());
        for item in order_by {
            if item.nulls_first.is_some() {
                return Err(unsupported(
                    "NULLS FIRST/LAST (NULLs always sort before non-NULL values)",
                ));
            }
            let column = self.convert_column(&item.expr)?;
            let direction = if item.asc.unwrap_or(true) {
                Direction::Ascending
            } else {
                Direction::Descending
            };
            keys.push((column, direction));
        }
        Ok(keys)
    }

    fn convert_limit(&self, expr: &Expr) -> Result<u64, ParseError> {
        match self.convert_literal(expr)? {
            Value::Integer(i) if i >= 0 => Ok(i as u64),
            other => Err(ParseError::InvalidLiteral {
                fragment: format!("LIMIT {}", other),
            }),
        }
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(construct: &str) -> ParseError {
    ParseError::Unsupported {
        construct: construct.to_string(),
    }
}

/// Statement-level validation: alias uniqueness, alias resolution, and the
/// qualification tie-break — once several sources are joined, an unqualified
/// column is an error rather than a guess.
fn validate(statement: &SelectStatement) -> Result<(), ParseError> {
    let mut aliases: Vec<&str> = Vec::new();
    for table in statement.tables() {
        if aliases.contains(&table.alias.as_str()) {
            return Err(ParseError::DuplicateAlias {
                alias: table.alias.clone(),
            });
        }
        aliases.push(&table.alias);
    }
    let multi_source = !statement.joins.is_empty();

    let mut references: Vec<&ColumnRef> = Vec::new();
    references.extend(statement.columns.iter());
    references.extend(statement.group_by.iter());
    references.extend(statement.order_by.iter().map(|(c, _)| c));
    for join in &statement.joins {
        references.push(&join.left_column);
        references.push(&join.right_column);
    }
    let mut predicate_columns = Vec::new();
    if let Some(selection) = &statement.selection {
        selection.columns(&mut predicate_columns);
        for column in &predicate_columns {
            if column.aggregate.is_some() {
                return Err(unsupported("aggregate in WHERE (use HAVING)"));
            }
        }
    }
    if let Some(having) = &statement.having {
        having.columns(&mut predicate_columns);
    }
    references.extend(predicate_columns.iter());

    for column in references {
        match &column.source {
            Some(source) => {
                if !aliases.contains(&source.as_str()) {
                    return Err(ParseError::UnknownAlias {
                        alias: source.clone(),
                    });
                }
            }
            None => {
                // count(*) and bare * carry no source by construction.
                if multi_source && !column.is_wildcard() {
                    return Err(ParseError::AmbiguousColumn {
                        column: column.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> WeaveResult<SelectStatement> {
        QueryParser::new().parse(sql)
    }

    fn parse_err(sql: &str) -> ParseError {
        match parse(sql).unwrap_err() {
            crate::utils::error::WeaveError::Parse(e) => e,
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_select() {
        let ast = parse("SELECT id, name FROM users_db.users").unwrap();
        assert_eq!(ast.columns.len(), 2);
        assert_eq!(ast.columns[0].name, "id");
        assert_eq!(ast.from.database, "users_db");
        assert_eq!(ast.from.table, "users");
        assert_eq!(ast.from.alias, "users");
        assert!(ast.joins.is_empty());
    }

    #[test]
    fn test_select_star_and_alias() {
        let ast = parse("SELECT * FROM users_db.users AS u").unwrap();
        assert!(ast.columns[0].is_wildcard());
        assert_eq!(ast.from.alias, "u");
    }

    #[test]
    fn test_unqualified_table_rejected() {
        let err = parse_err("SELECT * FROM users");
        assert!(matches!(err, ParseError::Unsupported { .. }));
    }

    #[test]
    fn test_join_clause() {
        let ast = parse(
            "SELECT u.name, o.total FROM users_db.users u \
             JOIN orders_db.orders o ON u.id = o.user_id",
        )
        .unwrap();
        assert_eq!(ast.joins.len(), 1);
        let join = &ast.joins[0];
        assert_eq!(join.kind, JoinKind::Inner);
        assert_eq!(join.table.database, "orders_db");
        assert_eq!(join.left_column.render(), "u.id");
        assert_eq!(join.right_column.render(), "o.user_id");
    }

    #[test]
    fn test_join_condition_normalized() {
        // Written reversed: the joined table's column still lands on the right.
        let ast = parse(
            "SELECT u.name FROM users_db.users u \
             LEFT JOIN orders_db.orders o ON o.user_id = u.id",
        )
        .unwrap();
        let join = &ast.joins[0];
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.left_column.render(), "u.id");
        assert_eq!(join.right_column.render(), "o.user_id");
    }

    #[test]
    fn test_all_join_kinds() {
        for (sql_kind, kind) in [
            ("INNER JOIN", JoinKind::Inner),
            ("LEFT JOIN", JoinKind::Left),
            ("RIGHT JOIN", JoinKind::Right),
            ("FULL JOIN", JoinKind::Full),
        ] {
            let sql = format!(
                "SELECT u.id FROM a.users u {} b.orders o ON u.id = o.user_id",
                sql_kind
            );
            let ast = parse(&sql).unwrap();
            assert_eq!(ast.joins[0].kind, kind, "for {}", sql_kind);
        }
    }

    #[test]
    fn test_multiple_on_conditions_rejected() {
        let err = parse_err(
            "SELECT u.id FROM a.users u \
             JOIN b.orders o ON u.id = o.user_id AND u.region = o.region",
        );
        match err {
            ParseError::Unsupported { construct } => {
                assert!(construct.contains("ON"), "got: {}", construct)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_non_equality_join_rejected() {
        let err = parse_err("SELECT u.id FROM a.users u JOIN b.orders o ON u.id < o.user_id");
        assert!(matches!(err, ParseError::Unsupported { .. }));
    }

    #[test]
    fn test_where_tree() {
        let ast = parse(
            "SELECT id FROM a.users WHERE age >= 21 AND (name = 'Ada' OR name = 'Grace')",
        )
        .unwrap();
        let selection = ast.selection.unwrap();
        let parts = selection.conjuncts();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], Predicate::Or(_, _)));
    }

    #[test]
    fn test_reversed_comparison_normalized() {
        let ast = parse("SELECT id FROM a.users WHERE 21 <= age").unwrap();
        match ast.selection.unwrap() {
            Predicate::Compare { column, op, value } => {
                assert_eq!(column.name, "age");
                assert_eq!(op, CompareOp::GtEq);
                assert_eq!(value, Value::Integer(21));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal() {
        let ast = parse("SELECT id FROM a.t WHERE balance < -10").unwrap();
        match ast.selection.unwrap() {
            Predicate::Compare { value, .. } => assert_eq!(value, Value::Integer(-10)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_is_null_predicates() {
        let ast = parse("SELECT id FROM a.t WHERE email IS NULL AND phone IS NOT NULL").unwrap();
        let parts = ast.selection.unwrap().conjuncts();
        assert_eq!(
            parts[0],
            Predicate::IsNull {
                column: ColumnRef::new("email"),
                negated: false
            }
        );
        assert_eq!(
            parts[1],
            Predicate::IsNull {
                column: ColumnRef::new("phone"),
                negated: true
            }
        );
    }

    #[test]
    fn test_aggregates_group_by_having() {
        let ast = parse(
            "SELECT u.city, COUNT(*), SUM(u.salary) AS payroll FROM a.users u \
             GROUP BY u.city HAVING COUNT(*) > 2 \
             ORDER BY u.city ASC LIMIT 10",
        )
        .unwrap();
        assert_eq!(ast.columns[1].aggregate, Some(AggregateFn::Count));
        assert!(ast.columns[1].is_wildcard());
        assert_eq!(ast.columns[2].aggregate, Some(AggregateFn::Sum));
        assert_eq!(ast.columns[2].alias.as_deref(), Some("payroll"));
        assert_eq!(ast.group_by.len(), 1);
        match ast.having.unwrap() {
            Predicate::Compare { column, .. } => {
                assert_eq!(column.aggregate, Some(AggregateFn::Count))
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(ast.limit, Some(10));
    }

    #[test]
    fn test_order_by_directions() {
        let ast = parse("SELECT id, name FROM a.t ORDER BY name DESC, id").unwrap();
        assert_eq!(ast.order_by[0].1, Direction::Descending);
        assert_eq!(ast.order_by[1].1, Direction::Ascending);
    }

    #[test]
    fn test_unsupported_constructs() {
        let cases = [
            "WITH x AS (SELECT 1) SELECT * FROM a.t",
            "SELECT * FROM (SELECT id FROM a.t) s",
            "SELECT id FROM a.t WHERE id IN (SELECT id FROM b.t)",
            "SELECT * FROM a.t UNION SELECT * FROM b.t",
            "SELECT DISTINCT id FROM a.t",
            "SELECT a.id FROM a.t a CROSS JOIN b.t b",
            "SELECT a.id FROM a.t a NATURAL JOIN b.t b",
            "SELECT ROW_NUMBER() OVER (ORDER BY id) FROM a.t",
            "SELECT id FROM a.t LIMIT 10 OFFSET 5",
            "INSERT INTO a.t (id) VALUES (1)",
        ];
        for sql in cases {
            let err = parse_err(sql);
            assert!(
                matches!(err, ParseError::Unsupported { .. }),
                "{} should be unsupported, got {:?}",
                sql,
                err
            );
        }
    }

    #[test]
    fn test_aggregate_in_where_rejected() {
        let err = parse_err("SELECT id FROM a.t WHERE COUNT(*) > 1");
        match err {
            ParseError::Unsupported { construct } => assert!(construct.contains("WHERE")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_unqualified_column_rejected() {
        let err = parse_err("SELECT name FROM a.users u JOIN b.orders o ON u.id = o.user_id");
        assert_eq!(
            err,
            ParseError::AmbiguousColumn {
                column: "name".to_string()
            }
        );
    }

    #[test]
    fn test_unqualified_on_column_rejected() {
        let err = parse_err("SELECT u.name FROM a.users u JOIN b.orders o ON id = o.user_id");
        assert!(matches!(err, ParseError::AmbiguousColumn { .. }));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = parse_err("SELECT u.id FROM a.users u JOIN b.orders u ON u.id = u.user_id");
        assert_eq!(
            err,
            ParseError::DuplicateAlias {
                alias: "u".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let err = parse_err("SELECT x.id FROM a.users u");
        assert_eq!(
            err,
            ParseError::UnknownAlias {
                alias: "x".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_error_carries_position() {
        let err = parse_err("SELECT FROM WHERE");
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_single_source_unqualified_columns_allowed() {
        let ast = parse("SELECT id, name FROM a.users WHERE age > 1 ORDER BY name").unwrap();
        assert!(ast.columns.iter().all(|c| c.source.is_none()));
    }
}
