use thiserror::Error;

/// Main error type for the Weave engine
///
/// `Clone` lets one failure be shared with every caller blocked on the same
/// in-flight execution.
#[derive(Debug, Error, Clone)]
pub enum WeaveError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while turning query text into an AST.
///
/// `Syntax` carries the tokenizer position plus what was expected and what
/// was found; the remaining variants name the offending fragment so the
/// message is actionable without the original query text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: expected {expected}, found {found}")]
    Syntax {
        line: u64,
        column: u64,
        expected: String,
        found: String,
    },

    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },

    #[error("ambiguous column '{column}': qualify it with a source alias when joining multiple sources")]
    AmbiguousColumn { column: String },

    #[error("duplicate table alias '{alias}'")]
    DuplicateAlias { alias: String },

    #[error("reference to unknown table alias '{alias}'")]
    UnknownAlias { alias: String },

    #[error("invalid literal: {fragment}")]
    InvalidLiteral { fragment: String },
}

/// Errors raised during planning, before any backend is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("unknown database '{database}' (registered: {available:?})")]
    UnknownDatabase {
        database: String,
        available: Vec<String>,
    },

    #[error("ambiguous column '{column}' in plan")]
    AmbiguousColumn { column: String },

    #[error("unsupported join: {reason}")]
    UnsupportedJoin { reason: String },

    #[error("invalid aggregate usage: column '{column}' is neither aggregated nor grouped")]
    InvalidAggregate { column: String },
}

/// Backend-reported fetch failures. Any one of these aborts the whole query;
/// partial results are never returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("database '{database}' unreachable: {reason}")]
    Unreachable { database: String, reason: String },

    #[error("database '{database}' has no table '{table}'")]
    UnknownTable { database: String, table: String },

    #[error("backend '{database}' failed: {message}")]
    Backend { database: String, message: String },
}

/// Join-column type mismatch between the two sides of an equality join.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error(
        "join column type mismatch: {left_column} is {left_type}, {right_column} is {right_type}"
    )]
    TypeMismatch {
        left_column: String,
        right_column: String,
        left_type: String,
        right_type: String,
    },
}

/// A backend fetch exceeded its caller-supplied deadline.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("fetch from '{database}.{table}' exceeded deadline of {deadline_ms}ms")]
pub struct TimeoutError {
    pub database: String,
    pub table: String,
    pub deadline_ms: u64,
}

/// Result type alias for Weave operations
pub type WeaveResult<T> = Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weave_error_from_parse_error() {
        let parse_error = ParseError::Unsupported {
            construct: "subquery".to_string(),
        };
        let error: WeaveError = parse_error.into();

        match error {
            WeaveError::Parse(ParseError::Unsupported { construct }) => {
                assert_eq!(construct, "subquery");
            }
            _ => panic!("Expected Parse error"),
        }
    }

    #[test]
    fn test_weave_error_from_plan_error() {
        let plan_error = PlanError::UnknownDatabase {
            database: "crm".to_string(),
            available: vec!["users_db".to_string()],
        };
        let error: WeaveError = plan_error.into();

        match error {
            WeaveError::Plan(PlanError::UnknownDatabase { database, .. }) => {
                assert_eq!(database, "crm");
            }
            _ => panic!("Expected Plan error"),
        }
    }

    #[test]
    fn test_weave_error_from_timeout_error() {
        let timeout = TimeoutError {
            database: "orders_db".to_string(),
            table: "orders".to_string(),
            deadline_ms: 500,
        };
        let error: WeaveError = timeout.into();

        let message = format!("{}", error);
        assert!(message.contains("orders_db.orders"));
        assert!(message.contains("500ms"));
    }

    #[test]
    fn test_syntax_error_display_carries_position() {
        let error = ParseError::Syntax {
            line: 1,
            column: 27,
            expected: "an expression".to_string(),
            found: "GROUP".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("line 1"));
        assert!(message.contains("column 27"));
        assert!(message.contains("GROUP"));
    }

    #[test]
    fn test_join_error_display() {
        let error = JoinError::TypeMismatch {
            left_column: "u.id".to_string(),
            right_column: "o.user_id".to_string(),
            left_type: "integer".to_string(),
            right_type: "text".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("u.id"));
        assert!(message.contains("text"));
    }

    #[test]
    fn test_weave_result_type() {
        let success: WeaveResult<u32> = Ok(7);
        let failure: WeaveResult<u32> = Err(WeaveError::Internal("boom".to_string()));

        assert!(success.is_ok());
        assert!(failure.is_err());
    }
}
