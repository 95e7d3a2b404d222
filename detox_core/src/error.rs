use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetoxError>;

#[derive(Debug, Error)]
pub enum DetoxError {
    #[error("Unknown expression: {0}")]
    UnknownExpression(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Operator '{operator}' is not valid for expression {expr}")]
    InvalidOperator { expr: String, operator: String },

    #[error("Invalid literal '{literal}' for expression {expr}: {reason}")]
    InvalidLiteral {
        expr: String,
        literal: String,
        reason: String,
    },

    #[error("Expression {0} requires a partition")]
    MissingPartition(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid time unit: {0}")]
    InvalidUnit(String),

    #[error("Malformed action list line {line_no}: {line}")]
    InvalidActionLine { line_no: usize, line: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
