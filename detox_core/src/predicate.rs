//! Compiled comparison between a registry attribute and a literal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{DetoxError, Result};
use crate::expressions::{BoundVar, Value, ValueType};
use crate::model::{Demand, ReplicaRef};
use crate::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Bare boolean attribute
    Truthy,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn parse(text: &str) -> Option<Self> {
        let op = match text {
            "" => Operator::Truthy,
            "not" => Operator::Not,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Truthy => "",
            Operator::Not => "not",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    fn is_relational(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Whether the operator may be applied to an attribute of this type.
    pub fn is_valid_for(&self, value_type: ValueType) -> bool {
        match value_type {
            ValueType::Bool => matches!(self, Operator::Truthy | Operator::Not),
            ValueType::Numeric | ValueType::Time => !matches!(self, Operator::Truthy | Operator::Not),
            ValueType::Text => matches!(self, Operator::Eq | Operator::Ne),
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Truthy | Operator::Not => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum Literal {
    None,
    Number(f64),
    Time(DateTime<Utc>),
    Text(Pattern),
}

/// One typed comparison, validated at construction.
#[derive(Debug, Clone)]
pub struct Predicate {
    var: BoundVar,
    operator: Operator,
    literal: Literal,
}

impl Predicate {
    pub fn new(var: BoundVar, operator: &str, rhs: &str) -> Result<Self> {
        let invalid_operator = || DetoxError::InvalidOperator {
            expr: var.name.to_string(),
            operator: operator.to_string(),
        };

        let op = Operator::parse(operator).ok_or_else(invalid_operator)?;
        if !op.is_valid_for(var.value_type) {
            return Err(invalid_operator());
        }

        let literal = match var.value_type {
            ValueType::Bool => {
                if !rhs.is_empty() {
                    return Err(invalid_literal(&var, rhs, "boolean expressions take no value"));
                }
                Literal::None
            }
            _ if rhs.is_empty() => {
                return Err(invalid_literal(&var, rhs, "missing value"));
            }
            _ => match var.resolve.and_then(|resolve| resolve(rhs)) {
                Some(value) => literal_from_value(&var, rhs, value)?,
                None => cast(&var, rhs)?,
            },
        };

        Ok(Self {
            var,
            operator: op,
            literal,
        })
    }

    pub fn name(&self) -> &'static str {
        self.var.name
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> bool {
        let value = self.var.get(replica, demand);

        match (&value, &self.literal) {
            (Value::Bool(b), Literal::None) => match self.operator {
                Operator::Not => !*b,
                _ => *b,
            },
            (Value::Number(lhs), Literal::Number(rhs)) => lhs
                .partial_cmp(rhs)
                .map_or(false, |ordering| self.operator.accepts(ordering)),
            (Value::Time(lhs), Literal::Time(rhs)) => self.operator.accepts(lhs.cmp(rhs)),
            (Value::Text(text), Literal::Text(pattern)) => match self.operator {
                Operator::Eq => pattern.matches(text),
                Operator::Ne => !pattern.matches(text),
                _ => false,
            },
            _ => false,
        }
    }
}

fn invalid_literal(var: &BoundVar, rhs: &str, reason: impl Into<String>) -> DetoxError {
    DetoxError::InvalidLiteral {
        expr: var.name.to_string(),
        literal: rhs.to_string(),
        reason: reason.into(),
    }
}

fn literal_from_value(var: &BoundVar, rhs: &str, value: Value) -> Result<Literal> {
    match value {
        Value::Number(n) => Ok(Literal::Number(n)),
        Value::Time(t) => Ok(Literal::Time(t)),
        Value::Text(t) => Ok(Literal::Text(Pattern::new(&t)?)),
        Value::Bool(_) => Err(invalid_literal(var, rhs, "symbol resolves to a boolean")),
    }
}

fn cast(var: &BoundVar, rhs: &str) -> Result<Literal> {
    match var.value_type {
        ValueType::Numeric => rhs.parse::<f64>().map(Literal::Number).map_err(|e| {
            let reason = if var.resolve.is_some() {
                "unknown symbol".to_string()
            } else {
                e.to_string()
            };
            invalid_literal(var, rhs, reason)
        }),
        ValueType::Time => parse_time(rhs)
            .map(Literal::Time)
            .ok_or_else(|| invalid_literal(var, rhs, "expected a date or timestamp")),
        ValueType::Text => Ok(Literal::Text(Pattern::new(rhs)?)),
        ValueType::Bool => Ok(Literal::None),
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S` or `%Y-%m-%d` (all UTC).
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}
