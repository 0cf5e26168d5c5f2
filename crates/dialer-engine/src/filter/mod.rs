//! # Targeting Filter Language
//!
//! A list's `filter_criteria` is a small tagged expression tree persisted as
//! JSON. Leaves compare a record field against either a literal scalar or a
//! relative time ("4 hours ago") that is resolved to an absolute timestamp
//! every time the filter is evaluated. That resolution step is what keeps a
//! freshness window such as "leads newer than 4 hours" correct across
//! repeated refreshes.
//!
//! ```text
//! FilterExpr ──resolve(now)──▶ ResolvedFilter ──┬─▶ sql::compile  (SQLite WHERE clause)
//!                                               └─▶ eval::matches (in-memory records)
//! ```
//!
//! ## JSON shape
//!
//! ```json
//! { "op": "and", "all": [
//!     { "op": "compare", "field": "status", "cmp": "eq", "value": "new" },
//!     { "op": "compare", "field": "created_at", "cmp": "gte",
//!       "value": { "relative": { "amount": 4, "unit": "hours" } } }
//! ] }
//! ```

pub mod eval;
pub mod sql;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DialerError, Result};

const MAX_DEPTH: usize = 16;

/// Declarative predicate over source records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterExpr {
    And { all: Vec<FilterExpr> },
    Or { any: Vec<FilterExpr> },
    Not { expr: Box<FilterExpr> },
    Compare { field: String, cmp: Comparison, value: FilterValue },
    In { field: String, values: Vec<FilterValue> },
    IsNull { field: String },
    IsNotNull { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match on text fields
    Contains,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Relative { relative: RelativeTime },
    Literal(Value),
}

/// A time offset from the evaluation instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTime {
    pub amount: i64,
    pub unit: TimeUnit,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ago,
    FromNow,
}

impl RelativeTime {
    pub fn ago(amount: i64, unit: TimeUnit) -> Self {
        Self { amount, unit, direction: Direction::Ago }
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let span = match self.unit {
            TimeUnit::Minutes => Duration::minutes(self.amount),
            TimeUnit::Hours => Duration::hours(self.amount),
            TimeUnit::Days => Duration::days(self.amount),
            TimeUnit::Weeks => Duration::weeks(self.amount),
        };
        match self.direction {
            Direction::Ago => now - span,
            Direction::FromNow => now + span,
        }
    }
}

/// A leaf value after relative times have been pinned
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Timestamp(DateTime<Utc>),
    Scalar(Value),
}

/// A filter with every relative time replaced by an absolute timestamp
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFilter {
    And(Vec<ResolvedFilter>),
    Or(Vec<ResolvedFilter>),
    Not(Box<ResolvedFilter>),
    Compare { field: String, cmp: Comparison, value: ResolvedValue },
    In { field: String, values: Vec<ResolvedValue> },
    IsNull { field: String },
    IsNotNull { field: String },
}

impl FilterExpr {
    pub fn and(all: Vec<FilterExpr>) -> Self {
        FilterExpr::And { all }
    }

    pub fn or(any: Vec<FilterExpr>) -> Self {
        FilterExpr::Or { any }
    }

    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not { expr: Box::new(expr) }
    }

    pub fn compare(field: impl Into<String>, cmp: Comparison, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            cmp,
            value: FilterValue::Literal(value.into()),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    /// `field >= now - amount unit`
    pub fn newer_than(field: impl Into<String>, amount: i64, unit: TimeUnit) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            cmp: Comparison::Gte,
            value: FilterValue::Relative { relative: RelativeTime::ago(amount, unit) },
        }
    }

    /// `field < now - amount unit`
    pub fn older_than(field: impl Into<String>, amount: i64, unit: TimeUnit) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            cmp: Comparison::Lt,
            value: FilterValue::Relative { relative: RelativeTime::ago(amount, unit) },
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values: values.into_iter().map(FilterValue::Literal).collect(),
        }
    }

    /// Parse and validate a persisted filter
    pub fn from_json(raw: &str) -> Result<Self> {
        let expr: FilterExpr = serde_json::from_str(raw)
            .map_err(|e| DialerError::validation(format!("malformed filter criteria: {}", e)))?;
        expr.validate()?;
        Ok(expr)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(DialerError::validation("filter criteria nested too deeply"));
        }
        match self {
            FilterExpr::And { all: children } | FilterExpr::Or { any: children } => {
                children.iter().try_for_each(|c| c.validate_at(depth + 1))
            }
            FilterExpr::Not { expr } => expr.validate_at(depth + 1),
            FilterExpr::Compare { field, cmp, value } => {
                validate_field(field)?;
                validate_value(*cmp, value)
            }
            FilterExpr::In { field, values } => {
                validate_field(field)?;
                values.iter().try_for_each(|v| validate_value(Comparison::Eq, v))
            }
            FilterExpr::IsNull { field } | FilterExpr::IsNotNull { field } => validate_field(field),
        }
    }

    /// Pin every relative-time leaf to `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedFilter {
        match self {
            FilterExpr::And { all } => ResolvedFilter::And(all.iter().map(|c| c.resolve(now)).collect()),
            FilterExpr::Or { any } => ResolvedFilter::Or(any.iter().map(|c| c.resolve(now)).collect()),
            FilterExpr::Not { expr } => ResolvedFilter::Not(Box::new(expr.resolve(now))),
            FilterExpr::Compare { field, cmp, value } => ResolvedFilter::Compare {
                field: field.clone(),
                cmp: *cmp,
                value: value.resolve(now),
            },
            FilterExpr::In { field, values } => ResolvedFilter::In {
                field: field.clone(),
                values: values.iter().map(|v| v.resolve(now)).collect(),
            },
            FilterExpr::IsNull { field } => ResolvedFilter::IsNull { field: field.clone() },
            FilterExpr::IsNotNull { field } => ResolvedFilter::IsNotNull { field: field.clone() },
        }
    }
}

impl FilterValue {
    fn resolve(&self, now: DateTime<Utc>) -> ResolvedValue {
        match self {
            FilterValue::Relative { relative } => ResolvedValue::Timestamp(relative.resolve(now)),
            FilterValue::Literal(v) => ResolvedValue::Scalar(v.clone()),
        }
    }
}

fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DialerError::validation(format!("invalid filter field '{}'", field)))
    }
}

fn validate_value(cmp: Comparison, value: &FilterValue) -> Result<()> {
    let literal = match value {
        FilterValue::Relative { .. } if cmp == Comparison::Contains => {
            return Err(DialerError::validation("contains cannot take a relative time"));
        }
        FilterValue::Relative { .. } => return Ok(()),
        FilterValue::Literal(v) => v,
    };
    match (cmp, literal) {
        (_, Value::Null) => Err(DialerError::validation("use is_null / is_not_null to test for null")),
        (_, Value::Array(_)) | (_, Value::Object(_)) => {
            Err(DialerError::validation("filter values must be scalars"))
        }
        (Comparison::Contains, v) if !v.is_string() => {
            Err(DialerError::validation("contains requires a string value"))
        }
        (Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte, Value::Bool(_)) => {
            Err(DialerError::validation("ordering comparisons cannot take a boolean"))
        }
        _ => Ok(()),
    }
}
