//! In-memory evaluation of resolved filters
//!
//! Semantics mirror the SQL compiler: a comparison against a missing, null or
//! differently-typed field is false, and `Not` simply negates that result.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{Comparison, ResolvedFilter, ResolvedValue};

/// Look up a dotted path inside a record's fields
pub fn field<'a>(record: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub fn matches(filter: &ResolvedFilter, record: &Map<String, Value>) -> bool {
    match filter {
        ResolvedFilter::And(all) => all.iter().all(|f| matches(f, record)),
        ResolvedFilter::Or(any) => any.iter().any(|f| matches(f, record)),
        ResolvedFilter::Not(inner) => !matches(inner, record),
        ResolvedFilter::Compare { field: path, cmp, value } => {
            compare(field(record, path), *cmp, value)
        }
        ResolvedFilter::In { field: path, values } => {
            let actual = field(record, path);
            values.iter().any(|v| compare(actual, Comparison::Eq, v))
        }
        ResolvedFilter::IsNull { field: path } => field(record, path).map_or(true, Value::is_null),
        ResolvedFilter::IsNotNull { field: path } => {
            field(record, path).map_or(false, |v| !v.is_null())
        }
    }
}

fn compare(actual: Option<&Value>, cmp: Comparison, expected: &ResolvedValue) -> bool {
    let Some(actual) = actual else {
        return false;
    };

    match expected {
        ResolvedValue::Timestamp(ts) => {
            let Some(parsed) = actual.as_str().and_then(parse_timestamp) else {
                return false;
            };
            ordered(parsed.cmp(ts), cmp)
        }
        ResolvedValue::Scalar(Value::String(s)) => {
            let Some(a) = actual.as_str() else {
                return false;
            };
            if cmp == Comparison::Contains {
                return a.to_ascii_lowercase().contains(&s.to_ascii_lowercase());
            }
            ordered(a.cmp(s.as_str()), cmp)
        }
        ResolvedValue::Scalar(Value::Number(n)) => match (actual.as_f64(), n.as_f64()) {
            (Some(a), Some(b)) if actual.is_number() => {
                a.partial_cmp(&b).map_or(false, |o| ordered(o, cmp))
            }
            _ => false,
        },
        ResolvedValue::Scalar(Value::Bool(b)) => match (actual.as_bool(), cmp) {
            (Some(a), Comparison::Eq) => a == *b,
            (Some(a), Comparison::Ne) => a != *b,
            _ => false,
        },
        ResolvedValue::Scalar(_) => false,
    }
}

fn ordered(ordering: Ordering, cmp: Comparison) -> bool {
    match cmp {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Ne => ordering != Ordering::Equal,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Gte => ordering != Ordering::Less,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Lte => ordering != Ordering::Greater,
        Comparison::Contains => false,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
