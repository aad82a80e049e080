// SPDX-License-Identifier: MIT OR Apache-2.0

//! Predicates over payload fields, used by channels to select which publications they deliver.
//!
//! A filter set matches a payload when every single filter matches. Comparisons are typed:
//! numbers only compare with numbers and byte strings only compare with byte strings (and only
//! for equality). A missing field or a type mismatch rejects the whole set.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::value::{Payload, Value};

/// Comparison operator of a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "=" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            other => Err(FilterError::UnknownOperator(other.to_owned())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single `(field, operator, literal)` predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    field: String,
    operator: Operator,
    value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Shorthand for an `=` filter.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns `true` if the payload's field satisfies this predicate.
    pub fn matches(&self, payload: &Payload) -> bool {
        let Some(field) = payload.get(&self.field) else {
            return false;
        };

        let ordering = compare_numbers(field, &self.value);
        match self.operator {
            Operator::Eq => match (field, &self.value) {
                (Value::Bytes(x), Value::Bytes(y)) => x == y,
                _ => ordering == Some(Ordering::Equal),
            },
            Operator::Lt => ordering == Some(Ordering::Less),
            Operator::Gt => ordering == Some(Ordering::Greater),
            Operator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Operator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// Returns `true` if the payload matches every filter. An empty set matches everything.
pub fn matches(payload: &Payload, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| filter.matches(payload))
}

fn compare_numbers(x: &Value, y: &Value) -> Option<Ordering> {
    match (x, y) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Float(y)) => compare_integer_float(*x, *y),
        (Value::Float(x), Value::Integer(y)) => {
            compare_integer_float(*y, *x).map(Ordering::reverse)
        }
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        _ => None,
    }
}

/// Exact comparison without rounding the integer to the float's precision.
fn compare_integer_float(integer: i64, float: f64) -> Option<Ordering> {
    // 2^63, the first float above `i64::MAX`.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    if float >= LIMIT {
        return Some(Ordering::Less);
    }
    if float < -LIMIT {
        return Some(Ordering::Greater);
    }

    let truncated = float.trunc();
    let ordering = integer.cmp(&(truncated as i64)).then_with(|| {
        // Same integral part, the fraction decides.
        if float > truncated {
            Ordering::Less
        } else if float < truncated {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });
    Some(ordering)
}

impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.field, self.operator.as_str(), &self.value).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (field, operator, value) = <(String, String, Value)>::deserialize(deserializer)?;
        let operator = operator.parse().map_err(serde::de::Error::custom)?;
        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown filter operator \"{0}\"")]
    UnknownOperator(String),
}
