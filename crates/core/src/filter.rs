//! Metadata filtering for record scans
//!
//! Supports equality and scalar comparison on top-level metadata
//! fields, AND-composed. Nested paths and array membership are
//! deferred to future versions.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A scalar JSON value usable in filter conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsonScalar {
    /// JSON null
    Null,
    /// JSON boolean
    Bool(bool),
    /// JSON number (compared as f64)
    Number(f64),
    /// JSON string
    String(String),
}

impl JsonScalar {
    /// Compare against a JSON value for equality
    pub fn matches(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (JsonScalar::Null, JsonValue::Null) => true,
            (JsonScalar::Bool(a), JsonValue::Bool(b)) => a == b,
            (JsonScalar::Number(a), JsonValue::Number(b)) => {
                b.as_f64().map(|b| *a == b).unwrap_or(false)
            }
            (JsonScalar::String(a), JsonValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Numeric/string ordering against a JSON value, if comparable
    fn partial_cmp_json(&self, value: &JsonValue) -> Option<std::cmp::Ordering> {
        match (self, value) {
            (JsonScalar::Number(a), JsonValue::Number(b)) => {
                b.as_f64().and_then(|b| b.partial_cmp(a))
            }
            (JsonScalar::String(a), JsonValue::String(b)) => Some(b.as_str().cmp(a.as_str())),
            _ => None,
        }
    }
}

impl From<bool> for JsonScalar {
    fn from(v: bool) -> Self {
        JsonScalar::Bool(v)
    }
}

impl From<i32> for JsonScalar {
    fn from(v: i32) -> Self {
        JsonScalar::Number(v as f64)
    }
}

impl From<i64> for JsonScalar {
    fn from(v: i64) -> Self {
        JsonScalar::Number(v as f64)
    }
}

impl From<f64> for JsonScalar {
    fn from(v: f64) -> Self {
        JsonScalar::Number(v)
    }
}

impl From<&str> for JsonScalar {
    fn from(v: &str) -> Self {
        JsonScalar::String(v.to_string())
    }
}

impl From<String> for JsonScalar {
    fn from(v: String) -> Self {
        JsonScalar::String(v)
    }
}

/// Comparison operator for a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Field equals the scalar
    Eq,
    /// Field differs from the scalar (missing fields do NOT match)
    Ne,
    /// Field greater than the scalar (numbers and strings)
    Gt,
    /// Field greater than or equal
    Gte,
    /// Field less than the scalar
    Lt,
    /// Field less than or equal
    Lte,
}

/// A single condition on one top-level metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Top-level metadata field name
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Comparison value
    pub value: JsonScalar,
}

impl FilterCondition {
    fn matches(&self, meta: &serde_json::Map<String, JsonValue>) -> bool {
        let Some(actual) = meta.get(&self.field) else {
            // Missing field never matches, including Ne. A scan that
            // wants "field absent or != x" should filter in the caller.
            return false;
        };
        match self.op {
            FilterOp::Eq => self.value.matches(actual),
            FilterOp::Ne => !self.value.matches(actual),
            FilterOp::Gt => {
                matches!(
                    self.value.partial_cmp_json(actual),
                    Some(std::cmp::Ordering::Greater)
                )
            }
            FilterOp::Gte => matches!(
                self.value.partial_cmp_json(actual),
                Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
            ),
            FilterOp::Lt => {
                matches!(
                    self.value.partial_cmp_json(actual),
                    Some(std::cmp::Ordering::Less)
                )
            }
            FilterOp::Lte => matches!(
                self.value.partial_cmp_json(actual),
                Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
            ),
        }
    }
}

/// Metadata filter: conjunction of conditions
///
/// An empty filter matches every record, including records with no
/// metadata at all. A non-empty filter never matches a record whose
/// metadata is absent or not a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: Vec<FilterCondition>,
}

impl MetadataFilter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        MetadataFilter::default()
    }

    /// Add an equality condition
    pub fn eq(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Eq, value)
    }

    /// Add an inequality condition
    pub fn ne(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Ne, value)
    }

    /// Add a greater-than condition
    pub fn gt(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Gt, value)
    }

    /// Add a greater-than-or-equal condition
    pub fn gte(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Gte, value)
    }

    /// Add a less-than condition
    pub fn lt(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Lt, value)
    }

    /// Add a less-than-or-equal condition
    pub fn lte(self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.push(field, FilterOp::Lte, value)
    }

    fn push(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<JsonScalar>,
    ) -> Self {
        self.conditions.push(FilterCondition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True if this filter matches everything
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against record metadata
    pub fn matches(&self, metadata: &Option<JsonValue>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let Some(JsonValue::Object(meta)) = metadata else {
            return false;
        };
        self.conditions.iter().all(|c| c.matches(meta))
    }
}
