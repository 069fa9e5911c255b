//! Declarative payload filters.
//!
//! A filter is a JSON object in the style of MongoDB queries. It is validated
//! and compiled once, when the subscription is created, and then evaluated
//! against every payload routed to that subscription.
//!
//! ```
//! use serde_json::json;
//! use topica::Filter;
//!
//! let filter = Filter::from_value(json!({"priority": {"$gt": 2}})).unwrap();
//! assert!(filter.passes(&json!({"priority": 4})));
//! assert!(!filter.passes(&json!({"priority": 1})));
//! ```

mod ops;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use ops::Op;
use crate::error::{PubSubError, Result};

/// A compiled filter. The default filter is empty and passes everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Filter {
    source: Map<String, Value>,
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Field { path: Vec<String>, ops: Vec<Op> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

impl Filter {
    /// The empty filter.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiles a filter from JSON.
    ///
    /// # Errors
    ///
    /// - [`PubSubError::FilterType`] if `value` is not an object;
    /// - [`PubSubError::InvalidFilter`] for unknown operators or malformed
    ///   operands.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(PubSubError::FilterType {
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self> {
        let mut clauses = Vec::with_capacity(map.len());

        for (key, value) in &map {
            let clause = match key.as_str() {
                "$and" => Clause::And(Self::sub_filters(key, value)?),
                "$or" => Clause::Or(Self::sub_filters(key, value)?),
                "$nor" => Clause::Nor(Self::sub_filters(key, value)?),
                k if k.starts_with('$') => {
                    return Err(PubSubError::invalid_filter(format!(
                        "unknown top-level operator '{k}'"
                    )));
                }
                field => Clause::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    ops: ops::compile_field(value)?,
                },
            };
            clauses.push(clause);
        }

        Ok(Self {
            source: map,
            clauses,
        })
    }

    fn sub_filters(
        key: &str,
        value: &Value,
    ) -> Result<Vec<Filter>> {
        let Value::Array(items) = value else {
            return Err(PubSubError::invalid_filter(format!(
                "'{key}' expects an array of filters"
            )));
        };
        if items.is_empty() {
            return Err(PubSubError::invalid_filter(format!(
                "'{key}' expects a non-empty array"
            )));
        }
        items.iter().cloned().map(Self::from_value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The filter as it was written.
    pub fn as_value(&self) -> Value {
        Value::Object(self.source.clone())
    }

    /// Evaluates the filter against a payload. All clauses must hold.
    pub fn passes(
        &self,
        data: &Value,
    ) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { path, ops } => {
                let field = resolve_path(data, path);
                ops.iter().all(|op| op.test(field))
            }
            Clause::And(filters) => filters.iter().all(|f| f.passes(data)),
            Clause::Or(filters) => filters.iter().any(|f| f.passes(data)),
            Clause::Nor(filters) => !filters.iter().any(|f| f.passes(data)),
        })
    }
}

impl TryFrom<Value> for Filter {
    type Error = PubSubError;

    fn try_from(value: Value) -> Result<Self> {
        Filter::from_value(value)
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        Value::Object(filter.source)
    }
}

/// Values a subscription filter can be built from.
pub trait IntoFilter {
    fn into_filter(self) -> Result<Filter>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> Result<Filter> {
        Ok(self)
    }
}

impl IntoFilter for &Filter {
    fn into_filter(self) -> Result<Filter> {
        Ok(self.clone())
    }
}

impl IntoFilter for Value {
    fn into_filter(self) -> Result<Filter> {
        Filter::from_value(self)
    }
}

impl IntoFilter for &Value {
    fn into_filter(self) -> Result<Filter> {
        Filter::from_value(self.clone())
    }
}

/// `None` is the empty filter.
impl IntoFilter for Option<Value> {
    fn into_filter(self) -> Result<Filter> {
        self.map_or_else(|| Ok(Filter::empty()), Filter::from_value)
    }
}

/// Follows a dotted path through objects (and arrays, for numeric segments).
fn resolve_path<'a>(
    data: &'a Value,
    path: &[String],
) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
