//! Data store interface consumed by the search pipeline.
//!
//! The pipeline only ever reads: metadata enumeration, filtered search, and
//! grouped aggregates. [`sqlite::SqliteStore`] is the bundled implementation.

pub mod domain;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SearchError;
use crate::schema::{EntityInfo, Field};

pub use domain::Domain;

/// Wire sentinel for the record-count measure, both in intents and in grouped rows.
pub const COUNT_KEY: &str = "__count";

// ============================================================================
// Values and records
// ============================================================================

/// A single scalar read from the store. Relation values keep their label so
/// results never expose store-native handles.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// To-one relation: `(id, display label)`.
    Relation(i64, String),
    /// To-many relation: referenced ids.
    Ids(Vec<i64>),
}

impl FieldValue {
    /// Display value: the label for relations, the value itself otherwise.
    pub fn into_display(self) -> FieldValue {
        match self {
            FieldValue::Relation(_, label) => FieldValue::Text(label),
            other => other,
        }
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(b),
            FieldValue::Integer(i) => serde_json::Value::from(i),
            FieldValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s),
            FieldValue::Relation(id, label) => serde_json::json!([id, label]),
            FieldValue::Ids(ids) => serde_json::json!(ids),
        }
    }
}

/// One record: field name to value. Search results always include `id`.
pub type Record = BTreeMap<String, FieldValue>;

// ============================================================================
// Group keys
// ============================================================================

/// Time bucket applied to a date/datetime group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Granularity::Day),
            "week" => Some(Granularity::Week),
            "month" => Some(Granularity::Month),
            "year" => Some(Granularity::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

/// Group-by key: a field, optionally bucketed by time. Written `field` or `field:granularity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub field: String,
    pub granularity: Option<Granularity>,
}

impl GroupKey {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            granularity: None,
        }
    }

    pub fn with_granularity(field: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            field: field.into(),
            granularity: Some(granularity),
        }
    }

    /// Parse `field[:granularity]`. An unknown granularity is dropped with a warning
    /// rather than failing the whole query.
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.splitn(2, ':');
        let field = parts.next().unwrap_or_default().trim().to_string();
        let granularity = parts.next().and_then(|g| {
            let parsed = Granularity::from_name(g);
            if parsed.is_none() {
                tracing::warn!(key = spec, granularity = g, "Unsupported granularity, grouping by raw value");
            }
            parsed
        });
        Self { field, granularity }
    }

    /// Key under which the store reports this group's value.
    pub fn spec(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Some(g) => write!(f, "{}:{}", self.field, g.as_str()),
            None => f.write_str(&self.field),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub entity: &'a str,
    pub domain: &'a Domain,
    pub fields: &'a [String],
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct GroupRequest<'a> {
    pub entity: &'a str,
    pub domain: &'a Domain,
    pub group_by: &'a [GroupKey],
    /// Field measures only; the record count is always returned under [`COUNT_KEY`].
    pub measures: &'a [String],
    pub limit: usize,
    /// Group key to order by, ascending.
    pub order_by: Option<&'a GroupKey>,
    /// `false` groups by every key at once and returns all groups.
    pub lazy: bool,
}

// ============================================================================
// DataStore trait
// ============================================================================

/// Read-only access to a relational object store.
///
/// Implementations are expected to enforce their own access control and
/// serialize their own internal access.
pub trait DataStore: Send + Sync {
    /// Every entity type visible to the metadata facility.
    fn entity_types(&self) -> Result<Vec<EntityInfo>, SearchError>;

    /// Live field list for one entity type, in declaration order.
    fn fields(&self, entity: &str) -> Result<Vec<Field>, SearchError>;

    /// Filtered search returning `id` plus the requested fields for each match.
    fn search_read(&self, request: &SearchRequest<'_>) -> Result<Vec<Record>, SearchError>;

    /// Grouped aggregate: one record per group keyed by group-key spec, measure
    /// names, and [`COUNT_KEY`].
    fn read_group(&self, request: &GroupRequest<'_>) -> Result<Vec<Record>, SearchError>;

    /// Metadata for one entity type, or `None` when it does not exist.
    fn entity(&self, id: &str) -> Result<Option<EntityInfo>, SearchError> {
        Ok(self.entity_types()?.into_iter().find(|e| e.id == id))
    }
}
