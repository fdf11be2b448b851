//! Normalized result documents, safe to serialize as a response body.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SearchError;
use crate::store::Record;

/// One output row: field name to plain JSON value.
pub type Row = Map<String, Value>;

pub fn record_to_row(record: Record) -> Row {
    record.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleResult {
    pub multi_model: bool,
    pub model: String,
    pub model_label: String,
    pub records: Vec<Row>,
    pub count: usize,
    pub fields: Vec<String>,
}

/// One sub-result of a multi-entity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    pub model: String,
    pub model_label: String,
    pub records: Vec<Row>,
    pub count: usize,
    pub fields: Vec<String>,
    pub has_linked_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiResult {
    pub multi_model: bool,
    pub results: Vec<ModelResult>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub aggregation: bool,
    pub model: String,
    pub model_label: String,
    /// Base field of the first group key.
    pub dimension: String,
    /// `count` or the measured field name.
    pub measure: String,
    pub records: Vec<Row>,
    pub count: usize,
    pub fields: Vec<String>,
    pub field_descriptions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Single(SingleResult),
    Multi(MultiResult),
    Aggregation(AggregationResult),
}

impl ExecutionResult {
    /// Total number of rows across the document.
    pub fn record_count(&self) -> usize {
        match self {
            ExecutionResult::Single(r) => r.count,
            ExecutionResult::Multi(r) => r.total_count,
            ExecutionResult::Aggregation(r) => r.count,
        }
    }
}

/// Response envelope: `{status: "success", result}` or `{status: "error", error, kind}`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SearchResponse<T = ExecutionResult> {
    Success { result: T },
    Error { error: String, kind: &'static str },
}

impl<T> SearchResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchResponse::Success { .. })
    }
}

impl<T> From<Result<T, SearchError>> for SearchResponse<T> {
    fn from(outcome: Result<T, SearchError>) -> Self {
        match outcome {
            Ok(result) => SearchResponse::Success { result },
            Err(e) => SearchResponse::Error {
                error: e.to_string(),
                kind: e.kind(),
            },
        }
    }
}
