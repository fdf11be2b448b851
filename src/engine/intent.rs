//! Typed query intents.
//!
//! The model answers with loosely structured JSON. [`QueryIntent::from_value`]
//! validates it once; everything downstream works on the typed variants.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::SearchError;
use crate::store::{Domain, GroupKey, COUNT_KEY};

#[derive(Debug, Clone, PartialEq)]
pub struct SingleQuery {
    pub model: String,
    pub domain: Domain,
    pub fields: Vec<String>,
    pub limit: Option<usize>,
}

impl SingleQuery {
    pub fn new(model: impl Into<String>, fields: Vec<String>, limit: Option<usize>) -> Self {
        Self {
            model: model.into(),
            domain: Domain::empty(),
            fields,
            limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measure {
    /// Number of records per group (`__count` on the wire).
    Count,
    Field(String),
}

impl Measure {
    pub fn parse(name: &str) -> Self {
        if name == COUNT_KEY {
            Measure::Count
        } else {
            Measure::Field(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Measure::Count => COUNT_KEY,
            Measure::Field(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub model: String,
    pub domain: Domain,
    pub group_by: Vec<GroupKey>,
    pub measures: Vec<Measure>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryIntent {
    Single(SingleQuery),
    Multi { queries: Vec<SingleQuery> },
    Aggregation(AggregationQuery),
}

impl QueryIntent {
    pub fn shape(&self) -> &'static str {
        match self {
            QueryIntent::Single(_) => "single",
            QueryIntent::Multi { .. } => "multi",
            QueryIntent::Aggregation(_) => "aggregation",
        }
    }

    /// Validate the JSON shape and convert it to a typed intent.
    pub fn from_value(value: &Value) -> Result<Self, SearchError> {
        let obj = value.as_object().ok_or_else(|| {
            SearchError::Validation("Query intent must be a JSON object".into())
        })?;

        if is_flag_set(obj, "aggregation") {
            return parse_aggregation(obj).map(QueryIntent::Aggregation);
        }

        if is_flag_set(obj, "multi_model") || obj.get("queries").is_some_and(Value::is_array) {
            let items = obj
                .get("queries")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let mut queries = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_object().ok_or_else(|| {
                    SearchError::Validation("Sub-query must be a JSON object".into())
                }).and_then(parse_single) {
                    Ok(q) => queries.push(q),
                    Err(e) => tracing::warn!(index = i, error = %e, "Dropping malformed sub-query"),
                }
            }
            return Ok(QueryIntent::Multi { queries });
        }

        parse_single(obj).map(QueryIntent::Single)
    }

    /// Wire form, as the model would have written it.
    pub fn to_value(&self) -> Value {
        match self {
            QueryIntent::Single(q) => single_to_value(q),
            QueryIntent::Multi { queries } => json!({
                "multi_model": true,
                "queries": queries.iter().map(single_to_value).collect::<Vec<_>>(),
            }),
            QueryIntent::Aggregation(q) => {
                let mut v = json!({
                    "aggregation": true,
                    "model": q.model,
                    "domain": q.domain.to_value(),
                    "group_by": q.group_by.iter().map(GroupKey::spec).collect::<Vec<_>>(),
                    "measures": q.measures.iter().map(Measure::as_str).collect::<Vec<_>>(),
                });
                if let Some(limit) = q.limit {
                    v["limit"] = json!(limit);
                }
                v
            }
        }
    }
}

impl Serialize for QueryIntent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn single_to_value(q: &SingleQuery) -> Value {
    let mut v = json!({
        "model": q.model,
        "domain": q.domain.to_value(),
        "fields": q.fields,
    });
    if let Some(limit) = q.limit {
        v["limit"] = json!(limit);
    }
    v
}

fn is_flag_set(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn model_name(obj: &Map<String, Value>) -> Option<String> {
    obj.get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Positive integer limits only; anything else means "use the default".
fn parse_limit(obj: &Map<String, Value>) -> Option<usize> {
    obj.get("limit")
        .and_then(Value::as_u64)
        .filter(|l| *l > 0)
        .map(|l| l as usize)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn parse_domain(obj: &Map<String, Value>) -> Result<Domain, SearchError> {
    Domain::from_value(obj.get("domain").unwrap_or(&Value::Null))
}

fn parse_single(obj: &Map<String, Value>) -> Result<SingleQuery, SearchError> {
    let model = model_name(obj)
        .ok_or_else(|| SearchError::Validation("Model name is required".into()))?;
    Ok(SingleQuery {
        model,
        domain: parse_domain(obj)?,
        fields: string_list(obj.get("fields")),
        limit: parse_limit(obj),
    })
}

fn parse_aggregation(obj: &Map<String, Value>) -> Result<AggregationQuery, SearchError> {
    let model = model_name(obj).ok_or_else(|| {
        SearchError::Validation("Model name is required for aggregation queries".into())
    })?;
    Ok(AggregationQuery {
        model,
        domain: parse_domain(obj)?,
        group_by: string_list(obj.get("group_by"))
            .iter()
            .map(|s| GroupKey::parse(s))
            .filter(|k| !k.field.is_empty())
            .collect(),
        measures: string_list(obj.get("measures"))
            .iter()
            .map(|m| Measure::parse(m))
            .collect(),
        limit: parse_limit(obj),
    })
}
