//! Runs a validated [`QueryIntent`] against a [`DataStore`] and normalizes
//! the outcome into a result document.

use serde_json::{json, Map, Value};

use super::fields::{fallback_group_key, resolve_fields};
use super::intent::{AggregationQuery, Measure, QueryIntent, SingleQuery};
use super::relationships::{self, SubResultSchema};
use super::result::{
    record_to_row, AggregationResult, ExecutionResult, ModelResult, MultiResult, Row, SingleResult,
};
use crate::error::SearchError;
use crate::schema::{EntityInfo, Field};
use crate::store::{DataStore, FieldValue, GroupKey, GroupRequest, SearchRequest};

pub const SINGLE_DEFAULT_LIMIT: usize = 80;
pub const MULTI_DEFAULT_LIMIT: usize = 20;
pub const AGGREGATION_DEFAULT_LIMIT: usize = 100;

pub struct QueryExecutor<'a> {
    store: &'a dyn DataStore,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    pub fn execute(&self, intent: &QueryIntent) -> Result<ExecutionResult, SearchError> {
        tracing::info!(shape = intent.shape(), "Executing query");
        let outcome = match intent {
            QueryIntent::Single(q) => self.execute_single(q).map(ExecutionResult::Single),
            QueryIntent::Multi { queries } => self.execute_multi(queries).map(ExecutionResult::Multi),
            QueryIntent::Aggregation(q) => {
                self.execute_aggregation(q).map(ExecutionResult::Aggregation)
            }
        };
        outcome.map_err(into_execution_error)
    }

    fn require_entity(&self, model: &str) -> Result<EntityInfo, SearchError> {
        self.store
            .entity(model)?
            .ok_or_else(|| SearchError::Validation(format!("Invalid model: {model}")))
    }

    fn execute_single(&self, query: &SingleQuery) -> Result<SingleResult, SearchError> {
        let (result, _) = self.run_search(query, SINGLE_DEFAULT_LIMIT)?;
        Ok(SingleResult {
            multi_model: false,
            model: result.model,
            model_label: result.model_label,
            count: result.count,
            records: result.records,
            fields: result.fields,
        })
    }

    /// One filtered search; also returns the live field list for relationship discovery.
    fn run_search(
        &self,
        query: &SingleQuery,
        default_limit: usize,
    ) -> Result<(ModelResult, Vec<Field>), SearchError> {
        let info = self.require_entity(&query.model)?;
        let live = self.store.fields(&query.model)?;
        let fields = resolve_fields(&query.fields, &live);

        let records = self.store.search_read(&SearchRequest {
            entity: &query.model,
            domain: &query.domain,
            fields: &fields,
            limit: query.limit.unwrap_or(default_limit),
        })?;
        let records: Vec<Row> = records.into_iter().map(record_to_row).collect();
        tracing::debug!(model = %query.model, count = records.len(), "Search complete");

        Ok((
            ModelResult {
                model: info.id,
                model_label: info.label,
                count: records.len(),
                records,
                fields,
                has_linked_data: false,
                linked_model: None,
            },
            live,
        ))
    }

    fn execute_multi(&self, queries: &[SingleQuery]) -> Result<MultiResult, SearchError> {
        if queries.is_empty() {
            return Err(SearchError::Validation(
                "No valid queries provided for multi-model search".into(),
            ));
        }

        let mut results = Vec::with_capacity(queries.len());
        let mut live_fields = Vec::with_capacity(queries.len());
        for query in queries {
            match self.run_search(query, MULTI_DEFAULT_LIMIT) {
                Ok((result, live)) => {
                    results.push(result);
                    live_fields.push(live);
                }
                Err(e) => {
                    tracing::warn!(model = %query.model, error = %e, "Skipping failed sub-query");
                }
            }
        }

        let schemas: Vec<SubResultSchema<'_>> = results
            .iter()
            .zip(&live_fields)
            .map(|(r, f)| SubResultSchema {
                model: &r.model,
                fields: f,
            })
            .collect();
        let edges = relationships::discover(&schemas);
        let results = relationships::join_related(results, &edges);

        let total_count = results.iter().map(|r| r.count).sum();
        Ok(MultiResult {
            multi_model: true,
            results,
            total_count,
        })
    }

    fn execute_aggregation(&self, query: &AggregationQuery) -> Result<AggregationResult, SearchError> {
        let info = self.require_entity(&query.model)?;
        let live = self.store.fields(&query.model)?;

        let requested = if query.group_by.is_empty() {
            let key = fallback_group_key(&live).ok_or_else(|| {
                SearchError::Validation("Group by fields are required for aggregation queries".into())
            })?;
            tracing::info!(model = %query.model, key = %key, "No group key given, picked one");
            vec![key]
        } else {
            query.group_by.clone()
        };
        let group_by = requested
            .iter()
            .map(|key| correct_group_key(key, &live, &query.model))
            .collect::<Result<Vec<_>, _>>()?;

        let measures = validate_measures(&query.measures, &live);
        let field_measures: Vec<String> = measures
            .iter()
            .filter_map(|m| match m {
                Measure::Field(name) => Some(name.clone()),
                Measure::Count => None,
            })
            .collect();

        let rows = self.store.read_group(&GroupRequest {
            entity: &query.model,
            domain: &query.domain,
            group_by: &group_by,
            measures: &field_measures,
            limit: query.limit.unwrap_or(AGGREGATION_DEFAULT_LIMIT),
            order_by: group_by.first(),
            lazy: false,
        })?;

        // Non-empty: either the request had keys or the fallback produced one
        let primary = &group_by[0];
        let dimension = primary.field.clone();
        let dimension_key = primary.spec();
        let measure = &measures[0];
        let measure_name = match measure {
            Measure::Count => "count".to_string(),
            Measure::Field(name) => name.clone(),
        };

        let records: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                let dim = row
                    .remove(&dimension_key)
                    .or_else(|| row.remove(&dimension))
                    .unwrap_or(FieldValue::Null)
                    .into_display();
                let value = match row.remove(measure.as_str()) {
                    None | Some(FieldValue::Null) => json!(0),
                    Some(v) => Value::from(v),
                };
                let mut out = Row::new();
                out.insert(dimension.clone(), Value::from(dim));
                out.insert(measure_name.clone(), value);
                out
            })
            .collect();

        let mut field_descriptions = Map::new();
        if let Some(field) = live.iter().find(|f| f.name == dimension) {
            field_descriptions.insert(dimension.clone(), Value::String(field.label.clone()));
        }

        tracing::debug!(model = %query.model, groups = records.len(), "Aggregation complete");
        Ok(AggregationResult {
            aggregation: true,
            model: info.id,
            model_label: info.label,
            fields: vec![dimension.clone(), measure_name.clone()],
            dimension,
            measure: measure_name,
            count: records.len(),
            records,
            field_descriptions,
        })
    }
}

/// Keep a key whose field exists; otherwise swap in the first field whose
/// name contains the requested one.
fn correct_group_key(key: &GroupKey, live: &[Field], model: &str) -> Result<GroupKey, SearchError> {
    if live.iter().any(|f| f.name == key.field) {
        return Ok(key.clone());
    }
    let needle = key.field.to_lowercase();
    match live.iter().find(|f| f.name.to_lowercase().contains(&needle)) {
        Some(similar) => {
            tracing::info!(requested = %key.field, corrected = %similar.name, "Corrected group key");
            Ok(GroupKey {
                field: similar.name.clone(),
                granularity: key.granularity,
            })
        }
        None => Err(SearchError::Validation(format!(
            "Field '{}' does not exist in model {model}",
            key.field
        ))),
    }
}

fn validate_measures(requested: &[Measure], live: &[Field]) -> Vec<Measure> {
    let valid: Vec<Measure> = requested
        .iter()
        .filter(|m| match m {
            Measure::Count => true,
            Measure::Field(name) => {
                let exists = live.iter().any(|f| &f.name == name);
                if !exists {
                    tracing::warn!(measure = %name, "Dropping unknown measure");
                }
                exists
            }
        })
        .cloned()
        .collect();
    if valid.is_empty() {
        vec![Measure::Count]
    } else {
        valid
    }
}

/// Validation, empty-result and execution errors keep their meaning; any
/// other store failure surfaces as an execution error.
fn into_execution_error(err: SearchError) -> SearchError {
    match err {
        SearchError::Validation(_) | SearchError::EmptyResult(_) | SearchError::Execution(_) => err,
        other => {
            tracing::error!(error = %other, "Query execution failed");
            SearchError::Execution(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::{init_test_store, store_from_sql};
    use crate::store::{Domain, Granularity};

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn single(model: &str, fields: &[&str]) -> SingleQuery {
        SingleQuery::new(model, names(fields), None)
    }

    #[test]
    fn test_single_drops_unknown_fields() {
        let store = init_test_store().unwrap();
        let mut query = single("res.users", &["name", "login", "email"]);
        query.limit = Some(20);
        let result = QueryExecutor::new(&store)
            .execute(&QueryIntent::Single(query))
            .unwrap();
        let ExecutionResult::Single(r) = result else {
            panic!("expected single result");
        };
        assert!(!r.multi_model);
        assert_eq!(r.model_label, "Users");
        assert_eq!(r.fields, names(&["name", "login"]));
        assert_eq!(r.count, 3);
        assert_eq!(r.records[0]["login"], "admin");
        assert!(r.records.iter().all(|row| row.contains_key("id")));
        assert!(r.records.iter().all(|row| !row.contains_key("email")));
    }

    #[test]
    fn test_single_domain_and_limit() {
        let store = init_test_store().unwrap();
        let mut query = single("account.move", &["name", "partner_id"]);
        query.domain = Domain::from_value(&json!([["state", "=", "posted"]])).unwrap();
        query.limit = Some(2);
        let ExecutionResult::Single(r) = QueryExecutor::new(&store)
            .execute(&QueryIntent::Single(query))
            .unwrap()
        else {
            panic!("expected single result");
        };
        assert_eq!(r.count, 2);
        assert_eq!(r.records[0]["partner_id"], json!([1, "Matti Meikäläinen"]));
    }

    #[test]
    fn test_single_with_missing_relation_target() {
        let store = store_from_sql(
            r#"
            CREATE TABLE "sale.order" (
                id INTEGER PRIMARY KEY,
                name TEXT,
                team_id INTEGER REFERENCES "crm.team"(id)
            );
            INSERT INTO "sale.order" VALUES (1, 'SO001', 5);
            "#,
        )
        .unwrap();
        let ExecutionResult::Single(r) = QueryExecutor::new(&store)
            .execute(&QueryIntent::Single(single("sale.order", &["name", "team_id"])))
            .unwrap()
        else {
            panic!("expected single result");
        };
        assert_eq!(r.count, 1);
        assert_eq!(r.fields, names(&["name", "team_id"]));
        assert_eq!(r.records[0]["team_id"], json!([5, "5"]));
    }

    #[test]
    fn test_invalid_model() {
        let store = init_test_store().unwrap();
        let err = QueryExecutor::new(&store)
            .execute(&QueryIntent::Single(single("no.such.model", &["name"])))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "Invalid model: no.such.model");
    }

    #[test]
    fn test_invalid_domain_field_is_execution_error() {
        let store = init_test_store().unwrap();
        let mut query = single("res.users", &["login"]);
        query.domain = Domain::from_value(&json!([["bogus", "=", 1]])).unwrap();
        let err = QueryExecutor::new(&store)
            .execute(&QueryIntent::Single(query))
            .unwrap_err();
        assert_eq!(err.kind(), "execution");
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_aggregation_by_day() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Aggregation(AggregationQuery {
            model: "account.move".into(),
            domain: Domain::empty(),
            group_by: vec![GroupKey::with_granularity("invoice_date", Granularity::Day)],
            measures: vec![Measure::Count],
            limit: None,
        });
        let ExecutionResult::Aggregation(r) = QueryExecutor::new(&store).execute(&intent).unwrap()
        else {
            panic!("expected aggregation result");
        };
        assert!(r.aggregation);
        assert_eq!(r.dimension, "invoice_date");
        assert_eq!(r.measure, "count");
        assert_eq!(r.fields, names(&["invoice_date", "count"]));
        assert_eq!(r.field_descriptions["invoice_date"], "Invoice/Bill Date");
        assert_eq!(r.count, 4);
        let jan = r
            .records
            .iter()
            .find(|row| row["invoice_date"] == "2024-01-15")
            .unwrap();
        assert_eq!(jan["count"], 2);
        assert!(r.records.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_aggregation_relation_dimension_uses_label() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Aggregation(AggregationQuery {
            model: "account.move".into(),
            domain: Domain::from_value(&json!([["partner_id", "!=", false]])).unwrap(),
            group_by: vec![GroupKey::new("partner_id")],
            measures: vec![Measure::Field("amount_total".into())],
            limit: None,
        });
        let ExecutionResult::Aggregation(r) = QueryExecutor::new(&store).execute(&intent).unwrap()
        else {
            panic!("expected aggregation result");
        };
        assert_eq!(r.measure, "amount_total");
        let globex = r
            .records
            .iter()
            .find(|row| row["partner_id"] == "Globex Buyer")
            .unwrap();
        assert_eq!(globex["amount_total"], 400.0);
    }

    #[test]
    fn test_aggregation_unknown_key() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Aggregation(AggregationQuery {
            model: "account.move".into(),
            domain: Domain::empty(),
            group_by: vec![GroupKey::parse("nonexistent_field:day")],
            measures: vec![Measure::Count],
            limit: None,
        });
        let err = QueryExecutor::new(&store).execute(&intent).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("nonexistent_field"));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_aggregation_corrects_key_and_measures() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Aggregation(AggregationQuery {
            model: "account.move".into(),
            domain: Domain::empty(),
            group_by: vec![GroupKey::with_granularity("date", Granularity::Month)],
            measures: vec![Measure::Field("bogus".into())],
            limit: None,
        });
        let ExecutionResult::Aggregation(r) = QueryExecutor::new(&store).execute(&intent).unwrap()
        else {
            panic!("expected aggregation result");
        };
        assert_eq!(r.dimension, "invoice_date");
        assert_eq!(r.measure, "count");
        assert!(r.records.iter().any(|row| row["invoice_date"] == "2024-02" && row["count"] == 2));
    }

    #[test]
    fn test_aggregation_picks_group_key() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Aggregation(AggregationQuery {
            model: "account.move".into(),
            domain: Domain::empty(),
            group_by: vec![],
            measures: vec![],
            limit: None,
        });
        let ExecutionResult::Aggregation(r) = QueryExecutor::new(&store).execute(&intent).unwrap()
        else {
            panic!("expected aggregation result");
        };
        assert_eq!(r.dimension, "invoice_date");
        assert!(r.records.iter().any(|row| row["invoice_date"] == "2024-01" && row["count"] == 2));
    }

    #[test]
    fn test_multi_joins_to_one_relations() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Multi {
            queries: vec![
                single("res.users.log", &["user_id", "login_date"]),
                single("res.users", &["login", "name"]),
            ],
        };
        let ExecutionResult::Multi(r) = QueryExecutor::new(&store).execute(&intent).unwrap() else {
            panic!("expected multi result");
        };
        assert!(r.multi_model);
        assert_eq!(r.total_count, 6);

        let logs = &r.results[0];
        assert!(logs.has_linked_data);
        assert_eq!(logs.linked_model.as_deref(), Some("res.users"));
        assert!(logs
            .records
            .iter()
            .all(|row| row["has_linked_data"] == true && row.contains_key("res_users_info")));
        assert_eq!(logs.records[0]["res_users_info"]["login"], "admin");

        assert!(!r.results[1].has_linked_data);
        assert!(r.results[1].records.iter().all(|row| !row.contains_key("has_linked_data")));
    }

    #[test]
    fn test_multi_without_target_in_results_does_not_join() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Multi {
            queries: vec![
                single("res.users.log", &["user_id"]),
                single("res.company", &["name"]),
            ],
        };
        let ExecutionResult::Multi(r) = QueryExecutor::new(&store).execute(&intent).unwrap() else {
            panic!("expected multi result");
        };
        assert!(r.results.iter().all(|m| !m.has_linked_data));
        assert!(r.results[0].records.iter().all(|row| !row.contains_key("res_users_info")));
    }

    #[test]
    fn test_multi_skips_failing_sub_query() {
        let store = init_test_store().unwrap();
        let intent = QueryIntent::Multi {
            queries: vec![single("no.such.model", &["name"]), single("res.company", &["name"])],
        };
        let ExecutionResult::Multi(r) = QueryExecutor::new(&store).execute(&intent).unwrap() else {
            panic!("expected multi result");
        };
        assert_eq!(r.results.len(), 1);
        assert_eq!(r.total_count, 2);

        let err = QueryExecutor::new(&store)
            .execute(&QueryIntent::Multi { queries: vec![] })
            .unwrap_err();
        assert_eq!(err.to_string(), "No valid queries provided for multi-model search");
    }
}
