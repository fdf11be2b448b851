//! Relationship discovery between sub-results and the join pass over them.

use std::collections::HashMap;

use serde_json::Value;

use super::result::{ModelResult, Row};
use crate::schema::{Field, RelationKind};

/// Key added to a source row holding the joined target row.
pub const LINKED_FLAG: &str = "has_linked_data";

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipEdge {
    pub source: usize,
    pub target: usize,
    pub field: String,
    pub kind: RelationKind,
    pub source_model: String,
    pub target_model: String,
}

/// Entity and live field list of one executed sub-query.
#[derive(Debug, Clone, Copy)]
pub struct SubResultSchema<'a> {
    pub model: &'a str,
    pub fields: &'a [Field],
}

/// For each sub-result, each relation field whose target entity is another
/// sub-result's entity yields an edge to the first such sub-result.
pub fn discover(sub_results: &[SubResultSchema<'_>]) -> Vec<RelationshipEdge> {
    let mut edges = Vec::new();
    if sub_results.len() < 2 {
        return edges;
    }

    for (source, sub) in sub_results.iter().enumerate() {
        for field in sub.fields {
            let Some((kind, target_model)) = field.relation_target() else {
                continue;
            };
            let Some(target) = sub_results
                .iter()
                .enumerate()
                .position(|(i, other)| i != source && other.model == target_model)
            else {
                continue;
            };

            tracing::info!(
                source = sub.model,
                field = %field.name,
                kind = ?kind,
                target = target_model,
                "Found relationship"
            );
            edges.push(RelationshipEdge {
                source,
                target,
                field: field.name.clone(),
                kind,
                source_model: sub.model.to_string(),
                target_model: target_model.to_string(),
            });
        }
    }
    edges
}

/// `res.partner` -> `res_partner_info`
pub fn linked_key(target_model: &str) -> String {
    format!("{}_info", target_model.replace('.', "_"))
}

/// Id referenced by a to-one value: `[id, label]` or a bare id.
fn referenced_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

/// Attach target rows to source rows along every to-one edge.
///
/// Lookups use the target rows as they were before any join, so output does
/// not depend on edge order. Rows without a matching target are left as is.
pub fn join_related(results: Vec<ModelResult>, edges: &[RelationshipEdge]) -> Vec<ModelResult> {
    let snapshot: Vec<Vec<Row>> = results.iter().map(|r| r.records.clone()).collect();
    let mut joined = results;

    for edge in edges.iter().filter(|e| e.kind == RelationKind::ToOne) {
        let (Some(targets), Some(source)) = (snapshot.get(edge.target), joined.get_mut(edge.source))
        else {
            continue;
        };
        let by_id: HashMap<i64, &Row> = targets.iter().filter_map(|r| row_id(r).map(|id| (id, r))).collect();
        let key = linked_key(&edge.target_model);

        let mut linked = 0usize;
        for row in &mut source.records {
            let Some(target_row) = row.get(&edge.field).and_then(referenced_id).and_then(|id| by_id.get(&id)) else {
                continue;
            };
            row.insert(key.clone(), Value::Object((*target_row).clone()));
            row.insert(LINKED_FLAG.into(), Value::Bool(true));
            linked += 1;
        }

        if linked > 0 {
            source.has_linked_data = true;
            source.linked_model = Some(edge.target_model.clone());
            tracing::debug!(
                source = %edge.source_model,
                target = %edge.target_model,
                linked,
                "Joined related records"
            );
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().unwrap().clone()
    }

    fn model_result(model: &str, records: Vec<Row>) -> ModelResult {
        ModelResult {
            model: model.into(),
            model_label: model.into(),
            count: records.len(),
            records,
            fields: vec![],
            has_linked_data: false,
            linked_model: None,
        }
    }

    fn log_fields() -> Vec<Field> {
        vec![
            Field::new("login_date", FieldType::Datetime, "Login Date"),
            Field::relation("user_id", FieldType::Many2one, "User", "res.users"),
        ]
    }

    fn user_fields() -> Vec<Field> {
        vec![
            Field::new("login", FieldType::Char, "Login"),
            Field::relation("partner_id", FieldType::Many2one, "Partner", "res.partner"),
            Field::relation("log_ids", FieldType::One2many, "Logins", "res.users.log"),
        ]
    }

    #[test]
    fn test_discover_is_deterministic() {
        let log = log_fields();
        let users = user_fields();
        let subs = [
            SubResultSchema { model: "res.users.log", fields: &log },
            SubResultSchema { model: "res.users", fields: &users },
        ];
        let edges = discover(&subs);
        assert_eq!(edges.len(), 2);
        assert_eq!((edges[0].source, edges[0].target, edges[0].kind), (0, 1, RelationKind::ToOne));
        assert_eq!(edges[0].field, "user_id");
        assert_eq!((edges[1].source, edges[1].target, edges[1].kind), (1, 0, RelationKind::ToMany));
        assert_eq!(discover(&subs), edges);
    }

    #[test]
    fn test_single_sub_result_has_no_edges() {
        let log = log_fields();
        assert!(discover(&[SubResultSchema { model: "res.users.log", fields: &log }]).is_empty());
    }

    #[test]
    fn test_join_links_matching_rows_only() {
        let results = vec![
            model_result(
                "res.users.log",
                vec![
                    row(json!({"id": 1, "user_id": [1, "Administrator"]})),
                    row(json!({"id": 2, "user_id": [9, "Ghost"]})),
                    row(json!({"id": 3, "user_id": false})),
                ],
            ),
            model_result("res.users", vec![row(json!({"id": 1, "login": "admin"}))]),
        ];
        let edges = vec![RelationshipEdge {
            source: 0,
            target: 1,
            field: "user_id".into(),
            kind: RelationKind::ToOne,
            source_model: "res.users.log".into(),
            target_model: "res.users".into(),
        }];

        let joined = join_related(results.clone(), &edges);
        let logs = &joined[0];
        assert!(logs.has_linked_data);
        assert_eq!(logs.linked_model.as_deref(), Some("res.users"));
        assert_eq!(logs.records[0]["res_users_info"], json!({"id": 1, "login": "admin"}));
        assert_eq!(logs.records[0][LINKED_FLAG], true);
        // Unmatched rows are untouched
        assert_eq!(logs.records[1], results[0].records[1]);
        assert_eq!(logs.records[2], results[0].records[2]);
        // Target untouched
        assert_eq!(joined[1], results[1]);
    }

    #[test]
    fn test_join_ignores_to_many_and_unlinked() {
        let results = vec![
            model_result("res.users", vec![row(json!({"id": 1, "log_ids": [1, 2]}))]),
            model_result("res.users.log", vec![row(json!({"id": 5}))]),
        ];
        let edges = vec![RelationshipEdge {
            source: 0,
            target: 1,
            field: "log_ids".into(),
            kind: RelationKind::ToMany,
            source_model: "res.users".into(),
            target_model: "res.users.log".into(),
        }];
        let joined = join_related(results.clone(), &edges);
        assert_eq!(joined, results);
    }

    #[test]
    fn test_bare_id_relation_value() {
        assert_eq!(referenced_id(&json!(4)), Some(4));
        assert_eq!(referenced_id(&json!([4, "x"])), Some(4));
        assert_eq!(referenced_id(&json!(null)), None);
    }
}
