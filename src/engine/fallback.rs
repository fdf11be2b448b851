//! Deterministic intent construction for when the model returns nothing.
//!
//! Entities are ranked against the query words, then the query wording picks
//! the shape: aggregation words first, then multi-entity if the top entities
//! are related or joining words appear, otherwise a single-entity listing.

use super::fields::{fallback_group_key, non_technical_fields, pick_first_available, NAME_FIELDS};
use super::intent::{AggregationQuery, Measure, QueryIntent, SingleQuery};
use crate::error::SearchError;
use crate::schema::{EntityType, FieldType, SchemaDocument};
use crate::store::Domain;

/// Query word equal to an identifier segment.
pub const EXACT_SEGMENT_WEIGHT: u32 = 15;
/// Query word and identifier segment where one contains the other.
pub const PARTIAL_SEGMENT_WEIGHT: u32 = 5;
/// Query word found in the entity label.
pub const LABEL_WORD_WEIGHT: u32 = 10;
/// Known localized term matched to an English label/identifier fragment.
pub const TERM_PAIR_WEIGHT: u32 = 20;

/// `(query term, label or identifier fragment)`.
pub const TERM_PAIRS: &[(&str, &str)] = &[("käyttäjät", "user"), ("kirjautumiset", "log")];

pub const AGGREGATION_WORDS: &[&str] = &[
    "count", "sum", "average", "group", "montako", "ryhmittele", "kuinka monta", "total",
];

pub const JOIN_WORDS: &[&str] = &[
    "join", "combine", "together", "related", "yhdistä", "näytä", "ja", "from", "with", "both",
    "kanssa", "sekä",
];

pub const SINGLE_LIMIT: usize = 20;
pub const MULTI_LIMIT: usize = 20;
pub const AGGREGATION_LIMIT: usize = 100;

/// Top-ranked entities considered for relations and multi-entity queries.
const MAX_MULTI_ENTITIES: usize = 3;
const MULTI_FIELD_LIMIT: usize = 5;
const SINGLE_FIELD_LIMIT: usize = 6;
const DEFAULT_FIELD_COUNT: usize = 3;

const SINGLE_NAMED_FIELDS: &[&str] = &["name", "display_name", "email", "phone", "date"];
const SINGLE_SKIPPED_FIELDS: &[&str] = &["write_uid", "write_date"];

/// Lowercased query split into words with surrounding punctuation removed.
struct QueryWords {
    lower: String,
    words: Vec<String>,
}

impl QueryWords {
    fn new(query: &str) -> Self {
        let lower = query.to_lowercase();
        let words = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { lower, words }
    }

    /// Indicators match anywhere in the query, including inside compound words.
    fn mentions(&self, indicator: &str) -> bool {
        self.lower.contains(indicator)
    }

    fn mentions_any(&self, indicators: &[&str]) -> bool {
        indicators.iter().any(|i| self.mentions(i))
    }
}

fn score_entity(entity: &EntityType, query: &QueryWords) -> u32 {
    let id_lower = entity.id.to_lowercase();
    let label_lower = entity.label.to_lowercase();
    let mut score = 0;

    for segment in id_lower.split('.').filter(|s| !s.is_empty()) {
        for word in &query.words {
            if word == segment {
                score += EXACT_SEGMENT_WEIGHT;
            } else if word.contains(segment) || segment.contains(word.as_str()) {
                score += PARTIAL_SEGMENT_WEIGHT;
            }
        }
    }

    for word in &query.words {
        if label_lower.contains(word.as_str()) {
            score += LABEL_WORD_WEIGHT;
        }
    }

    for (term, fragment) in TERM_PAIRS {
        if query.lower.contains(term) && (label_lower.contains(fragment) || id_lower.contains(fragment)) {
            score += TERM_PAIR_WEIGHT;
        }
    }

    score
}

/// Entities scoring above zero, best first; ties keep schema order.
fn rank<'a>(schema: &'a SchemaDocument, query: &QueryWords) -> Vec<(&'a EntityType, u32)> {
    let mut ranked: Vec<_> = schema
        .iter()
        .map(|e| (e, score_entity(e, query)))
        .filter(|(_, score)| *score > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// Whether a relation field of one entity targets another, distinct entity of the set.
fn any_related(entities: &[&EntityType]) -> bool {
    entities.iter().any(|source| {
        source.relation_fields().any(|f| {
            f.relation_target().is_some_and(|(_, target)| {
                target != source.id && entities.iter().any(|e| e.id == target)
            })
        })
    })
}

fn multi_fields(entity: &EntityType) -> Vec<String> {
    let mut selected: Vec<String> = entity
        .fields
        .iter()
        .filter(|f| {
            NAME_FIELDS.contains(&f.name.as_str())
                || matches!(f.field_type, FieldType::Many2one | FieldType::Char)
                || f.name.to_lowercase().contains("id")
        })
        .take(MULTI_FIELD_LIMIT)
        .map(|f| f.name.clone())
        .collect();

    if selected.is_empty() {
        if let Some(f) = entity
            .fields
            .iter()
            .find(|f| f.name == "display_name" || f.name.to_lowercase().contains("name"))
        {
            selected.push(f.name.clone());
        }
    }
    if selected.is_empty() {
        selected = non_technical_fields(&entity.fields, DEFAULT_FIELD_COUNT);
    }
    if selected.is_empty() {
        if let Some(name) = pick_first_available(&["display_name"], |n| entity.field(n).is_some())
            .or_else(|| entity.fields.first().map(|f| f.name.as_str()))
        {
            selected.push(name.to_string());
        }
    }
    selected
}

fn single_fields(entity: &EntityType) -> Vec<String> {
    let mut selected: Vec<String> = entity
        .fields
        .iter()
        .filter(|f| !f.name.starts_with('_') && !SINGLE_SKIPPED_FIELDS.contains(&f.name.as_str()))
        .filter(|f| {
            matches!(f.field_type, FieldType::Char | FieldType::Text)
                || SINGLE_NAMED_FIELDS.contains(&f.name.as_str())
                || (f.field_type == FieldType::Many2one && f.name.ends_with("_id"))
                || f.field_type.is_temporal()
        })
        .take(SINGLE_FIELD_LIMIT)
        .map(|f| f.name.clone())
        .collect();

    if selected.is_empty() {
        if let Some(name) = pick_first_available(NAME_FIELDS, |n| entity.field(n).is_some()) {
            selected.push(name.to_string());
        }
    }
    if selected.is_empty() {
        selected = non_technical_fields(&entity.fields, DEFAULT_FIELD_COUNT);
    }
    selected
}

/// Build an intent from the schema alone.
pub fn build_fallback(
    schema: &SchemaDocument,
    query: &str,
    base_entities: &[String],
) -> Result<QueryIntent, SearchError> {
    let words = QueryWords::new(query);
    let mut ranked = rank(schema, &words);

    if ranked.is_empty() {
        ranked = base_entities
            .iter()
            .filter_map(|id| schema.get(id))
            .map(|e| (e, 1))
            .collect();
    }

    let Some(&(top, top_score)) = ranked.first() else {
        return Err(SearchError::EmptyResult(
            "no entity type matches the query".into(),
        ));
    };
    tracing::info!(
        candidates = ranked.len(),
        top = %top.id,
        top_score,
        "Building fallback intent"
    );

    if words.mentions_any(AGGREGATION_WORDS) {
        match fallback_group_key(&top.fields) {
            Some(key) => {
                tracing::info!(model = %top.id, group_by = %key, "Fallback aggregation");
                return Ok(QueryIntent::Aggregation(AggregationQuery {
                    model: top.id.clone(),
                    domain: Domain::empty(),
                    group_by: vec![key],
                    measures: vec![Measure::Count],
                    limit: Some(AGGREGATION_LIMIT),
                }));
            }
            None => tracing::warn!(model = %top.id, "No groupable field, falling back to listing"),
        }
    }

    if ranked.len() >= 2 {
        let top_entities: Vec<&EntityType> = ranked
            .iter()
            .take(MAX_MULTI_ENTITIES)
            .map(|(e, _)| *e)
            .collect();
        if any_related(&top_entities) || words.mentions_any(JOIN_WORDS) {
            let queries = top_entities
                .iter()
                .map(|e| SingleQuery::new(e.id.clone(), multi_fields(e), Some(MULTI_LIMIT)))
                .collect::<Vec<_>>();
            tracing::info!(models = queries.len(), "Fallback multi-entity query");
            return Ok(QueryIntent::Multi { queries });
        }
    }

    tracing::info!(model = %top.id, "Fallback single-entity query");
    Ok(QueryIntent::Single(SingleQuery::new(
        top.id.clone(),
        single_fields(top),
        Some(SINGLE_LIMIT),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn base() -> Vec<String> {
        vec!["res.users".into(), "res.partner".into(), "res.company".into()]
    }

    fn schema() -> SchemaDocument {
        vec![
            EntityType::new(
                "res.users",
                "Users",
                vec![
                    Field::new("id", FieldType::Integer, "ID"),
                    Field::new("login", FieldType::Char, "Login"),
                    Field::new("active", FieldType::Boolean, "Active"),
                    Field::relation("partner_id", FieldType::Many2one, "Related Partner", "res.partner"),
                ],
            ),
            EntityType::new(
                "res.users.log",
                "User Login",
                vec![
                    Field::new("id", FieldType::Integer, "ID"),
                    Field::relation("user_id", FieldType::Many2one, "User", "res.users"),
                    Field::new("login_date", FieldType::Datetime, "Login Date"),
                ],
            ),
            EntityType::new(
                "res.partner",
                "Contact",
                vec![
                    Field::new("name", FieldType::Char, "Name"),
                    Field::new("email", FieldType::Char, "Email"),
                    Field::relation("parent_id", FieldType::Many2one, "Parent", "res.partner"),
                ],
            ),
            EntityType::new(
                "account.move",
                "Journal Entry",
                vec![
                    Field::new("name", FieldType::Char, "Number"),
                    Field::new("state", FieldType::Selection, "Status"),
                    Field::new("invoice_date", FieldType::Date, "Invoice Date"),
                    Field::new("amount_total", FieldType::Monetary, "Total"),
                ],
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_scoring_weights() {
        let doc = schema();
        let users = doc.get("res.users").unwrap();
        // Exact segment plus label word
        assert_eq!(score_entity(users, &QueryWords::new("users")), 25);
        // Partial segment plus label word
        assert_eq!(score_entity(users, &QueryWords::new("user")), 15);
        // Term pair only
        assert_eq!(score_entity(users, &QueryWords::new("listaa käyttäjät")), TERM_PAIR_WEIGHT);
    }

    #[test]
    fn test_indicator_matching() {
        let q = QueryWords::new("Kuinka monta laskua?");
        assert!(q.mentions("kuinka monta"));
        assert!(!q.mentions("ja"));

        let q = QueryWords::new("users with partners");
        assert!(q.mentions_any(JOIN_WORDS));

        let q = QueryWords::new("näytä käyttäjät");
        assert!(q.mentions("näytä"));
        assert!(!q.mentions("ja"));

        // Inside compound words and after a prefix
        assert!(QueryWords::new("move kokonaissumma").mentions_any(AGGREGATION_WORDS));
        assert!(QueryWords::new("move subtotals").mentions_any(AGGREGATION_WORDS));
    }

    #[test]
    fn test_aggregation_word_inside_compound() {
        for query in ["move kokonaissumma", "move subtotals"] {
            let intent = build_fallback(&schema(), query, &base()).unwrap();
            let QueryIntent::Aggregation(q) = intent else {
                panic!("expected aggregation for {query:?}, got {intent:?}");
            };
            assert_eq!(q.model, "account.move");
            assert_eq!(q.measures, vec![Measure::Count]);
        }
    }

    #[test]
    fn test_finnish_users_query_builds_multi() {
        let intent = build_fallback(&schema(), "listaa käyttäjät", &base()).unwrap();
        let QueryIntent::Multi { queries } = intent else {
            panic!("expected multi, got {intent:?}");
        };
        let models: Vec<&str> = queries.iter().map(|q| q.model.as_str()).collect();
        assert_eq!(models, vec!["res.users", "res.users.log"]);
        assert_eq!(queries[0].fields, vec!["id", "login", "partner_id"]);
        assert_eq!(queries[1].fields, vec!["id", "user_id"]);
        assert!(queries.iter().all(|q| q.limit == Some(MULTI_LIMIT)));
    }

    #[test]
    fn test_aggregation_words() {
        let intent = build_fallback(&schema(), "count journal entries", &base()).unwrap();
        let QueryIntent::Aggregation(q) = intent else {
            panic!("expected aggregation, got {intent:?}");
        };
        assert_eq!(q.model, "account.move");
        assert_eq!(q.group_by[0].spec(), "invoice_date:month");
        assert_eq!(q.measures, vec![Measure::Count]);
        assert_eq!(q.limit, Some(AGGREGATION_LIMIT));
    }

    #[test]
    fn test_single_entity() {
        let intent = build_fallback(&schema(), "contact emails", &base()).unwrap();
        let QueryIntent::Single(q) = intent else {
            panic!("expected single, got {intent:?}");
        };
        assert_eq!(q.model, "res.partner");
        assert_eq!(q.fields, vec!["name", "email", "parent_id"]);
        assert_eq!(q.limit, Some(SINGLE_LIMIT));
    }

    #[test]
    fn test_self_relation_is_not_a_join() {
        let doc: SchemaDocument = vec![
            schema().get("res.partner").unwrap().clone(),
            EntityType::new("res.partner.bank", "Bank Accounts", vec![Field::new("acc_number", FieldType::Char, "Account")]),
        ]
        .into_iter()
        .collect();
        let intent = build_fallback(&doc, "partner", &base()).unwrap();
        assert_eq!(intent.shape(), "single");
    }

    #[test]
    fn test_nothing_matches_uses_base_entities() {
        let intent = build_fallback(&schema(), "xyzzy", &base()).unwrap();
        // Two base entities exist and are related through partner_id.
        let QueryIntent::Multi { queries } = intent else {
            panic!("expected multi, got {intent:?}");
        };
        assert_eq!(queries[0].model, "res.users");
        assert_eq!(queries[1].model, "res.partner");
    }

    #[test]
    fn test_no_candidates_is_empty_result() {
        let doc: SchemaDocument = vec![EntityType::new("sale.order", "Sales Order", vec![])]
            .into_iter()
            .collect();
        let err = build_fallback(&doc, "xyzzy", &base()).unwrap_err();
        assert_eq!(err.kind(), "empty_result");
        assert!(err.to_string().contains("No data available"));
    }
}
