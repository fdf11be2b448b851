//! Query-driven schema reduction.
//!
//! Large schemas are cut down to the entities the query text mentions before
//! being sent to the model. Small schemas pass through untouched.

use std::collections::HashSet;

use super::{EntityType, SchemaDocument};

/// Schemas at or below this size are never reduced.
pub const REDUCTION_THRESHOLD: usize = 20;
/// Upper bound on top-scored entities kept (before base entities are added back).
pub const MAX_KEPT_ENTITIES: usize = 30;

/// Per identifier segment found in the query.
pub const SEGMENT_WEIGHT: u32 = 10;
/// When the entity label appears in the query.
pub const LABEL_WEIGHT: u32 = 15;
/// Per field technical name found in the query.
pub const FIELD_NAME_WEIGHT: u32 = 5;
/// Per field label found in the query.
pub const FIELD_LABEL_WEIGHT: u32 = 3;

/// Relevance of one entity to an already lowercased query.
pub fn score_entity(entity: &EntityType, query_lower: &str) -> u32 {
    let mentions = |needle: &str| !needle.is_empty() && query_lower.contains(needle);

    let mut score = 0;
    for segment in entity.id.split('.') {
        if mentions(&segment.to_lowercase()) {
            score += SEGMENT_WEIGHT;
        }
    }
    if mentions(&entity.label.to_lowercase()) {
        score += LABEL_WEIGHT;
    }
    for field in &entity.fields {
        if mentions(&field.name.to_lowercase()) {
            score += FIELD_NAME_WEIGHT;
        }
        if mentions(&field.label.to_lowercase()) {
            score += FIELD_LABEL_WEIGHT;
        }
    }
    score
}

/// Reduce `schema` to the entities most relevant to `query`, always keeping
/// the base entities that exist.
pub fn reduce(schema: &SchemaDocument, query: &str, base_entities: &[String]) -> SchemaDocument {
    let total = schema.len();
    if total <= REDUCTION_THRESHOLD || query.trim().is_empty() {
        return schema.clone();
    }

    let query_lower = query.to_lowercase();
    let mut scored: Vec<(&str, u32)> = schema
        .iter()
        .map(|e| (e.id.as_str(), score_entity(e, &query_lower)))
        .collect();
    // Stable: ties keep schema order.
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let keep_count = MAX_KEPT_ENTITIES.min(total / 2);
    let mut keep: HashSet<&str> = scored.iter().take(keep_count).map(|(id, _)| *id).collect();
    for base in base_entities {
        if schema.contains(base) {
            keep.insert(base.as_str());
        }
    }

    let reduced = schema.restrict(|id| keep.contains(id));
    tracing::info!(
        original = total,
        reduced = reduced.len(),
        "Reduced schema for query"
    );
    reduced
}
