//! Field-selection heuristics shared by the executor and the fallback builder.
//!
//! Every "try X, else Y, else Z" cascade is an ordered preference list fed to
//! [`pick_first_available`].

use crate::schema::{Field, FieldType};
use crate::store::{Granularity, GroupKey};

/// Cascade when none of the requested fields exist.
pub const DEFAULT_FIELD_CASCADE: &[&str] = &["display_name", "name", "id"];

/// Name-like fields preferred when building a field list from scratch.
pub const NAME_FIELDS: &[&str] = &["name", "display_name"];

/// Last-resort group keys when no date or categorical field exists.
pub const GROUP_KEY_CASCADE: &[&str] = &["name", "id"];

/// Bookkeeping fields never picked by the "non-technical" heuristic.
pub const TECHNICAL_FIELDS: &[&str] = &["id", "create_uid", "write_uid"];

/// Granularity applied to a date group key chosen heuristically.
pub const DEFAULT_DATE_GRANULARITY: Granularity = Granularity::Month;

/// First preference that `is_available` accepts.
pub fn pick_first_available<'a, F>(preferences: &[&'a str], is_available: F) -> Option<&'a str>
where
    F: Fn(&str) -> bool,
{
    preferences.iter().copied().find(|p| is_available(p))
}

fn has_field(fields: &[Field], name: &str) -> bool {
    fields.iter().any(|f| f.name == name)
}

/// `_`-prefixed names and audit bookkeeping.
pub fn is_technical(name: &str) -> bool {
    name.starts_with('_') || TECHNICAL_FIELDS.contains(&name)
}

/// The requested names that exist in `available`, in request order.
pub fn validate_fields(requested: &[String], available: &[Field]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| has_field(available, name))
        .cloned()
        .collect()
}

/// Requested fields filtered to the existing ones, or a single-field default
/// when none survive.
pub fn resolve_fields(requested: &[String], available: &[Field]) -> Vec<String> {
    let valid = validate_fields(requested, available);
    if !valid.is_empty() {
        if valid.len() != requested.len() {
            tracing::info!(?requested, ?valid, "Dropped unknown fields");
        }
        return valid;
    }

    if !requested.is_empty() {
        tracing::warn!(?requested, "No requested field exists, using default");
    }
    vec![default_field(available)]
}

/// `display_name`, then `name`, then `id`, then whatever comes first.
pub fn default_field(available: &[Field]) -> String {
    pick_first_available(DEFAULT_FIELD_CASCADE, |n| has_field(available, n))
        .map(str::to_string)
        .or_else(|| available.first().map(|f| f.name.clone()))
        .unwrap_or_else(|| "id".to_string())
}

/// Up to `limit` non-technical field names in declaration order.
pub fn non_technical_fields(available: &[Field], limit: usize) -> Vec<String> {
    available
        .iter()
        .filter(|f| !is_technical(&f.name))
        .take(limit)
        .map(|f| f.name.clone())
        .collect()
}

/// Group key picked without user guidance: first date field by month, else
/// first many-to-one or selection field, else `name`, else `id`.
pub fn fallback_group_key(fields: &[Field]) -> Option<GroupKey> {
    if let Some(f) = fields.iter().find(|f| f.field_type.is_temporal()) {
        return Some(GroupKey::with_granularity(&f.name, DEFAULT_DATE_GRANULARITY));
    }
    if let Some(f) = fields
        .iter()
        .find(|f| matches!(f.field_type, FieldType::Many2one | FieldType::Selection))
    {
        return Some(GroupKey::new(&f.name));
    }
    pick_first_available(GROUP_KEY_CASCADE, |n| has_field(fields, n)).map(GroupKey::new)
}
