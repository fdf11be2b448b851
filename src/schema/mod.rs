//! Runtime schema model: entity types, fields, and the schema document.
//!
//! Nothing here is hardcoded to a particular store. Entity types and fields are
//! plain value structs filled in by a [`crate::store::DataStore`] implementation.

pub mod cache;
pub mod catalog;
pub mod relevance;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

pub use cache::SchemaCache;
pub use catalog::SchemaCatalog;

// ============================================================================
// Field types
// ============================================================================

/// Declared field type, using the store's type vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Char,
    Text,
    Html,
    Integer,
    Float,
    Monetary,
    Boolean,
    Date,
    Datetime,
    Selection,
    Binary,
    Many2one,
    One2many,
    Many2many,
    Other(String),
}

/// How many records a relation field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ToOne,
    ToMany,
    ManyToMany,
}

impl FieldType {
    /// Parse from the store's type name. Unknown names are kept verbatim.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "char" => FieldType::Char,
            "text" => FieldType::Text,
            "html" => FieldType::Html,
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "monetary" => FieldType::Monetary,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::Datetime,
            "selection" => FieldType::Selection,
            "binary" => FieldType::Binary,
            "many2one" => FieldType::Many2one,
            "one2many" => FieldType::One2many,
            "many2many" => FieldType::Many2many,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Char => "char",
            FieldType::Text => "text",
            FieldType::Html => "html",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Monetary => "monetary",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Selection => "selection",
            FieldType::Binary => "binary",
            FieldType::Many2one => "many2one",
            FieldType::One2many => "one2many",
            FieldType::Many2many => "many2many",
            FieldType::Other(name) => name,
        }
    }

    pub fn relation_kind(&self) -> Option<RelationKind> {
        match self {
            FieldType::Many2one => Some(RelationKind::ToOne),
            FieldType::One2many => Some(RelationKind::ToMany),
            FieldType::Many2many => Some(RelationKind::ManyToMany),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation_kind().is_some()
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Monetary)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Field / EntityType
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub label: String,
    /// Target entity identifier; only set for relation-typed fields.
    pub relation: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            label: label.into(),
            relation: None,
        }
    }

    pub fn relation(
        name: impl Into<String>,
        field_type: FieldType,
        label: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            relation: Some(target.into()),
            ..Self::new(name, field_type, label)
        }
    }

    /// Relation kind plus target, when this is a well-formed relation field.
    pub fn relation_target(&self) -> Option<(RelationKind, &str)> {
        let kind = self.field_type.relation_kind()?;
        match self.relation.as_deref() {
            Some(target) if !target.is_empty() => Some((kind, target)),
            _ => None,
        }
    }

    /// A relation-typed field must name its target; everything else is always valid.
    pub fn is_well_formed(&self) -> bool {
        !self.field_type.is_relation() || self.relation_target().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityType {
    pub id: String,
    pub label: String,
    pub fields: Vec<Field>,
}

impl EntityType {
    pub fn new(id: impl Into<String>, label: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.relation_target().is_some())
    }
}

/// Identifier and label of an entity type, as listed by the store's metadata facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    pub id: String,
    pub label: String,
}

// ============================================================================
// SchemaDocument
// ============================================================================

/// Mapping from entity identifier to entity type. Iteration order is the
/// identifier order, which is what "stable input order" means everywhere else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    entities: BTreeMap<String, EntityType>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity type, replacing any previous entry with the same id.
    pub fn insert(&mut self, entity: EntityType) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn get(&self, id: &str) -> Option<&EntityType> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// New document holding only the entities whose id satisfies `keep`.
    pub fn restrict<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        Self {
            entities: self
                .entities
                .iter()
                .filter(|(id, _)| keep(id))
                .map(|(id, e)| (id.clone(), e.clone()))
                .collect(),
        }
    }

    /// Target entity of a relation field, or `None` when it is not part of this document.
    pub fn resolve_relation(&self, field: &Field) -> Option<&EntityType> {
        field.relation_target().and_then(|(_, target)| self.get(target))
    }

    /// Compact JSON embedded in the model prompt:
    /// `{ id: { name, fields: { field: { type, string, relation } } } }`.
    pub fn to_prompt_value(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for entity in self.iter() {
            let mut fields = serde_json::Map::new();
            for field in &entity.fields {
                let relation = match field.relation_target() {
                    Some((_, target)) => serde_json::Value::String(target.to_string()),
                    None => serde_json::Value::Bool(false),
                };
                fields.insert(
                    field.name.clone(),
                    serde_json::json!({
                        "type": field.field_type.as_str(),
                        "string": field.label,
                        "relation": relation,
                    }),
                );
            }
            root.insert(
                entity.id.clone(),
                serde_json::json!({ "name": entity.label, "fields": fields }),
            );
        }
        serde_json::Value::Object(root)
    }
}

impl Serialize for SchemaDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_prompt_value().serialize(serializer)
    }
}

impl FromIterator<EntityType> for SchemaDocument {
    fn from_iter<I: IntoIterator<Item = EntityType>>(iter: I) -> Self {
        let mut doc = Self::new();
        for entity in iter {
            doc.insert(entity);
        }
        doc
    }
}
