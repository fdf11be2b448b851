use crate::config::SchemaConfig;
use crate::error::SearchError;
use crate::store::DataStore;

use super::{EntityType, SchemaDocument};

/// Builds a [`SchemaDocument`] from a store's metadata facility.
pub struct SchemaCatalog {
    config: SchemaConfig,
}

impl SchemaCatalog {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Entity types behind a technical prefix are only visible to elevated callers.
    pub fn is_technical(&self, entity: &str) -> bool {
        self.config
            .technical_prefixes
            .iter()
            .any(|prefix| entity.starts_with(prefix.as_str()))
    }

    fn is_excluded_field(&self, name: &str) -> bool {
        self.config.excluded_fields.iter().any(|f| f == name)
    }

    /// Enumerate every visible entity type with its fields.
    ///
    /// A failure listing entity types is fatal. A failure listing one entity's
    /// fields skips that entity.
    pub fn discover(&self, store: &dyn DataStore, elevated: bool) -> Result<SchemaDocument, SearchError> {
        let entities = store.entity_types()?;
        let total = entities.len();
        let mut document = SchemaDocument::new();
        let mut skipped = 0usize;

        for info in entities {
            if !elevated && self.is_technical(&info.id) {
                continue;
            }

            let fields = match store.fields(&info.id) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(entity = %info.id, error = %e, "Failed to list fields, skipping entity");
                    skipped += 1;
                    continue;
                }
            };

            let fields = fields
                .into_iter()
                .filter(|f| !self.is_excluded_field(&f.name))
                .filter(|f| {
                    let ok = f.is_well_formed();
                    if !ok {
                        tracing::warn!(entity = %info.id, field = %f.name, "Relation field has no target, dropping");
                    }
                    ok
                })
                .collect();

            document.insert(EntityType::new(info.id, info.label, fields));
        }

        tracing::info!(
            discovered = document.len(),
            total,
            skipped,
            elevated,
            "Schema discovery complete"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityInfo, Field, FieldType};
    use crate::store::{sqlite::init_test_store, GroupRequest, Record, SearchRequest};

    /// Store with one entity whose field listing fails and one malformed relation.
    struct FlakyStore;

    impl DataStore for FlakyStore {
        fn entity_types(&self) -> Result<Vec<EntityInfo>, SearchError> {
            Ok(vec![
                EntityInfo { id: "res.partner".into(), label: "Contact".into() },
                EntityInfo { id: "broken.model".into(), label: "Broken".into() },
            ])
        }

        fn fields(&self, entity: &str) -> Result<Vec<Field>, SearchError> {
            match entity {
                "res.partner" => Ok(vec![
                    Field::new("name", FieldType::Char, "Name"),
                    Field::new("parent_id", FieldType::Many2one, "Parent"),
                    Field::new("write_date", FieldType::Datetime, "Last Updated on"),
                ]),
                _ => Err(SearchError::Execution("access denied".into())),
            }
        }

        fn search_read(&self, _: &SearchRequest<'_>) -> Result<Vec<Record>, SearchError> {
            Ok(vec![])
        }

        fn read_group(&self, _: &GroupRequest<'_>) -> Result<Vec<Record>, SearchError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_discover_hides_technical_entities() {
        let store = init_test_store().unwrap();
        let catalog = SchemaCatalog::new(SchemaConfig::default());

        let standard = catalog.discover(&store, false).unwrap();
        assert!(standard.contains("res.users"));
        assert!(!standard.contains("ir.config_parameter"));

        let elevated = catalog.discover(&store, true).unwrap();
        assert!(elevated.contains("ir.config_parameter"));
        assert_eq!(elevated.len(), standard.len() + 1);
    }

    #[test]
    fn test_discover_drops_audit_fields() {
        let store = init_test_store().unwrap();
        let doc = SchemaCatalog::new(SchemaConfig::default())
            .discover(&store, false)
            .unwrap();
        let users = doc.get("res.users").unwrap();
        assert!(users.field("login").is_some());
        assert!(users.field("create_date").is_none());
        assert!(users.field("write_date").is_none());
        assert_eq!(users.label, "Users");
    }

    #[test]
    fn test_discover_skips_failing_entity_and_malformed_fields() {
        let doc = SchemaCatalog::new(SchemaConfig::default())
            .discover(&FlakyStore, false)
            .unwrap();
        assert_eq!(doc.len(), 1);
        let partner = doc.get("res.partner").unwrap();
        let names: Vec<&str> = partner.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name"]);
    }
}
