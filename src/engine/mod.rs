//! Natural-language search pipeline.
//!
//! `process_query` runs: schema snapshot -> relevance reduction -> model
//! translation -> intent extraction (or heuristic fallback) -> execution.

pub mod completion;
pub mod executor;
pub mod extract;
pub mod fallback;
pub mod fields;
pub mod intent;
pub mod prompt;
pub mod relationships;
pub mod result;
pub mod translator;

use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::schema::{relevance, SchemaCache, SchemaCatalog, SchemaDocument};
use crate::store::DataStore;

use self::completion::CompletionService;
use self::executor::QueryExecutor;
use self::intent::QueryIntent;
use self::result::ExecutionResult;
use self::translator::Translation;

/// Entry point tying the store, the completion service and the schema cache together.
pub struct SearchEngine {
    store: Arc<dyn DataStore>,
    completion: Arc<dyn CompletionService>,
    config: SearchConfig,
    catalog: SchemaCatalog,
    cache: SchemaCache,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn DataStore>,
        completion: Arc<dyn CompletionService>,
        config: SearchConfig,
    ) -> Self {
        let catalog = SchemaCatalog::new(config.schema.clone());
        let cache = SchemaCache::from_ttl_secs(config.schema.cache_ttl_secs);
        Self {
            store,
            completion,
            config,
            catalog,
            cache,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Schema visible to the caller, discovered on first use and cached.
    pub fn schema(&self, elevated: bool) -> Result<Arc<SchemaDocument>, SearchError> {
        self.cache
            .get_or_discover(elevated, || self.catalog.discover(self.store.as_ref(), elevated))
    }

    /// Drop cached schema snapshots, e.g. after the store's structure changed.
    pub fn invalidate_schema(&self) {
        self.cache.invalidate();
    }

    /// Answer a natural-language question with a normalized result document.
    pub async fn process_query(
        &self,
        query: &str,
        elevated: bool,
    ) -> Result<ExecutionResult, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("Query text is required".into()));
        }
        tracing::info!(query, elevated, "Processing search query");

        let schema = self.schema(elevated)?;
        let base_entities = &self.config.schema.base_entities;
        let reduced = relevance::reduce(&schema, query, base_entities);

        let translation = translator::translate(
            self.completion.as_ref(),
            &reduced,
            query,
            self.config.completion.max_tokens,
        )
        .await?;

        let intent = match translation {
            Translation::Raw(text) => extract::extract(&text)?,
            Translation::NoCandidates => {
                tracing::warn!("Completion returned no candidates, using heuristic fallback");
                fallback::build_fallback(&schema, query, base_entities)?
            }
        };
        tracing::debug!(intent = %intent.to_value(), "Resolved query intent");

        let result = self.execute(&intent)?;
        tracing::info!(
            shape = intent.shape(),
            records = result.record_count(),
            "Search complete"
        );
        Ok(result)
    }

    /// Execute an already-structured intent.
    pub fn execute(&self, intent: &QueryIntent) -> Result<ExecutionResult, SearchError> {
        QueryExecutor::new(self.store.as_ref()).execute(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::completion::{CompletionReply, CompletionRequest};
    use crate::store::sqlite::init_test_store;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed reply and records every request it saw.
    struct ScriptedCompletion {
        reply: CompletionReply,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, SearchError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn engine(reply: CompletionReply) -> (SearchEngine, Arc<ScriptedCompletion>) {
        let completion = Arc::new(ScriptedCompletion {
            reply,
            requests: Mutex::new(Vec::new()),
        });
        let store = Arc::new(init_test_store().unwrap());
        let engine = SearchEngine::new(store, completion.clone(), SearchConfig::default());
        (engine, completion)
    }

    fn answer(text: &str) -> CompletionReply {
        CompletionReply::Candidates(vec![text.to_string()])
    }

    #[tokio::test]
    async fn test_single_entity_search() {
        let (engine, completion) = engine(answer(
            r#"{"model": "res.users", "domain": [], "fields": ["name", "login", "email"], "limit": 20}"#,
        ));
        let result = engine.process_query("Show all users", false).await.unwrap();
        let ExecutionResult::Single(r) = result else {
            panic!("expected single result");
        };
        assert_eq!(r.model, "res.users");
        assert_eq!(r.fields, vec!["name", "login"]);
        assert_eq!(r.count, 3);

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("res.users"));
        assert!(!requests[0].system.contains("ir.config_parameter"));
    }

    #[tokio::test]
    async fn test_fenced_aggregation() {
        let (engine, _) = engine(answer(
            "Here is the query:\n```json\n{\"aggregation\": true, \"model\": \"account.move\", \
             \"domain\": [], \"group_by\": [\"invoice_date:day\"], \"measures\": [\"__count\"]}\n```",
        ));
        let result = engine
            .process_query("Kuinka monta laskua per päivä?", false)
            .await
            .unwrap();
        let ExecutionResult::Aggregation(r) = result else {
            panic!("expected aggregation result");
        };
        assert_eq!(r.dimension, "invoice_date");
        assert_eq!(r.measure, "count");
        assert!(r.records.iter().any(|row| row["invoice_date"] == "2024-01-15" && row["count"] == 2));
    }

    #[tokio::test]
    async fn test_no_candidates_uses_fallback() {
        let (engine, _) = engine(CompletionReply::Candidates(vec![]));
        let result = engine.process_query("listaa käyttäjät", false).await.unwrap();
        let ExecutionResult::Multi(r) = result else {
            panic!("expected multi result");
        };
        let models: Vec<&str> = r.results.iter().map(|m| m.model.as_str()).collect();
        assert_eq!(models, vec!["res.users", "res.users.log"]);
        assert_eq!(r.total_count, 6);
        assert!(r.results[1].has_linked_data);
        assert_eq!(r.results[1].linked_model.as_deref(), Some("res.users"));
    }

    #[tokio::test]
    async fn test_service_error_surfaces() {
        let (engine, _) = engine(CompletionReply::Error {
            message: "Test error message".into(),
        });
        let err = engine.process_query("Show all users", false).await.unwrap_err();
        assert_eq!(err.kind(), "service");
        assert!(err.to_string().contains("Test error message"));
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_format_error() {
        let (engine, _) = engine(answer("I cannot help with that."));
        let err = engine.process_query("Show all users", false).await.unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (engine, completion) = engine(answer("{}"));
        let err = engine.process_query("   ", false).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(completion.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_elevated_schema_includes_technical_entities() {
        let (engine, _) = engine(answer("{}"));
        assert!(!engine.schema(false).unwrap().contains("ir.config_parameter"));
        assert!(engine.schema(true).unwrap().contains("ir.config_parameter"));

        let first = engine.schema(false).unwrap();
        assert!(Arc::ptr_eq(&first, &engine.schema(false).unwrap()));
        engine.invalidate_schema();
        assert!(!Arc::ptr_eq(&first, &engine.schema(false).unwrap()));
    }
}
