//! Natural-language search over a relational object store.
//!
//! A question is translated by a language model into a structured query
//! intent, validated against the live schema and run read-only against a
//! [`store::DataStore`]. When the model produces nothing usable, a
//! heuristic builder derives the intent from the schema alone.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod schema;
pub mod store;

pub use config::SearchConfig;
pub use engine::completion::{CompletionService, OpenRouterClient};
pub use engine::intent::QueryIntent;
pub use engine::result::{ExecutionResult, SearchResponse};
pub use engine::SearchEngine;
pub use error::SearchError;
pub use schema::SchemaDocument;
pub use store::sqlite::SqliteStore;
pub use store::DataStore;
