use serde::Serialize;

/// Crate-wide error type. Every fallible function returns `Result<T, SearchError>`.
/// Serializes cleanly so callers can hand it straight back as a response body.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error connecting to AI service: {0}")]
    Transport(String),

    #[error("AI service error: {0}")]
    Service(String),

    #[error(
        "The search query is too complex for the AI model. Please try a simpler query \
         or configure a model with a larger context window. ({0})"
    )]
    ContextExceeded(String),

    #[error("AI response is not in the expected JSON format. Please try again.")]
    Format,

    #[error("{0}")]
    Validation(String),

    #[error("No data available: {0}")]
    EmptyResult(String),

    #[error("Error executing query: {0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SearchError {
    /// Machine-readable kind, also used as the `kind` field when serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Configuration(_) => "configuration",
            SearchError::Transport(_) => "transport",
            SearchError::Service(_) => "service",
            SearchError::ContextExceeded(_) => "context_exceeded",
            SearchError::Format => "format",
            SearchError::Validation(_) => "validation",
            SearchError::EmptyResult(_) => "empty_result",
            SearchError::Execution(_) => "execution",
            SearchError::Database(_) => "database",
            SearchError::Pool(_) => "pool",
            SearchError::Io(_) => "io",
            SearchError::Serde(_) => "serde",
            SearchError::ConfigParse(_) => "config_parse",
        }
    }

    /// Only transport failures are worth re-invoking the pipeline for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Transport(_))
    }
}

/// Serialized as `{ error: "...", kind: "..." }`.
impl Serialize for SearchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SearchError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_error_and_kind() {
        let err = SearchError::Validation("Invalid model: foo.bar".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "Invalid model: foo.bar");
        assert_eq!(json["kind"], "validation");
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(SearchError::Transport("connection reset".into()).is_retryable());
        assert!(!SearchError::Service("bad request".into()).is_retryable());
        assert!(!SearchError::Format.is_retryable());
    }

    #[test]
    fn test_context_exceeded_message_suggests_simpler_query() {
        let err = SearchError::ContextExceeded("prompt is 210000 tokens".into());
        assert!(err.to_string().contains("simpler query"));
    }
}
