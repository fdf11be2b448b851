use super::completion::{CompletionReply, CompletionRequest, CompletionService};
use super::prompt::{build_system_prompt, build_user_message};
use crate::error::SearchError;
use crate::schema::SchemaDocument;

/// Phrases in a service error meaning the prompt did not fit the model's context.
const CONTEXT_EXCEEDED_MARKERS: &[&str] = &["exceed context limit", "context length", "context window"];

/// Outcome of asking the model to translate a question.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Text of the first candidate.
    Raw(String),
    /// The service answered but produced nothing to parse.
    NoCandidates,
}

/// Send the question and the reduced schema to the completion service.
pub async fn translate(
    service: &dyn CompletionService,
    schema: &SchemaDocument,
    query: &str,
    max_tokens: u32,
) -> Result<Translation, SearchError> {
    let request = CompletionRequest {
        system: build_system_prompt(schema),
        user: build_user_message(query),
        max_tokens,
    };
    tracing::debug!(
        entities = schema.len(),
        prompt_len = request.system.len(),
        "Translating query"
    );

    match service.complete(&request).await? {
        CompletionReply::Candidates(candidates) => Ok(candidates
            .into_iter()
            .next()
            .map(Translation::Raw)
            .unwrap_or(Translation::NoCandidates)),
        CompletionReply::Error { message } => Err(classify_service_error(message)),
    }
}

fn classify_service_error(message: String) -> SearchError {
    let lower = message.to_lowercase();
    if CONTEXT_EXCEEDED_MARKERS.iter().any(|m| lower.contains(m)) {
        SearchError::ContextExceeded(message)
    } else {
        SearchError::Service(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<CompletionReply, SearchError>,
        seen: Mutex<Option<CompletionRequest>>,
    }

    impl Scripted {
        fn new(reply: Result<CompletionReply, SearchError>) -> Self {
            Self { reply, seen: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, SearchError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(SearchError::Transport(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let svc = Scripted::new(Ok(CompletionReply::Candidates(vec!["a".into(), "b".into()])));
        let t = translate(&svc, &SchemaDocument::new(), "Show all users", 4000).await.unwrap();
        assert_eq!(t, Translation::Raw("a".into()));

        let seen = svc.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.max_tokens, 4000);
        assert!(seen.user.ends_with("Show all users"));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let svc = Scripted::new(Ok(CompletionReply::Candidates(vec![])));
        let t = translate(&svc, &SchemaDocument::new(), "listaa käyttäjät", 4000).await.unwrap();
        assert_eq!(t, Translation::NoCandidates);
    }

    #[tokio::test]
    async fn test_error_field_classification() {
        let svc = Scripted::new(Ok(CompletionReply::Error {
            message: "Test error message from the provider".into(),
        }));
        let err = translate(&svc, &SchemaDocument::new(), "q", 4000).await.unwrap_err();
        assert_eq!(err.kind(), "service");
        assert!(err.to_string().contains("Test error message"));

        let svc = Scripted::new(Ok(CompletionReply::Error {
            message: "This request would exceed context limit of 200000 tokens".into(),
        }));
        let err = translate(&svc, &SchemaDocument::new(), "q", 4000).await.unwrap_err();
        assert_eq!(err.kind(), "context_exceeded");
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let svc = Scripted::new(Err(SearchError::Transport("connection refused".into())));
        let err = translate(&svc, &SchemaDocument::new(), "q", 4000).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
