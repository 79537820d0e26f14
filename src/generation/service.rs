//! The generation collaborator seam.
//!
//! The billing core never talks to an AI provider directly; it goes
//! through the [`GenerationService`] trait. Implement it over your LLM
//! client of choice, or use [`test::MockGenerationClient`] in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::TransactionKind;

/// Supported content languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    En,
    /// German
    De,
    /// French
    Fr,
    /// Italian
    It,
}

impl Language {
    /// Parse an ISO 639-1 code. Unknown codes are rejected so callers can
    /// fall back to their own default explicitly.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Self::En),
            "de" => Some(Self::De),
            "fr" => Some(Self::Fr),
            "it" => Some(Self::It),
            _ => None,
        }
    }

    /// The ISO 639-1 code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
            Self::Fr => "fr",
            Self::It => "it",
        }
    }

    /// English name of the language, for prompt construction.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::De => "German",
            Self::Fr => "French",
            Self::It => "Italian",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A request for generated content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationRequest {
    /// A letter from a teacher to a student's parents.
    ParentLetter {
        /// Free-form context about the student and occasion.
        student_context: String,
        /// Requested tone, e.g. "formal" or "friendly".
        tone: String,
        /// Output language.
        language: Language,
    },
    /// A quiz on a topic.
    Quiz {
        topic: String,
        /// School level, e.g. "grade 5".
        level: String,
        language: Language,
        num_questions: u8,
    },
    /// A conversational reply in the assistant chat.
    ChatReply {
        message: String,
        /// Role of the user asking, e.g. "teacher" or "student".
        user_role: String,
        language: Language,
    },
}

impl GenerationRequest {
    /// Short operation name, used in logs and error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParentLetter { .. } => "parent_letter",
            Self::Quiz { .. } => "quiz_generation",
            Self::ChatReply { .. } => "chat_reply",
        }
    }

    /// The ledger kind a successful charge for this request uses.
    ///
    /// `None` means the operation is not metered and must not pass
    /// through the spend gate (chat is free).
    #[must_use]
    pub fn transaction_kind(&self) -> Option<TransactionKind> {
        match self {
            Self::ParentLetter { .. } => Some(TransactionKind::ParentLetter),
            Self::Quiz { .. } => Some(TransactionKind::QuizGeneration),
            Self::ChatReply { .. } => None,
        }
    }

    /// Whether a canned fallback exists when the upstream provider fails.
    ///
    /// Quizzes have no useful static fallback; a template quiz would be
    /// worse than an honest error.
    #[must_use]
    pub fn supports_fallback(&self) -> bool {
        matches!(self, Self::ParentLetter { .. } | Self::ChatReply { .. })
    }

    /// Output language of the request.
    #[must_use]
    pub fn language(&self) -> Language {
        match self {
            Self::ParentLetter { language, .. }
            | Self::Quiz { language, .. }
            | Self::ChatReply { language, .. } => *language,
        }
    }
}

/// A piece of generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Artifact ID. Debits reference this id in the ledger.
    pub id: Uuid,
    /// Operation that produced the artifact (matches
    /// [`GenerationRequest::kind`]).
    pub kind: String,
    /// Short title for display.
    pub title: String,
    /// The generated text.
    pub content: String,
    /// Language of the content.
    pub language: Language,
}

impl GeneratedArtifact {
    /// Create a new artifact with a fresh id.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        language: Language,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            language,
        }
    }
}

/// Errors from a generation collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// The upstream provider returned an error or unusable response.
    #[error("Upstream generation failed: {0}")]
    Upstream(String),

    /// The request itself is malformed (empty prompt, zero questions).
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    /// The provider did not answer within the deadline.
    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),
}

/// Trait for generation collaborators.
///
/// Implementations should be cheap to clone (wrap state in `Arc`).
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate content for a request.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GeneratedArtifact, GenerationError>;
}

/// Mock generation client for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Mock generation client for testing.
    ///
    /// Succeeds with a deterministic artifact by default; can be switched
    /// to fail to exercise fallback paths.
    #[derive(Clone, Default)]
    pub struct MockGenerationClient {
        inner: Arc<MockInner>,
    }

    #[derive(Default)]
    struct MockInner {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockGenerationClient {
        /// Create a new mock that always succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock that always fails.
        #[must_use]
        pub fn failing() -> Self {
            let client = Self::default();
            client.inner.fail.store(true, Ordering::SeqCst);
            client
        }

        /// Make subsequent calls fail (or succeed again).
        pub fn set_failing(&self, fail: bool) {
            self.inner.fail.store(fail, Ordering::SeqCst);
        }

        /// Number of generate calls made so far.
        pub fn call_count(&self) -> usize {
            self.inner.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationService for MockGenerationClient {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<GeneratedArtifact, GenerationError> {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);

            if self.inner.fail.load(Ordering::SeqCst) {
                return Err(GenerationError::Upstream(
                    "mock upstream failure".to_string(),
                ));
            }

            let title = match request {
                GenerationRequest::ParentLetter { tone, .. } => {
                    format!("Parent letter ({tone})")
                }
                GenerationRequest::Quiz { topic, .. } => format!("Quiz: {topic}"),
                GenerationRequest::ChatReply { .. } => "Chat reply".to_string(),
            };

            Ok(GeneratedArtifact::new(
                request.kind(),
                title,
                format!("mock {} content", request.kind()),
                request.language(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("de"), Some(Language::De));
        assert_eq!(Language::from_code("pt"), None);
        assert_eq!(Language::Fr.code(), "fr");
        assert_eq!(Language::It.name(), "Italian");
    }

    #[test]
    fn test_request_metering() {
        let letter = GenerationRequest::ParentLetter {
            student_context: "Anna, grade 4".to_string(),
            tone: "friendly".to_string(),
            language: Language::De,
        };
        assert_eq!(
            letter.transaction_kind(),
            Some(TransactionKind::ParentLetter)
        );
        assert!(letter.supports_fallback());

        let quiz = GenerationRequest::Quiz {
            topic: "fractions".to_string(),
            level: "grade 5".to_string(),
            language: Language::En,
            num_questions: 10,
        };
        assert_eq!(quiz.transaction_kind(), Some(TransactionKind::QuizGeneration));
        assert!(!quiz.supports_fallback());

        let chat = GenerationRequest::ChatReply {
            message: "How do I reset a password?".to_string(),
            user_role: "teacher".to_string(),
            language: Language::En,
        };
        assert_eq!(chat.transaction_kind(), None);
        assert!(chat.supports_fallback());
    }

    #[tokio::test]
    async fn test_mock_client() {
        use test::MockGenerationClient;

        let client = MockGenerationClient::new();
        let request = GenerationRequest::Quiz {
            topic: "geometry".to_string(),
            level: "grade 6".to_string(),
            language: Language::En,
            num_questions: 5,
        };

        let artifact = client.generate(&request).await.unwrap();
        assert_eq!(artifact.kind, "quiz_generation");
        assert_eq!(client.call_count(), 1);

        client.set_failing(true);
        assert!(client.generate(&request).await.is_err());
        assert_eq!(client.call_count(), 2);
    }
}
