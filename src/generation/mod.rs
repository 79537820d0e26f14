//! AI content generation for the learning platform.
//!
//! This module owns the seam between billing and content generation:
//!
//! - [`GenerationService`]: the trait your LLM client implements
//! - [`GenerationRequest`] / [`GeneratedArtifact`]: the request/response
//!   types the spend gate meters
//! - [`fallback`]: canned content served free of charge when the upstream
//!   provider fails
//! - [`CachedGenerationService`]: response caching for identical requests
//!
//! # Example
//!
//! ```rust,ignore
//! use lernwerk::generation::{
//!     CachedGenerationService, GenerationCache, GenerationRequest, Language,
//! };
//!
//! let service = CachedGenerationService::new(my_llm_client, GenerationCache::default());
//! let request = GenerationRequest::Quiz {
//!     topic: "fractions".into(),
//!     level: "grade 5".into(),
//!     language: Language::De,
//!     num_questions: 10,
//! };
//! let artifact = service.generate(&request).await?;
//! ```

pub mod cache;
pub mod fallback;
pub mod service;

pub use cache::{CachedGenerationService, GenerationCache};
pub use fallback::fallback_for;
pub use service::{
    GeneratedArtifact, GenerationError, GenerationRequest, GenerationService, Language,
};

#[cfg(any(test, feature = "test-billing"))]
pub use service::test::MockGenerationClient;
