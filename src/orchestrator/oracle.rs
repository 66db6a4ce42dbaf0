//! Generation oracle contract
//!
//! The router, synthesizer and prompt-backed capabilities talk to the model only
//! through this trait, so the HTTP client can be swapped for a scripted fake.

use crate::orchestrator::error::OrchestrationError;
use async_trait::async_trait;
use serde_json::Value;

/// A text-generation backend
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Complete a prompt
    ///
    /// When `response_schema` is given the backend is asked to answer with JSON
    /// conforming to it. The returned text is still untrusted and must be decoded
    /// and validated by the caller.
    ///
    /// # Errors
    /// * Returns `OrchestrationError::Oracle` if the backend produced no usable text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: Option<&Value>,
    ) -> Result<String, OrchestrationError>;
}
