//! Renderer contract
//!
//! Turns a synthesized deliverable into a durable artifact. The shipped
//! implementation lives in `services::report`.

use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::types::{ArtifactRef, SynthesizedDeliverable};
use async_trait::async_trait;

/// Produces a paginated artifact from a deliverable
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `deliverable` for the request `query`
    ///
    /// # Errors
    /// * `OrchestrationError::Render` if the artifact cannot be produced. This is
    ///   fatal only to the reporting step.
    async fn render(
        &self,
        deliverable: &SynthesizedDeliverable,
        query: &str,
    ) -> Result<ArtifactRef, OrchestrationError>;
}
