//! Orchestration-specific error types
//!
//! Errors raised while routing, dispatching, synthesizing and rendering a request.
//! Routing and synthesis errors are terminal for a run; capability errors are
//! recorded per capability and never abort the pipeline.

use crate::orchestrator::types::PipelineStage;
use thiserror::Error;

/// Errors that can occur while orchestrating a single request
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// The generation oracle could not produce a response
    #[error("Oracle call failed: {0}")]
    Oracle(String),

    /// Router output did not match the routing schema
    #[error("Routing response failed schema validation: {0}")]
    RoutingParse(String),

    /// A selected capability name is not part of the vocabulary
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// The capability is in the vocabulary but no handler was registered for it
    #[error("Capability not registered: {0}")]
    CapabilityNotRegistered(String),

    /// A single capability invocation failed
    #[error("Capability '{capability}' failed: {message}")]
    CapabilityInvocation {
        /// Wire name of the failing capability
        capability: String,
        /// Failure description
        message: String,
    },

    /// Synthesizer output did not match the deliverable schema
    #[error("Synthesis response failed schema validation: {0}")]
    SynthesisParse(String),

    /// Artifact generation failed
    #[error("Report rendering failed: {0}")]
    Render(String),

    /// Every selected capability failed and the pipeline is configured to escalate
    #[error("All {0} selected capabilities failed")]
    AllCapabilitiesFailed(usize),

    /// A stage tried to run out of order
    #[error("Invalid pipeline transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Stage the state was in
        from: PipelineStage,
        /// Stage that was requested
        to: PipelineStage,
    },
}
