//! Orchestrator module
//!
//! The request pipeline: a router picks capabilities, the dispatcher runs
//! them, the synthesizer merges their results into one deliverable and an
//! optional renderer turns that into a report artifact.

pub mod api_client;
pub mod capability;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod gemini_types;
pub mod oracle;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod renderer;
pub mod router;
pub mod schema;
pub mod synthesizer;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{Capability, CapabilityId};
pub use error::OrchestrationError;
pub use oracle::Oracle;
pub use pipeline::{Pipeline, PipelineEvent};
pub use registry::CapabilityRegistry;
pub use renderer::Renderer;
pub use types::{OrchestrationState, PipelineStage};
