//! Synthesizer stage
//!
//! Merges every capability result (successes and failures) into one
//! schema-validated deliverable with a single oracle call. The oracle only sees
//! the supplied results; no capability is invoked from here.

use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use crate::orchestrator::prompts::{synthesizer_system_prompt, synthesizer_user_prompt};
use crate::orchestrator::schema::{decode_structured, response_schema, SynthOutput};
use crate::orchestrator::types::{CapabilityResults, SynthesizedDeliverable};
use serde_json::Value;
use std::sync::Arc;

/// Produces the final deliverable from capability results
#[derive(Clone)]
pub struct Synthesizer {
    oracle: Arc<dyn Oracle>,
    system_prompt: String,
    schema: Value,
}

impl Synthesizer {
    /// Create a synthesizer backed by `oracle`
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            system_prompt: synthesizer_system_prompt(),
            schema: response_schema::<SynthOutput>(),
        }
    }

    /// Synthesize a deliverable for `query` from `results`
    ///
    /// # Errors
    /// * `OrchestrationError::Oracle` if the oracle call fails
    /// * `OrchestrationError::SynthesisParse` if the response does not match the
    ///   schema or breaks table/chart shape rules
    pub async fn synthesize(
        &self,
        query: &str,
        results: &CapabilityResults,
    ) -> Result<SynthesizedDeliverable, OrchestrationError> {
        tracing::debug!(results = results.len(), "Synthesizing deliverable");

        let raw = self
            .oracle
            .complete(
                &self.system_prompt,
                &synthesizer_user_prompt(query, results),
                Some(&self.schema),
            )
            .await?;

        let output: SynthOutput = decode_structured(&raw).map_err(|e| {
            tracing::error!(error = %e, response_len = raw.len(), "Synthesis response failed schema validation");
            OrchestrationError::SynthesisParse(format!("{} - Response: {}", e, raw))
        })?;
        output
            .validate()
            .map_err(OrchestrationError::SynthesisParse)?;

        tracing::info!(
            tables = output.tables.len(),
            charts = output.charts.len(),
            recommendations = output.recommendations.len(),
            "Synthesized deliverable"
        );

        Ok(output.into())
    }
}
