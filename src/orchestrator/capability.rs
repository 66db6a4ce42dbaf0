//! Capability vocabulary and invocation contract
//!
//! `CapabilityId` is the closed set of task handlers the router may choose from.
//! Its display name is the wire name used in router prompts and responses, so the
//! vocabulary the router sees and the registry's keys come from one place.

use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use crate::orchestrator::prompts::capability_system_prompt;
use crate::orchestrator::schema::decode_structured;
use crate::orchestrator::types::OrchestrationState;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Identifier of a capability in the fixed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CapabilityId {
    /// Market size, sales and competitor data
    IqviaInsights,
    /// Patent landscape and expiry timelines
    PatentLandscape,
    /// Clinical trial pipeline data
    ClinicalTrials,
    /// Internal strategy documents
    InternalKnowledge,
    /// Live web intelligence
    WebIntelligence,
    /// Export/import trade statistics
    EximTrends,
}

impl CapabilityId {
    /// Every capability, in prompt order
    pub const ALL: [CapabilityId; 6] = [
        CapabilityId::IqviaInsights,
        CapabilityId::PatentLandscape,
        CapabilityId::ClinicalTrials,
        CapabilityId::InternalKnowledge,
        CapabilityId::WebIntelligence,
        CapabilityId::EximTrends,
    ];

    /// Wire name used by the router
    pub fn name(self) -> &'static str {
        match self {
            CapabilityId::IqviaInsights => "IQVIA Insights Agent",
            CapabilityId::PatentLandscape => "Patent Landscape Agent",
            CapabilityId::ClinicalTrials => "Clinical Trials Agent",
            CapabilityId::InternalKnowledge => "Internal Knowledge Agent",
            CapabilityId::WebIntelligence => "Web Intelligence Agent",
            CapabilityId::EximTrends => "EXIM Trends Agent",
        }
    }

    /// One-line responsibility shown to the router
    pub fn responsibility(self) -> &'static str {
        match self {
            CapabilityId::IqviaInsights => {
                "Market size, sales value and volume, CAGR and competitors by region for a molecule or therapy area."
            }
            CapabilityId::PatentLandscape => {
                "Active and expired patents, assignees, filing and expiry timelines, freedom-to-operate signals."
            }
            CapabilityId::ClinicalTrials => {
                "Ongoing and completed clinical trials, sponsors, phase distribution and enrollment."
            }
            CapabilityId::InternalKnowledge => {
                "Internal strategy documents, prior briefings and field reports held by the company."
            }
            CapabilityId::WebIntelligence => {
                "Live web search for recent news, treatment guidelines, publications and regulatory updates."
            }
            CapabilityId::EximTrends => {
                "Export/import trade volumes for APIs and formulations, sourcing countries and import dependency."
            }
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CapabilityId {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        CapabilityId::ALL
            .into_iter()
            .find(|id| id.name() == needle)
            .ok_or_else(|| OrchestrationError::UnknownCapability(s.to_string()))
    }
}

/// A task handler invoked by the dispatcher
///
/// Implementations bound their own upstream calls; the dispatcher imposes no
/// timeout. Errors are recorded against the capability and never abort the run.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Run the capability for a request and return its structured payload
    async fn invoke(&self, query: &str, state: &OrchestrationState) -> anyhow::Result<Value>;
}

/// Prompt-backed capability that asks the oracle for a scoped JSON analysis
///
/// Registered for every vocabulary entry when no dedicated handler exists.
pub struct OracleCapability {
    id: CapabilityId,
    oracle: Arc<dyn Oracle>,
}

impl OracleCapability {
    /// Create a prompt-backed handler for `id`
    pub fn new(id: CapabilityId, oracle: Arc<dyn Oracle>) -> Self {
        Self { id, oracle }
    }
}

#[async_trait]
impl Capability for OracleCapability {
    async fn invoke(&self, query: &str, _state: &OrchestrationState) -> anyhow::Result<Value> {
        let system_prompt = capability_system_prompt(self.id);
        let text = self.oracle.complete(&system_prompt, query, None).await?;

        // Fall back to plain text when the model ignores the JSON instruction
        Ok(decode_structured::<Value>(&text).unwrap_or(Value::String(text)))
    }
}
