//! Orchestration data model
//!
//! Types that flow through the pipeline: the routing decision, per-capability
//! results, the synthesized deliverable and the per-request `OrchestrationState`
//! that threads through every stage.

use crate::orchestrator::error::OrchestrationError;
use schemars::JsonSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Position of a request in the pipeline state machine
///
/// `Start → Routed → Dispatched → Synthesized → [Reported]`, with `Failed`
/// reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Nothing has run yet
    Start,
    /// Router produced a decision
    Routed,
    /// Every selected capability has been attempted
    Dispatched,
    /// Deliverable produced
    Synthesized,
    /// Artifact rendered
    Reported,
    /// A fatal error ended the run
    Failed,
}

impl PipelineStage {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Reported | PipelineStage::Failed)
    }
}

/// Router output: which capabilities to run, in order, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Capability wire names in execution order
    pub selected: Vec<String>,
    /// Free-text rationale from the router
    pub reason: String,
}

/// Outcome of one capability invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityResult {
    /// Capability wire name
    pub agent: String,
    /// Opaque structured payload (`null` on failure)
    pub output: Value,
    /// Failure description, if the invocation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityResult {
    /// Successful result carrying the capability payload
    pub fn success(agent: impl Into<String>, output: Value) -> Self {
        Self {
            agent: agent.into(),
            output,
            error: None,
        }
    }

    /// Error-shaped result recorded in place of a payload
    pub fn failure(agent: impl Into<String>, error: &OrchestrationError) -> Self {
        Self {
            agent: agent.into(),
            output: Value::Null,
            error: Some(error.to_string()),
        }
    }

    /// Whether the invocation succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Capability results keyed by capability name, in execution order
///
/// Each name is written at most once. Serializes as a JSON object whose key
/// order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityResults {
    entries: Vec<CapabilityResult>,
}

impl CapabilityResults {
    /// Insert a result; returns false if a result for that name already exists
    pub fn insert(&mut self, result: CapabilityResult) -> bool {
        if self.get(&result.agent).is_some() {
            return false;
        }
        self.entries.push(result);
        true
    }

    /// Look up a result by capability name
    pub fn get(&self, agent: &str) -> Option<&CapabilityResult> {
        self.entries.iter().find(|r| r.agent == agent)
    }

    /// Capability names in execution order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|r| r.agent.as_str())
    }

    /// Results in execution order
    pub fn iter(&self) -> std::slice::Iter<'_, CapabilityResult> {
        self.entries.iter()
    }

    /// Number of recorded results
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no results were recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when at least one result exists and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|r| !r.is_success())
    }
}

impl Serialize for CapabilityResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for result in &self.entries {
            map.serialize_entry(&result.agent, result)?;
        }
        map.end()
    }
}

/// A titled table in the deliverable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Table {
    /// Table caption
    pub title: String,
    /// Column headers
    pub columns: Vec<String>,
    /// Body rows; each row has one cell per column
    pub rows: Vec<Vec<String>>,
}

/// A titled bar chart in the deliverable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Chart {
    /// Chart caption
    pub title: String,
    /// Category labels
    pub labels: Vec<String>,
    /// One value per label
    pub values: Vec<f64>,
}

/// The unified, validated answer to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedDeliverable {
    /// Executive narrative
    pub summary: String,
    /// Ordered recommendations
    pub recommendations: Vec<String>,
    /// Tables merged from capability results
    pub tables: Vec<Table>,
    /// Charts merged from capability results
    pub charts: Vec<Chart>,
}

/// Reference to a rendered artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Filesystem path of the artifact
    pub path: String,
    /// URL path the artifact is served under
    pub url: String,
    /// Number of pages in the artifact
    pub pages: usize,
}

/// Per-request mutable record threaded through every pipeline stage
///
/// Owned by exactly one in-flight request. Transitions only move forward;
/// an out-of-order call returns `OrchestrationError::InvalidTransition`.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationState {
    stage: PipelineStage,
    selected_agents: Vec<String>,
    routing_reason: String,
    results: CapabilityResults,
    synthesized: Option<SynthesizedDeliverable>,
    report_ref: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_error: Option<String>,
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationState {
    /// Fresh state at `Start`
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Start,
            selected_agents: Vec::new(),
            routing_reason: String::new(),
            results: CapabilityResults::default(),
            synthesized: None,
            report_ref: None,
            report_error: None,
        }
    }

    /// Current stage
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Capability names chosen by the router, in order
    pub fn selected_agents(&self) -> &[String] {
        &self.selected_agents
    }

    /// Router rationale
    pub fn routing_reason(&self) -> &str {
        &self.routing_reason
    }

    /// Results recorded so far
    pub fn results(&self) -> &CapabilityResults {
        &self.results
    }

    /// Synthesized deliverable, once available
    pub fn synthesized(&self) -> Option<&SynthesizedDeliverable> {
        self.synthesized.as_ref()
    }

    /// Rendered artifact, once available
    pub fn report_ref(&self) -> Option<&ArtifactRef> {
        self.report_ref.as_ref()
    }

    /// Why rendering failed, if it did
    pub fn report_error(&self) -> Option<&str> {
        self.report_error.as_deref()
    }

    fn advance(&mut self, from: PipelineStage, to: PipelineStage) -> Result<(), OrchestrationError> {
        if self.stage != from {
            return Err(OrchestrationError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// `Start → Routed`
    pub fn apply_routing(&mut self, decision: RoutingDecision) -> Result<(), OrchestrationError> {
        self.advance(PipelineStage::Start, PipelineStage::Routed)?;
        self.selected_agents = decision.selected;
        self.routing_reason = decision.reason;
        Ok(())
    }

    /// Store one capability result while dispatch is in progress
    ///
    /// Returns `Ok(false)` if a result for that name was already stored.
    pub fn record_result(&mut self, result: CapabilityResult) -> Result<bool, OrchestrationError> {
        if self.stage != PipelineStage::Routed {
            return Err(OrchestrationError::InvalidTransition {
                from: self.stage,
                to: PipelineStage::Dispatched,
            });
        }
        Ok(self.results.insert(result))
    }

    /// `Routed → Dispatched`
    pub fn mark_dispatched(&mut self) -> Result<(), OrchestrationError> {
        self.advance(PipelineStage::Routed, PipelineStage::Dispatched)
    }

    /// `Dispatched → Synthesized`
    pub fn apply_synthesis(
        &mut self,
        deliverable: SynthesizedDeliverable,
    ) -> Result<(), OrchestrationError> {
        self.advance(PipelineStage::Dispatched, PipelineStage::Synthesized)?;
        self.synthesized = Some(deliverable);
        Ok(())
    }

    /// `Synthesized → Reported`
    pub fn attach_report(&mut self, artifact: ArtifactRef) -> Result<(), OrchestrationError> {
        self.advance(PipelineStage::Synthesized, PipelineStage::Reported)?;
        self.report_ref = Some(artifact);
        Ok(())
    }

    /// Record a render failure; the state stays `Synthesized`
    pub fn record_report_error(&mut self, message: String) -> Result<(), OrchestrationError> {
        if self.stage != PipelineStage::Synthesized {
            return Err(OrchestrationError::InvalidTransition {
                from: self.stage,
                to: PipelineStage::Reported,
            });
        }
        self.report_error = Some(message);
        Ok(())
    }

    /// Move to `Failed` from any non-terminal stage
    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = PipelineStage::Failed;
        }
    }
}
