//! Structured-output schemas for the router and synthesizer
//!
//! The oracle is asked to answer in JSON conforming to a schema generated from
//! the wire types below. Its text is untrusted: it is decoded back into the same
//! types and validated before anything reaches `OrchestrationState`.

use crate::orchestrator::types::{Chart, RoutingDecision, SynthesizedDeliverable, Table};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Router response as emitted by the oracle
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RouterOutput {
    /// Capability names to run, in order
    pub selected_agents: Vec<String>,
    /// Why these capabilities were chosen
    pub reason: String,
}

impl From<RouterOutput> for RoutingDecision {
    fn from(output: RouterOutput) -> Self {
        RoutingDecision {
            selected: output.selected_agents,
            reason: output.reason,
        }
    }
}

/// Synthesizer response as emitted by the oracle
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SynthOutput {
    /// Executive narrative
    pub final_summary: String,
    /// Ordered recommendations
    pub recommendations: Vec<String>,
    /// Tables drawn from capability results
    pub tables: Vec<Table>,
    /// Bar charts drawn from capability results
    pub charts: Vec<Chart>,
}

impl SynthOutput {
    /// Check shape constraints the JSON schema cannot express
    pub fn validate(&self) -> Result<(), String> {
        for table in &self.tables {
            if table.columns.is_empty() {
                return Err(format!("table '{}' has no columns", table.title));
            }
            if let Some((idx, row)) = table
                .rows
                .iter()
                .enumerate()
                .find(|(_, row)| row.len() != table.columns.len())
            {
                return Err(format!(
                    "table '{}' row {} has {} cells, expected {}",
                    table.title,
                    idx,
                    row.len(),
                    table.columns.len()
                ));
            }
        }
        for chart in &self.charts {
            if chart.labels.len() != chart.values.len() {
                return Err(format!(
                    "chart '{}' has {} labels but {} values",
                    chart.title,
                    chart.labels.len(),
                    chart.values.len()
                ));
            }
            if chart.values.iter().any(|v| !v.is_finite()) {
                return Err(format!("chart '{}' has a non-finite value", chart.title));
            }
        }
        Ok(())
    }
}

impl From<SynthOutput> for SynthesizedDeliverable {
    fn from(output: SynthOutput) -> Self {
        SynthesizedDeliverable {
            summary: output.final_summary,
            recommendations: output.recommendations,
            tables: output.tables,
            charts: output.charts,
        }
    }
}

/// JSON schema for `T`, as sent to the oracle
pub fn response_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Decode untrusted oracle text into `T`
///
/// Strips surrounding whitespace and one markdown code fence before parsing.
pub fn decode_structured<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}
