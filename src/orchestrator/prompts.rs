//! Prompt templates for the router, synthesizer and prompt-backed capabilities

use crate::orchestrator::capability::CapabilityId;
use crate::orchestrator::types::CapabilityResults;

/// System prompt for the router
///
/// The capability list is generated from `CapabilityId::ALL`, so it always
/// matches the registry vocabulary.
pub fn router_system_prompt() -> String {
    let catalog = CapabilityId::ALL
        .iter()
        .enumerate()
        .map(|(idx, id)| format!("{}. \"{}\": {}", idx + 1, id.name(), id.responsibility()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are the master research agent for a pharmaceutical strategy team. Your job is to decide which specialist agents must run to answer the user's QUERY.

Available Agents:
{catalog}

Output Format (JSON):
{{
  "selected_agents": ["<agent name>", "..."],
  "reason": "<one or two sentences explaining the selection>"
}}

Rules:
- Use agent names EXACTLY as written above, including capitalisation.
- List agents in the order they should run; the order is preserved.
- Select only agents whose data is needed. Do not repeat an agent.
- If no agent is relevant, return an empty "selected_agents" array and explain why in "reason".
- Return ONLY valid JSON, no other text."#
    )
}

/// User prompt for the router
pub fn router_user_prompt(query: &str) -> String {
    format!("QUERY: \"{}\"", query)
}

/// System prompt for the synthesizer
pub fn synthesizer_system_prompt() -> String {
    r#"You are the synthesis agent. You receive the user's query and the raw outputs of the specialist agents that ran for it.

Merge them into one structured deliverable:
- "final_summary": an executive summary answering the query.
- "recommendations": concrete, ordered next steps.
- "tables": tabular findings. Every row MUST have exactly as many cells as "columns". All cells are strings. Name the source agent in each table title.
- "charts": bar charts with one numeric value per label.

Rules:
- Use ONLY the agent outputs supplied. Do not invent figures.
- Some agents may have failed (they carry an "error" field). Mention the gap in the summary instead of guessing their data.
- Return empty arrays when there is nothing to show.
- Return ONLY valid JSON, no other text."#
        .to_string()
}

/// User prompt for the synthesizer, carrying the serialized results
pub fn synthesizer_user_prompt(query: &str, results: &CapabilityResults) -> String {
    let serialized =
        serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string());
    format!("User query:\n{}\n\nAgent outputs:\n{}", query, serialized)
}

/// System prompt for a prompt-backed capability
pub fn capability_system_prompt(id: CapabilityId) -> String {
    format!(
        r#"You are the {name}.

Scope: {scope}

Answer the user's query strictly within this scope. Respond with a single JSON object containing:
- "summary": a short analysis,
- "data": an array of records with the figures you rely on,
- "sources": where the figures come from.
If you have no reliable data, return an empty "data" array and say so in "summary".
Return ONLY valid JSON, no other text."#,
        name = id.name(),
        scope = id.responsibility()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::CapabilityResult;
    use serde_json::json;

    #[test]
    fn test_router_prompt_lists_every_capability() {
        let prompt = router_system_prompt();
        for id in CapabilityId::ALL {
            assert!(prompt.contains(&format!("\"{}\"", id.name())));
        }
    }

    #[test]
    fn test_synthesizer_prompt_contains_results() {
        let mut results = CapabilityResults::default();
        results.insert(CapabilityResult::success(
            "Patent Landscape Agent",
            json!({"active_patents": 4}),
        ));

        let prompt = synthesizer_user_prompt("patents for X", &results);
        assert!(prompt.contains("patents for X"));
        assert!(prompt.contains("Patent Landscape Agent"));
        assert!(prompt.contains("active_patents"));
    }
}
