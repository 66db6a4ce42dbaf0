//! Router stage
//!
//! Classifies a request into an ordered subset of capabilities with a single
//! schema-constrained oracle call. Any oracle or decoding failure is fatal to
//! the run.

use crate::orchestrator::capability::CapabilityId;
use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use crate::orchestrator::prompts::{router_system_prompt, router_user_prompt};
use crate::orchestrator::schema::{decode_structured, response_schema, RouterOutput};
use crate::orchestrator::types::RoutingDecision;
use crate::orchestrator::utils::hash_query;
use serde_json::Value;
use std::sync::Arc;

/// Selects capabilities for a request
#[derive(Clone)]
pub struct Router {
    oracle: Arc<dyn Oracle>,
    system_prompt: String,
    schema: Value,
}

impl Router {
    /// Create a router backed by `oracle`
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            system_prompt: router_system_prompt(),
            schema: response_schema::<RouterOutput>(),
        }
    }

    /// Produce a routing decision for `query`
    ///
    /// Names outside the vocabulary are kept in the decision and reported by the
    /// dispatcher as per-capability failures.
    ///
    /// # Errors
    /// * `OrchestrationError::Oracle` if the oracle call fails
    /// * `OrchestrationError::RoutingParse` if the response does not match the schema
    pub async fn route(&self, query: &str) -> Result<RoutingDecision, OrchestrationError> {
        let query_hash = hash_query(query);
        tracing::debug!(query_hash = %query_hash, "Routing request");

        let raw = self
            .oracle
            .complete(
                &self.system_prompt,
                &router_user_prompt(query),
                Some(&self.schema),
            )
            .await?;

        let output: RouterOutput = decode_structured(&raw).map_err(|e| {
            tracing::error!(
                query_hash = %query_hash,
                error = %e,
                response_len = raw.len(),
                "Router response failed schema validation"
            );
            OrchestrationError::RoutingParse(format!("{} - Response: {}", e, raw))
        })?;

        for name in &output.selected_agents {
            if name.parse::<CapabilityId>().is_err() {
                tracing::warn!(
                    query_hash = %query_hash,
                    capability = %name,
                    "Router selected a capability outside the vocabulary"
                );
            }
        }

        tracing::info!(
            query_hash = %query_hash,
            selected = ?output.selected_agents,
            "Router selected capabilities"
        );

        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::ScriptedOracle;

    #[tokio::test]
    async fn test_route_preserves_order() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(r#"{
                "selected_agents": ["Patent Landscape Agent", "IQVIA Insights Agent"],
                "reason": "patents first"
            }"#
        .to_string())]));
        let router = Router::new(oracle.clone());

        let decision = router.route("patents and market").await.unwrap();
        assert_eq!(
            decision.selected,
            vec!["Patent Landscape Agent", "IQVIA Insights Agent"]
        );
        assert_eq!(decision.reason, "patents first");

        let calls = oracle.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].schema.is_some());
        assert!(calls[0].user_prompt.contains("patents and market"));
    }

    #[tokio::test]
    async fn test_route_empty_selection_is_legal() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"selected_agents": [], "reason": "small talk"}"#.to_string(),
        )]));
        let decision = Router::new(oracle).route("hello").await.unwrap();
        assert!(decision.selected.is_empty());
    }

    #[tokio::test]
    async fn test_route_rejects_invalid_json() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok("I think IQVIA".to_string())]));
        let err = Router::new(oracle).route("market").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RoutingParse(_)));
    }

    #[tokio::test]
    async fn test_route_rejects_missing_reason() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"selected_agents": ["IQVIA Insights Agent"]}"#.to_string(),
        )]));
        let err = Router::new(oracle).route("market").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RoutingParse(_)));
    }

    #[tokio::test]
    async fn test_route_keeps_unknown_names() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"selected_agents": ["Stock Agent"], "reason": "x"}"#.to_string(),
        )]));
        let decision = Router::new(oracle).route("stocks").await.unwrap();
        assert_eq!(decision.selected, vec!["Stock Agent"]);
    }

    #[tokio::test]
    async fn test_route_propagates_oracle_failure() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OrchestrationError::Oracle(
            "HTTP 500".to_string(),
        ))]));
        let err = Router::new(oracle).route("market").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Oracle(_)));
    }
}
