//! Orchestrator API handlers
//!
//! HTTP surface of the research pipeline. `/api/chat` streams progress events
//! over SSE while the pipeline runs; `/api/orchestrate` waits and returns the
//! final `OrchestrationState` as JSON.
//!
//! Each request clones the pipeline out of shared state and owns a fresh
//! `OrchestrationState`. When a client disconnects axum drops the response
//! stream, which cancels the in-flight stage.

use crate::api::utils::{format_sse_stream, validate_query};
use crate::error::AppError;
use crate::orchestrator::capability::CapabilityId;
use crate::orchestrator::config::{
    validate_and_apply_config_update, ConfigUpdateRequest, OrchestratorConfig,
};
use crate::orchestrator::constants::SSE_DONE_SIGNAL;
use crate::orchestrator::types::OrchestrationState;
use crate::orchestrator::utils::hash_query;
use crate::services::files::{FileService, ReportFile};
use crate::state::SharedState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Orchestration request
#[derive(Deserialize, Debug)]
pub struct OrchestrationRequest {
    /// Free-text research question
    pub query: String,
    /// Force (or suppress) report rendering; unset renders when the query
    /// contains the report keyword or its plural as a whole word
    #[serde(default)]
    pub render: Option<bool>,
}

/// One entry of the capability vocabulary
#[derive(Debug, Serialize)]
pub struct CapabilityInfo {
    /// Wire name the router selects by
    pub name: &'static str,
    /// What the capability researches
    pub responsibility: &'static str,
    /// Whether a handler is registered for it
    pub registered: bool,
}

/// POST /api/chat - Run the pipeline and stream progress via SSE
///
/// # Flow
/// 1. Validate the query against the configured length limit
/// 2. Emit one `data: <PipelineEvent>` frame per stage and per capability
/// 3. Finish with `data: [DONE]`
///
/// # Returns
/// * `Ok(Response)` - SSE stream; pipeline failures arrive as `error` events
/// * `Err(AppError)` - If the query is invalid
pub async fn chat(
    State(state): State<SharedState>,
    Json(request): Json<OrchestrationRequest>,
) -> Result<Response, AppError> {
    let pipeline = state.read().await.pipeline().clone();
    validate_query(&request.query, pipeline.config().max_query_length)?;

    tracing::info!(
        query_hash = %hash_query(&request.query),
        render = ?request.render,
        "Chat request accepted"
    );

    let events = pipeline
        .run_streaming(request.query, request.render)
        .map(|event| serde_json::to_string(&event))
        .chain(stream::once(async {
            Ok::<_, serde_json::Error>(SSE_DONE_SIGNAL.to_string())
        }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(format_sse_stream(events)))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}

/// POST /api/orchestrate - Run the pipeline and return the final state
pub async fn orchestrate(
    State(state): State<SharedState>,
    Json(request): Json<OrchestrationRequest>,
) -> Result<Json<OrchestrationState>, AppError> {
    let pipeline = state.read().await.pipeline().clone();
    validate_query(&request.query, pipeline.config().max_query_length)?;

    let final_state = pipeline.run(&request.query, request.render).await?;
    Ok(Json(final_state))
}

/// GET /api/capabilities - The vocabulary the router chooses from
pub async fn list_capabilities(State(state): State<SharedState>) -> Json<Vec<CapabilityInfo>> {
    let state = state.read().await;
    let registry = state.pipeline().registry();

    Json(
        CapabilityId::ALL
            .into_iter()
            .map(|id| CapabilityInfo {
                name: id.name(),
                responsibility: id.responsibility(),
                registered: registry.contains(id),
            })
            .collect(),
    )
}

/// GET /api/reports - Generated report artifacts, newest first
pub async fn list_reports(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ReportFile>>, AppError> {
    let reports_dir = state.read().await.reports_dir().to_path_buf();
    let reports = FileService::list_reports(&reports_dir).await?;
    Ok(Json(reports))
}

/// GET /api/config - Current orchestrator configuration
pub async fn get_config(State(state): State<SharedState>) -> Json<OrchestratorConfig> {
    Json(state.read().await.config().clone())
}

/// POST /api/config - Validate and apply a configuration update
///
/// Runs already in flight keep the configuration they started with.
pub async fn update_config(
    State(state): State<SharedState>,
    Json(request): Json<ConfigUpdateRequest>,
) -> Result<Json<OrchestratorConfig>, AppError> {
    let mut state = state.write().await;
    let updated = validate_and_apply_config_update(state.config().clone(), request)?;
    state.update_config(updated)?;
    Ok(Json(state.config().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::pipeline::Pipeline;
    use crate::orchestrator::registry::CapabilityRegistry;
    use crate::orchestrator::testing::ScriptedOracle;
    use crate::state::AppState;
    use std::sync::Arc;

    fn create_test_state(responses: Vec<&str>) -> SharedState {
        let oracle = Arc::new(ScriptedOracle::new(
            responses.into_iter().map(|r| Ok(r.to_string())).collect(),
        ));
        let registry = Arc::new(CapabilityRegistry::with_oracle_defaults(oracle.clone()));
        let pipeline = Pipeline::new(oracle, registry, None, OrchestratorConfig::default());
        AppState::new(pipeline, std::env::temp_dir()).shared()
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_query() {
        let state = create_test_state(vec![]);
        let request = OrchestrationRequest {
            query: "   ".to_string(),
            render: None,
        };

        let result = chat(State(state), Json(request)).await;
        assert!(matches!(result, Err(AppError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_chat_returns_event_stream() {
        let state = create_test_state(vec![
            r#"{"selected_agents": [], "reason": "nothing to do"}"#,
            r#"{"final_summary": "s", "recommendations": [], "tables": [], "charts": []}"#,
        ]);
        let request = OrchestrationRequest {
            query: "hello".to_string(),
            render: None,
        };

        let response = chat(State(state), Json(request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok());
        assert_eq!(content_type, Some("text/event-stream"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("\"stage\":\"routing\""));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_orchestrate_surfaces_router_failure() {
        let state = create_test_state(vec!["definitely not json"]);
        let request = OrchestrationRequest {
            query: "hello".to_string(),
            render: Some(false),
        };

        let err = orchestrate(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_update_config_validates() {
        let state = create_test_state(vec![]);
        let request = ConfigUpdateRequest {
            max_parallel_capabilities: Some(0),
            ..Default::default()
        };
        let result = update_config(State(state.clone()), Json(request)).await;
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));

        let request = ConfigUpdateRequest {
            max_parallel_capabilities: Some(2),
            ..Default::default()
        };
        let Json(updated) = update_config(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(updated.max_parallel_capabilities, 2);
        assert_eq!(get_config(State(state)).await.0.max_parallel_capabilities, 2);
    }

    #[tokio::test]
    async fn test_list_capabilities() {
        let state = create_test_state(vec![]);
        let Json(capabilities) = list_capabilities(State(state)).await;
        assert_eq!(capabilities.len(), CapabilityId::ALL.len());
        assert!(capabilities.iter().all(|c| c.registered));
        assert_eq!(capabilities[0].name, CapabilityId::ALL[0].name());
    }
}
