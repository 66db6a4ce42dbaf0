//! Orchestration pipeline
//!
//! Wires the stages together: `Router → Dispatcher → Synthesizer → [Renderer]`.
//! Every run allocates its own `OrchestrationState`; the pipeline itself is
//! read-only and shared across requests.
//!
//! Stages are plain futures. Dropping the future returned by `run`, or the
//! stream returned by `run_streaming`, drops whichever oracle or capability
//! call is in flight and no later stage starts.

use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::dispatcher::Dispatcher;
use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use crate::orchestrator::registry::CapabilityRegistry;
use crate::orchestrator::renderer::Renderer;
use crate::orchestrator::router::Router;
use crate::orchestrator::synthesizer::Synthesizer;
use crate::orchestrator::types::{CapabilityResult, OrchestrationState, PipelineStage};
use crate::orchestrator::utils::{contains_word, hash_query};
use futures_util::stream::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Which part of the pipeline an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Router call
    Routing,
    /// Dispatch of the whole selection
    Dispatch,
    /// A single capability result
    Capability,
    /// Synthesizer call
    Synthesis,
    /// Report rendering
    Rendering,
    /// End of the run
    Pipeline,
}

/// Event status on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Step started
    Running,
    /// Step finished
    Completed,
    /// Step failed; fatal unless it is a capability or rendering event
    Error,
}

/// Progress event emitted by `Pipeline::run_streaming`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    /// Step the event belongs to
    pub stage: PipelineStep,
    /// Capability name, for capability events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Human-readable progress or error text
    pub message: String,
    /// Running, completed or failed
    pub status: EventStatus,
    /// Step payload, such as the selection, a capability output or the final state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PipelineEvent {
    fn new(stage: PipelineStep, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            agent: None,
            message: message.into(),
            status,
            data: None,
        }
    }

    fn running(stage: PipelineStep, message: impl Into<String>) -> Self {
        Self::new(stage, EventStatus::Running, message)
    }

    fn completed(stage: PipelineStep, message: impl Into<String>) -> Self {
        Self::new(stage, EventStatus::Completed, message)
    }

    fn error(stage: PipelineStep, error: &OrchestrationError) -> Self {
        Self::new(stage, EventStatus::Error, error.to_string())
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn capability(result: &CapabilityResult) -> Self {
        let (status, message) = match &result.error {
            None => (EventStatus::Completed, format!("{} completed", result.agent)),
            Some(error) => (EventStatus::Error, error.clone()),
        };
        Self {
            stage: PipelineStep::Capability,
            agent: Some(result.agent.clone()),
            message,
            status,
            data: result.is_success().then(|| result.output.clone()),
        }
    }

    /// Whether this event ends the stream
    pub fn is_final(&self) -> bool {
        match self.status {
            EventStatus::Error => {
                !matches!(self.stage, PipelineStep::Capability | PipelineStep::Rendering)
            }
            EventStatus::Completed => self.stage == PipelineStep::Pipeline,
            EventStatus::Running => false,
        }
    }
}

/// The orchestration pipeline
#[derive(Clone)]
pub struct Pipeline {
    oracle: Arc<dyn Oracle>,
    router: Router,
    dispatcher: Dispatcher,
    synthesizer: Synthesizer,
    renderer: Option<Arc<dyn Renderer>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("dispatcher", &self.dispatcher)
            .field("renderer", &self.renderer.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a pipeline whose router and synthesizer share `oracle`
    pub fn new(
        oracle: Arc<dyn Oracle>,
        registry: Arc<CapabilityRegistry>,
        renderer: Option<Arc<dyn Renderer>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router: Router::new(oracle.clone()),
            synthesizer: Synthesizer::new(oracle.clone()),
            dispatcher: Dispatcher::new(registry, config.max_parallel_capabilities),
            oracle,
            renderer,
            config,
        }
    }

    /// Same oracle, registry and renderer under a new configuration
    pub fn with_config(&self, config: OrchestratorConfig) -> Self {
        Self {
            dispatcher: self
                .dispatcher
                .with_max_parallel(config.max_parallel_capabilities),
            config,
            ..self.clone()
        }
    }

    /// Oracle shared by the router and synthesizer
    pub fn oracle(&self) -> Arc<dyn Oracle> {
        self.oracle.clone()
    }

    /// Configuration this pipeline was built with
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Capabilities available to the dispatcher
    pub fn registry(&self) -> &CapabilityRegistry {
        self.dispatcher.registry()
    }

    /// Whether the request asks for a rendered artifact
    ///
    /// An explicit `render` flag wins; otherwise the query must contain the
    /// configured keyword or its plural as a whole word.
    pub fn wants_report(&self, query: &str, render: Option<bool>) -> bool {
        render.unwrap_or_else(|| contains_word(query, &self.config.report_keyword))
    }

    /// Run the whole pipeline for one request
    ///
    /// # Errors
    /// * Router or synthesizer failures (`Oracle`, `RoutingParse`, `SynthesisParse`)
    /// * `AllCapabilitiesFailed` when escalation is enabled and nothing succeeded
    ///
    /// Capability and render failures are recorded in the returned state.
    pub async fn run(
        &self,
        query: &str,
        render: Option<bool>,
    ) -> Result<OrchestrationState, OrchestrationError> {
        let query_hash = hash_query(query);
        let start = Instant::now();
        let mut state = OrchestrationState::new();

        tracing::info!(query_hash = %query_hash, "Starting orchestration");

        match self.drive(query, render, &mut state).await {
            Ok(()) => {
                tracing::info!(
                    query_hash = %query_hash,
                    stage = ?state.stage(),
                    duration_ms = start.elapsed().as_millis(),
                    "Orchestration completed"
                );
                Ok(state)
            }
            Err(e) => {
                let failed_at = state.stage();
                state.fail();
                tracing::error!(
                    query_hash = %query_hash,
                    stage = ?failed_at,
                    error = %e,
                    "Orchestration failed"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        query: &str,
        render: Option<bool>,
        state: &mut OrchestrationState,
    ) -> Result<(), OrchestrationError> {
        self.route_stage(query, state).await?;
        self.dispatcher.dispatch(query, state).await?;
        self.enforce_failure_policy(state)?;
        self.synthesis_stage(query, state).await?;
        if self.wants_report(query, render) {
            self.render_stage(query, state).await?;
        }
        Ok(())
    }

    async fn route_stage(
        &self,
        query: &str,
        state: &mut OrchestrationState,
    ) -> Result<(), OrchestrationError> {
        let decision = self.router.route(query).await?;
        state.apply_routing(decision)
    }

    fn enforce_failure_policy(&self, state: &OrchestrationState) -> Result<(), OrchestrationError> {
        if !state.results().all_failed() {
            return Ok(());
        }
        if self.config.fail_when_all_capabilities_fail {
            return Err(OrchestrationError::AllCapabilitiesFailed(
                state.results().len(),
            ));
        }
        tracing::warn!(
            failed = state.results().len(),
            "Every selected capability failed, synthesizing from error results"
        );
        Ok(())
    }

    async fn synthesis_stage(
        &self,
        query: &str,
        state: &mut OrchestrationState,
    ) -> Result<(), OrchestrationError> {
        let deliverable = self.synthesizer.synthesize(query, state.results()).await?;
        state.apply_synthesis(deliverable)
    }

    /// Render the deliverable; failures are recorded, not returned
    async fn render_stage(
        &self,
        query: &str,
        state: &mut OrchestrationState,
    ) -> Result<(), OrchestrationError> {
        let outcome = match (&self.renderer, state.synthesized()) {
            (Some(renderer), Some(deliverable)) => renderer.render(deliverable, query).await,
            (None, _) => Err(OrchestrationError::Render(
                "no renderer configured".to_string(),
            )),
            (_, None) => Err(OrchestrationError::InvalidTransition {
                from: state.stage(),
                to: PipelineStage::Reported,
            }),
        };

        match outcome {
            Ok(artifact) => {
                tracing::info!(path = %artifact.path, pages = artifact.pages, "Report rendered");
                state.attach_report(artifact)
            }
            Err(e @ OrchestrationError::InvalidTransition { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Report rendering failed");
                state.record_report_error(e.to_string())
            }
        }
    }

    /// Run the pipeline, yielding a progress event per stage and per capability
    ///
    /// The stream ends after a `pipeline/completed` event carrying the final
    /// state, or after the first fatal `error` event. Dropping it cancels the run.
    pub fn run_streaming(
        &self,
        query: String,
        render: Option<bool>,
    ) -> impl Stream<Item = PipelineEvent> + Send + 'static {
        let pipeline = self.clone();

        async_stream::stream! {
            let query_hash = hash_query(&query);
            let mut state = OrchestrationState::new();
            tracing::info!(query_hash = %query_hash, "Starting streaming orchestration");

            yield PipelineEvent::running(PipelineStep::Routing, "Selecting capabilities");
            if let Err(e) = pipeline.route_stage(&query, &mut state).await {
                state.fail();
                tracing::error!(query_hash = %query_hash, error = %e, "Routing failed");
                yield PipelineEvent::error(PipelineStep::Routing, &e);
                return;
            }
            yield PipelineEvent::completed(PipelineStep::Routing, state.routing_reason())
                .with_data(json!({ "selected_agents": state.selected_agents() }));

            yield PipelineEvent::running(
                PipelineStep::Dispatch,
                format!("Running {} capabilities", state.selected_agents().len()),
            );
            let recorded: Result<(), OrchestrationError> = if pipeline.dispatcher.is_sequential() {
                let mut recorded = Ok(());
                for name in pipeline.dispatcher.selection(&state) {
                    let result = pipeline.dispatcher.invoke(name, &query, &state).await;
                    yield PipelineEvent::capability(&result);
                    if let Err(e) = state.record_result(result) {
                        recorded = Err(e);
                        break;
                    }
                }
                recorded
            } else {
                let mut collected = Vec::new();
                {
                    let invocations = pipeline.dispatcher.invocations(&query, &state);
                    futures_util::pin_mut!(invocations);
                    while let Some(result) = invocations.next().await {
                        yield PipelineEvent::capability(&result);
                        collected.push(result);
                    }
                }
                Dispatcher::record_all(&mut state, collected)
            };
            let dispatched = recorded
                .and_then(|()| Dispatcher::finish(&mut state))
                .and_then(|()| pipeline.enforce_failure_policy(&state));
            if let Err(e) = dispatched {
                state.fail();
                tracing::error!(query_hash = %query_hash, error = %e, "Dispatch failed");
                yield PipelineEvent::error(PipelineStep::Dispatch, &e);
                return;
            }
            let failed = state.results().iter().filter(|r| !r.is_success()).count();
            yield PipelineEvent::completed(
                PipelineStep::Dispatch,
                format!("{} succeeded, {} failed", state.results().len() - failed, failed),
            );

            yield PipelineEvent::running(PipelineStep::Synthesis, "Synthesizing deliverable");
            if let Err(e) = pipeline.synthesis_stage(&query, &mut state).await {
                state.fail();
                tracing::error!(query_hash = %query_hash, error = %e, "Synthesis failed");
                yield PipelineEvent::error(PipelineStep::Synthesis, &e);
                return;
            }
            yield PipelineEvent::completed(PipelineStep::Synthesis, "Deliverable ready");

            if pipeline.wants_report(&query, render) {
                yield PipelineEvent::running(PipelineStep::Rendering, "Rendering report");
                if let Err(e) = pipeline.render_stage(&query, &mut state).await {
                    state.fail();
                    yield PipelineEvent::error(PipelineStep::Rendering, &e);
                    return;
                }
                match (state.report_ref(), state.report_error()) {
                    (Some(artifact), _) => {
                        yield PipelineEvent::completed(PipelineStep::Rendering, "Report ready")
                            .with_data(json!({ "url": artifact.url, "pages": artifact.pages }));
                    }
                    (None, Some(error)) => {
                        yield PipelineEvent::new(PipelineStep::Rendering, EventStatus::Error, error);
                    }
                    (None, None) => {}
                }
            }

            tracing::info!(query_hash = %query_hash, stage = ?state.stage(), "Streaming orchestration completed");
            let mut done = PipelineEvent::completed(PipelineStep::Pipeline, "Orchestration complete");
            done.data = serde_json::to_value(&state).ok();
            yield done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::capability::{Capability, CapabilityId};
    use crate::orchestrator::testing::{RecordingCapability, ScriptedOracle};
    use crate::orchestrator::types::{ArtifactRef, SynthesizedDeliverable};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    type InvocationLog = Arc<Mutex<Vec<String>>>;

    const SYNTH_OK: &str = r#"{
        "final_summary": "Market is growing",
        "recommendations": ["Invest"],
        "tables": [{"title": "Sales", "columns": ["Region", "USD"], "rows": [["EU", "10"]]}],
        "charts": []
    }"#;

    fn router_json(names: &[&str]) -> String {
        json!({ "selected_agents": names, "reason": "test routing" }).to_string()
    }

    fn registry(log: &InvocationLog, failing: &[CapabilityId]) -> Arc<CapabilityRegistry> {
        let builder = CapabilityId::ALL
            .into_iter()
            .fold(CapabilityRegistry::builder(), |builder, id| {
                let handler: Arc<dyn Capability> = if failing.contains(&id) {
                    Arc::new(RecordingCapability::failing(id.name(), "boom", log.clone()))
                } else {
                    Arc::new(RecordingCapability::ok(
                        id.name(),
                        json!({ "from": id.name() }),
                        log.clone(),
                    ))
                };
                builder.register(id, handler)
            });
        Arc::new(builder.build())
    }

    struct StubRenderer {
        fail: bool,
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn render(
            &self,
            deliverable: &SynthesizedDeliverable,
            _query: &str,
        ) -> Result<ArtifactRef, OrchestrationError> {
            if self.fail {
                return Err(OrchestrationError::Render("disk full".to_string()));
            }
            Ok(ArtifactRef {
                path: "/tmp/report.md".to_string(),
                url: "/reports/report.md".to_string(),
                pages: deliverable.tables.len() + 1,
            })
        }
    }

    fn pipeline(
        oracle: Arc<ScriptedOracle>,
        registry: Arc<CapabilityRegistry>,
        renderer: Option<StubRenderer>,
        config: OrchestratorConfig,
    ) -> Pipeline {
        Pipeline::new(
            oracle,
            registry,
            renderer.map(|r| Arc::new(r) as Arc<dyn Renderer>),
            config,
        )
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["IQVIA Insights Agent", "Patent Landscape Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(
            oracle.clone(),
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );

        let state = pipeline.run("market size for moleculeX", None).await.unwrap();

        assert_eq!(state.stage(), PipelineStage::Synthesized);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["IQVIA Insights Agent", "Patent Landscape Agent"]
        );
        assert_eq!(state.synthesized().unwrap().summary, "Market is growing");
        assert!(state.report_ref().is_none());

        // Synthesizer sees every result
        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].user_prompt.contains("Patent Landscape Agent"));
    }

    #[tokio::test]
    async fn test_router_failure_is_fatal() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok("not json".to_string())]));
        let pipeline = pipeline(
            oracle.clone(),
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );

        let err = pipeline.run("q", None).await.unwrap_err();

        assert!(matches!(err, OrchestrationError::RoutingParse(_)));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(oracle.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_fatal() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["Clinical Trials Agent"])),
            Ok(r#"{"final_summary": "missing fields"}"#.to_string()),
        ]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );

        let err = pipeline.run("q", None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::SynthesisParse(_)));
    }

    #[tokio::test]
    async fn test_all_failed_proceeds_by_default() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["EXIM Trends Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[CapabilityId::EximTrends]),
            None,
            OrchestratorConfig::default(),
        );

        let state = pipeline.run("q", None).await.unwrap();
        assert!(state.results().all_failed());
        assert_eq!(state.stage(), PipelineStage::Synthesized);
    }

    #[tokio::test]
    async fn test_all_failed_escalates_when_configured() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(router_json(&[
            "EXIM Trends Agent",
        ]))]));
        let config = OrchestratorConfig {
            fail_when_all_capabilities_fail: true,
            ..Default::default()
        };
        let pipeline = pipeline(
            oracle.clone(),
            registry(&log, &[CapabilityId::EximTrends]),
            None,
            config,
        );

        let err = pipeline.run("q", None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AllCapabilitiesFailed(1)));
        // Synthesizer never called
        assert_eq!(oracle.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_still_synthesizes() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&[])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let config = OrchestratorConfig {
            fail_when_all_capabilities_fail: true,
            ..Default::default()
        };
        let pipeline = pipeline(oracle, registry(&log, &[]), None, config);

        let state = pipeline.run("q", None).await.unwrap();
        assert!(state.results().is_empty());
        assert!(state.synthesized().is_some());
    }

    #[tokio::test]
    async fn test_report_keyword_triggers_render() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["IQVIA Insights Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[]),
            Some(StubRenderer { fail: false }),
            OrchestratorConfig::default(),
        );

        let state = pipeline.run("Give me a Report on X", None).await.unwrap();
        assert_eq!(state.stage(), PipelineStage::Reported);
        assert_eq!(state.report_ref().unwrap().pages, 2);
    }

    #[tokio::test]
    async fn test_render_failure_is_not_fatal() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["IQVIA Insights Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[]),
            Some(StubRenderer { fail: true }),
            OrchestratorConfig::default(),
        );

        let state = pipeline.run("q", Some(true)).await.unwrap();
        assert_eq!(state.stage(), PipelineStage::Synthesized);
        assert!(state.report_ref().is_none());
        assert!(state.report_error().unwrap().contains("disk full"));
    }

    #[test]
    fn test_wants_report() {
        let log = InvocationLog::default();
        let pipeline = pipeline(
            Arc::new(ScriptedOracle::new(vec![])),
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );
        assert!(pipeline.wants_report("full REPORT please", None));
        assert!(pipeline.wants_report("generate reports on moleculeX", None));
        assert!(!pipeline.wants_report("reporting trends", None));
        assert!(!pipeline.wants_report("a report", Some(false)));
        assert!(pipeline.wants_report("nothing", Some(true)));
    }

    #[tokio::test]
    async fn test_streaming_events_in_order() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["Clinical Trials Agent", "Horoscope Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );

        let events: Vec<PipelineEvent> = pipeline.run_streaming("q".to_string(), None).collect().await;

        let capability_events: Vec<_> = events
            .iter()
            .filter(|e| e.stage == PipelineStep::Capability)
            .collect();
        assert_eq!(capability_events.len(), 2);
        assert_eq!(capability_events[0].agent.as_deref(), Some("Clinical Trials Agent"));
        assert_eq!(capability_events[0].status, EventStatus::Completed);
        assert_eq!(capability_events[1].status, EventStatus::Error);

        let last = events.last().unwrap();
        assert!(last.is_final());
        assert_eq!(last.stage, PipelineStep::Pipeline);
        assert_eq!(last.data.as_ref().unwrap()["stage"], "synthesized");
    }

    #[tokio::test]
    async fn test_streaming_stops_after_fatal_error() {
        let log = InvocationLog::default();
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OrchestrationError::Oracle(
            "unavailable".to_string(),
        ))]));
        let pipeline = pipeline(
            oracle,
            registry(&log, &[]),
            None,
            OrchestratorConfig::default(),
        );

        let events: Vec<PipelineEvent> = pipeline.run_streaming("q".to_string(), None).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, EventStatus::Error);
        assert_eq!(events[1].stage, PipelineStep::Routing);
        assert!(log.lock().unwrap().is_empty());
    }

    /// Records how many results were stored when it ran
    struct CountingCapability {
        counts: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Capability for CountingCapability {
        async fn invoke(&self, _query: &str, state: &OrchestrationState) -> anyhow::Result<Value> {
            self.counts.lock().unwrap().push(state.results().len());
            Ok(json!({ "seen": state.results().len() }))
        }
    }

    #[tokio::test]
    async fn test_streaming_stores_each_result_before_next_capability() {
        let counts = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(
            [CapabilityId::IqviaInsights, CapabilityId::PatentLandscape]
                .into_iter()
                .fold(CapabilityRegistry::builder(), |builder, id| {
                    builder.register(id, Arc::new(CountingCapability { counts: counts.clone() }))
                })
                .build(),
        );
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["IQVIA Insights Agent", "Patent Landscape Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(oracle, registry, None, OrchestratorConfig::default());

        let events: Vec<PipelineEvent> = pipeline.run_streaming("q".to_string(), None).collect().await;

        assert_eq!(*counts.lock().unwrap(), vec![0, 1]);
        let second = events
            .iter()
            .find(|e| e.agent.as_deref() == Some("Patent Landscape Agent"))
            .unwrap();
        assert_eq!(second.data.as_ref().unwrap()["seen"], 1);
        assert_eq!(events.last().unwrap().stage, PipelineStep::Pipeline);
    }

    /// Blocks until dropped, flagging the drop
    struct HangingCapability {
        started: Arc<Notify>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Capability for HangingCapability {
        async fn invoke(&self, _query: &str, _state: &OrchestrationState) -> anyhow::Result<Value> {
            let _flag = DropFlag(self.dropped.clone());
            self.started.notify_one();
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_later_stages() {
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(
            CapabilityRegistry::builder()
                .register(
                    CapabilityId::WebIntelligence,
                    Arc::new(HangingCapability {
                        started: started.clone(),
                        dropped: dropped.clone(),
                    }),
                )
                .build(),
        );
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(router_json(&["Web Intelligence Agent"])),
            Ok(SYNTH_OK.to_string()),
        ]));
        let pipeline = pipeline(oracle.clone(), registry, None, OrchestratorConfig::default());

        let handle = tokio::spawn(async move { pipeline.run("q", None).await });
        started.notified().await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(dropped.load(Ordering::SeqCst));
        // Only the router reached the oracle
        assert_eq!(oracle.calls().len(), 1);
    }
}
