//! Dispatcher stage
//!
//! Runs the selected capabilities in router order and writes one result per
//! capability into the request's `OrchestrationState`. A failing capability is
//! recorded as an error-shaped result and never stops the others.
//!
//! With `max_parallel == 1` invocations are strictly sequential and each result
//! is stored before the next capability starts, so later capabilities see the
//! earlier results. Larger values let up to that many invocations overlap;
//! those share the routed state as it was before dispatch, and their results
//! are stored in selection order once all of them have finished.

use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::registry::CapabilityRegistry;
use crate::orchestrator::types::{CapabilityResult, OrchestrationState, PipelineStage};
use crate::orchestrator::utils::unique_in_order;
use futures_util::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// Executes routed capabilities against the registry
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    max_parallel: usize,
}

impl Dispatcher {
    /// Create a dispatcher; `max_parallel` is clamped to at least 1
    pub fn new(registry: Arc<CapabilityRegistry>, max_parallel: usize) -> Self {
        Self {
            registry,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Same registry with a different in-flight limit
    pub fn with_max_parallel(&self, max_parallel: usize) -> Self {
        Self::new(self.registry.clone(), max_parallel)
    }

    /// The registry capabilities are resolved against
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Maximum number of invocations in flight
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Whether invocations run one at a time
    pub fn is_sequential(&self) -> bool {
        self.max_parallel == 1
    }

    /// Selected capability names with repeats removed, in first-occurrence order
    pub fn selection(&self, state: &OrchestrationState) -> Vec<String> {
        let names = unique_in_order(state.selected_agents());
        if names.len() != state.selected_agents().len() {
            tracing::warn!(
                selected = ?state.selected_agents(),
                "Dropping repeated capability names from selection"
            );
        }
        names
    }

    /// Overlapping invocations for the state's selection, yielded in selection order
    ///
    /// Every invocation sees `state` as it is now. Nothing is written to it;
    /// callers store the yielded results with [`Dispatcher::record_all`].
    pub fn invocations<'a>(
        &'a self,
        query: &'a str,
        state: &'a OrchestrationState,
    ) -> impl Stream<Item = CapabilityResult> + 'a {
        stream::iter(self.selection(state))
            .map(move |name| self.invoke(name, query, state))
            .buffered(self.max_parallel)
    }

    /// Run every selected capability and move the state to `Dispatched`
    ///
    /// # Errors
    /// * `OrchestrationError::InvalidTransition` if the state has not been routed.
    ///   Capability failures are recorded in the results, not returned.
    pub async fn dispatch(
        &self,
        query: &str,
        state: &mut OrchestrationState,
    ) -> Result<(), OrchestrationError> {
        if state.stage() != PipelineStage::Routed {
            return Err(OrchestrationError::InvalidTransition {
                from: state.stage(),
                to: PipelineStage::Dispatched,
            });
        }

        if self.is_sequential() {
            for name in self.selection(state) {
                let result = self.invoke(name, query, state).await;
                state.record_result(result)?;
            }
        } else {
            let results: Vec<CapabilityResult> = self.invocations(query, state).collect().await;
            Self::record_all(state, results)?;
        }
        Self::finish(state)
    }

    /// Store joined results in selection order
    pub fn record_all(
        state: &mut OrchestrationState,
        results: Vec<CapabilityResult>,
    ) -> Result<(), OrchestrationError> {
        for result in results {
            state.record_result(result)?;
        }
        Ok(())
    }

    /// Move the state to `Dispatched` once every result is stored
    pub fn finish(state: &mut OrchestrationState) -> Result<(), OrchestrationError> {
        state.mark_dispatched()?;

        tracing::debug!(
            results = state.results().len(),
            failed = state.results().iter().filter(|r| !r.is_success()).count(),
            "Dispatch completed"
        );
        Ok(())
    }

    /// Invoke one capability by wire name
    ///
    /// Never fails: unknown or unregistered names and handler errors all come
    /// back as an error-shaped `CapabilityInvocation` result.
    pub async fn invoke(
        &self,
        name: String,
        query: &str,
        state: &OrchestrationState,
    ) -> CapabilityResult {
        let handler = match self.registry.resolve(&name) {
            Ok((_, handler)) => handler,
            Err(e) => {
                let error = OrchestrationError::CapabilityInvocation {
                    capability: name.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(capability = %name, error = %error, "Cannot dispatch capability");
                return CapabilityResult::failure(name, &error);
            }
        };

        let start = Instant::now();
        tracing::debug!(capability = %name, "Invoking capability");

        match handler.invoke(query, state).await {
            Ok(output) => {
                tracing::info!(
                    capability = %name,
                    duration_ms = start.elapsed().as_millis(),
                    "Capability completed"
                );
                CapabilityResult::success(name, output)
            }
            Err(e) => {
                let error = OrchestrationError::CapabilityInvocation {
                    capability: name.clone(),
                    message: format!("{:#}", e),
                };
                tracing::warn!(
                    capability = %name,
                    duration_ms = start.elapsed().as_millis(),
                    error = %error,
                    "Capability failed"
                );
                CapabilityResult::failure(name, &error)
            }
        }
    }
}
