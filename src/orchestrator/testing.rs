//! In-memory fakes shared by unit tests

use crate::orchestrator::capability::Capability;
use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use crate::orchestrator::types::OrchestrationState;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One recorded oracle call
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: Option<Value>,
}

/// Oracle that replays queued responses in order
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String, OrchestrationError>>>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Result<String, OrchestrationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: Option<&Value>,
    ) -> Result<String, OrchestrationError> {
        self.calls.lock().unwrap().push(OracleCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            schema: response_schema.cloned(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OrchestrationError::Oracle("script exhausted".to_string())))
    }
}

/// Capability that returns a fixed payload (or error) and logs its invocations
pub struct RecordingCapability {
    name: String,
    output: Result<Value, String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingCapability {
    pub fn ok(name: &str, output: Value, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            output: Ok(output),
            log,
        }
    }

    pub fn failing(name: &str, message: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            output: Err(message.to_string()),
            log,
        }
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    async fn invoke(&self, _query: &str, _state: &OrchestrationState) -> anyhow::Result<Value> {
        self.log.lock().unwrap().push(self.name.clone());
        self.output.clone().map_err(|message| anyhow::anyhow!(message))
    }
}
