//! Orchestrator configuration
//!
//! Explicit configuration object built once at startup and handed to the
//! pipeline. Runtime updates go through `validate_and_apply_config_update`.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Gemini API timeout in seconds
    pub gemini_timeout_secs: u64,
    /// Gemini model name
    pub gemini_model: String,
    /// Gemini API base URL
    pub gemini_api_base_url: String,
    /// Maximum query length in characters
    pub max_query_length: usize,
    /// Maximum number of capability invocations in flight (1 = sequential)
    pub max_parallel_capabilities: usize,
    /// Word in a query that asks for a rendered report
    pub report_keyword: String,
    /// Treat "every selected capability failed" as a pipeline failure
    pub fail_when_all_capabilities_fail: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gemini_timeout_secs: 60,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_query_length: 10000, // 10KB
            max_parallel_capabilities: 1,
            report_keyword: "report".to_string(),
            fail_when_all_capabilities_fail: false,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_timeout_secs: env::var("GEMINI_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .filter(|t| *t > 0)
                .unwrap_or(defaults.gemini_timeout_secs),
            gemini_model: env::var("GEMINI_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.gemini_model),
            gemini_api_base_url: env::var("GEMINI_API_BASE_URL")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.gemini_api_base_url),
            max_parallel_capabilities: env::var("MAX_PARALLEL_CAPABILITIES")
                .ok()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_parallel_capabilities),
            ..defaults
        }
    }
}

/// Request body for updating orchestrator configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdateRequest {
    /// Maximum number of capability invocations in flight (optional)
    pub max_parallel_capabilities: Option<usize>,
    /// Gemini model name (optional)
    pub gemini_model: Option<String>,
    /// Maximum query length in characters (optional)
    pub max_query_length: Option<usize>,
    /// Report keyword (optional)
    pub report_keyword: Option<String>,
    /// Escalate total capability failure (optional)
    pub fail_when_all_capabilities_fail: Option<bool>,
}

/// Validate and apply configuration updates
///
/// This function validates the update request and applies valid changes to the config.
/// Returns an error if any validation fails.
///
/// # Arguments
/// * `config` - The current config to update
/// * `request` - The update request with optional fields
///
/// # Returns
/// * `Ok(OrchestratorConfig)` - The updated configuration
/// * `Err(AppError)` - If validation fails
pub fn validate_and_apply_config_update(
    mut config: OrchestratorConfig,
    request: ConfigUpdateRequest,
) -> Result<OrchestratorConfig, AppError> {
    if let Some(max_parallel) = request.max_parallel_capabilities {
        if max_parallel == 0 {
            return Err(AppError::InvalidConfig(
                "max_parallel_capabilities must be > 0".to_string(),
            ));
        }
        config.max_parallel_capabilities = max_parallel;
    }

    if let Some(model) = request.gemini_model {
        if model.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "gemini_model cannot be empty".to_string(),
            ));
        }
        config.gemini_model = model;
    }

    if let Some(max_query) = request.max_query_length {
        if max_query == 0 {
            return Err(AppError::InvalidConfig(
                "max_query_length must be > 0".to_string(),
            ));
        }
        config.max_query_length = max_query;
    }

    if let Some(keyword) = request.report_keyword {
        if keyword.trim().is_empty() || keyword.contains(char::is_whitespace) {
            return Err(AppError::InvalidConfig(
                "report_keyword must be a single non-empty word".to_string(),
            ));
        }
        config.report_keyword = keyword;
    }

    if let Some(escalate) = request.fail_when_all_capabilities_fail {
        config.fail_when_all_capabilities_fail = escalate;
    }

    Ok(config)
}
