//! Gemini API client
//!
//! Direct HTTP client for the Gemini `generateContent` endpoint. This is the
//! production `Oracle`: the router and synthesizer use it with a response schema
//! to get structured JSON, prompt-backed capabilities use it for free text.

use crate::error::AppError;
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::gemini_types::{
    GeminiApiRequest, GeminiApiResponse, GenerationConfig, RequestContent, RequestPart,
};
use crate::orchestrator::oracle::Oracle;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Gemini-backed oracle
///
/// Holds one `reqwest::Client` so connections are pooled across requests.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// * Returns `AppError::Internal` if the HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>, config: &OrchestratorConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gemini_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            api_key,
            config.gemini_model.clone(),
            config.gemini_api_base_url.clone(),
        ))
    }

    /// Build a client around an existing `reqwest::Client`
    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Model this client talks to
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        system_prompt: &str,
        user_prompt: &str,
        response_schema: Option<&Value>,
    ) -> GeminiApiRequest {
        let system_instruction = (!system_prompt.is_empty()).then(|| RequestContent {
            role: None,
            parts: vec![RequestPart {
                text: system_prompt.to_string(),
            }],
        });

        let generation_config = response_schema.map(|schema| GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_json_schema: Some(schema.clone()),
        });

        GeminiApiRequest {
            system_instruction,
            contents: vec![RequestContent {
                role: Some("user".to_string()),
                parts: vec![RequestPart {
                    text: user_prompt.to_string(),
                }],
            }],
            generation_config,
        }
    }

    async fn generate_content(
        &self,
        request_body: &GeminiApiRequest,
    ) -> Result<String, OrchestrationError> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::Oracle("API key is empty".to_string()));
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        tracing::debug!(
            url = %url,
            model = %self.model,
            structured = request_body.generation_config.is_some(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(request_body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::Oracle(format!(
                    "Failed to send HTTP request to Gemini API: {}",
                    e
                ))
            })?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());

            tracing::error!(
                status_code = status_code,
                error_body = %error_body,
                "Gemini API returned error status"
            );

            if status_code == 429 {
                return Err(OrchestrationError::Oracle(format!(
                    "Gemini API rate limit exceeded (HTTP {}): {}",
                    status_code, error_body
                )));
            }

            return Err(OrchestrationError::Oracle(format!(
                "Gemini API returned error status {}: {}",
                status_code, error_body
            )));
        }

        let response_body = response.text().await.map_err(|e| {
            OrchestrationError::Oracle(format!(
                "Failed to read response body from Gemini API: {}",
                e
            ))
        })?;

        let parsed: GeminiApiResponse = serde_json::from_str(&response_body).map_err(|e| {
            OrchestrationError::Oracle(format!(
                "Failed to parse JSON response from Gemini API: {} - Response body: {}",
                e, response_body
            ))
        })?;

        // Check for blocked prompt
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_ref())
        {
            return Err(OrchestrationError::Oracle(format!(
                "Gemini API blocked the prompt: {}",
                reason
            )));
        }

        let candidate = parsed.candidates.first().ok_or_else(|| {
            OrchestrationError::Oracle("Gemini API response contains no candidates".to_string())
        })?;

        let text: String = candidate
            .content
            .as_ref()
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(OrchestrationError::Oracle(format!(
                "Gemini API response text is empty (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        tracing::debug!(
            response_len = text.len(),
            "Successfully received response from Gemini API"
        );

        Ok(text)
    }
}

#[async_trait]
impl Oracle for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: Option<&Value>,
    ) -> Result<String, OrchestrationError> {
        let request = Self::build_request(system_prompt, user_prompt, response_schema);
        self.generate_content(&request).await
    }
}
