//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use crate::orchestrator::config::OrchestratorConfig;
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Gemini API key (`GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`)
    pub api_key: Option<String>,
    /// Directory generated reports are written to and served from
    pub reports_dir: String,
    /// Pipeline configuration
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8000),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            api_key: ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
                .iter()
                .filter_map(|name| env::var(name).ok())
                .find(|key| !key.trim().is_empty()),
            reports_dir: env::var("REPORTS_DIR")
                .ok()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "generated_reports".to_string()),
            orchestrator: OrchestratorConfig::from_env(),
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
