// Application state management
// Contains the shared orchestration pipeline and the reports directory

use crate::config::Config;
use crate::error::AppError;
use crate::orchestrator::api_client::GeminiClient;
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::constants::REPORTS_URL_PREFIX;
use crate::orchestrator::pipeline::Pipeline;
use crate::orchestrator::registry::CapabilityRegistry;
use crate::orchestrator::renderer::Renderer;
use crate::services::files::FileService;
use crate::services::report::MarkdownReportRenderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State handle shared by every request handler
pub type SharedState = Arc<RwLock<AppState>>;

/// Main application state
///
/// Requests clone the pipeline out under a read lock, so a config update
/// never affects a run already in flight.
#[derive(Debug, Clone)]
pub struct AppState {
    pipeline: Pipeline,
    reports_dir: PathBuf,
    /// Present when the pipeline is backed by Gemini and can be rebuilt
    api_key: Option<String>,
}

impl AppState {
    /// Wrap an already-built pipeline
    pub fn new(pipeline: Pipeline, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            reports_dir: reports_dir.into(),
            api_key: None,
        }
    }

    /// Build the Gemini-backed production state
    ///
    /// Creates the reports directory if needed.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let reports_dir = FileService::ensure_directory(&config.reports_dir).await?;
        let api_key = config.api_key.clone().unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("No GEMINI_API_KEY or GOOGLE_API_KEY set, oracle calls will fail");
        }

        let pipeline = gemini_pipeline(&api_key, &reports_dir, config.orchestrator.clone())?;
        Ok(Self {
            pipeline,
            reports_dir,
            api_key: Some(api_key),
        })
    }

    /// Wrap in the shared handle handlers expect
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Pipeline new requests clone
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Current orchestrator configuration
    pub fn config(&self) -> &OrchestratorConfig {
        self.pipeline.config()
    }

    /// Directory rendered reports are written to
    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Replace the pipeline configuration
    ///
    /// Oracle settings (model, endpoint, timeout) rebuild the Gemini client;
    /// everything else keeps the current oracle and registry.
    pub fn update_config(&mut self, config: OrchestratorConfig) -> Result<(), AppError> {
        let current = self.pipeline.config();
        let oracle_changed = current.gemini_model != config.gemini_model
            || current.gemini_api_base_url != config.gemini_api_base_url
            || current.gemini_timeout_secs != config.gemini_timeout_secs;

        self.pipeline = match &self.api_key {
            Some(key) if oracle_changed => gemini_pipeline(key, &self.reports_dir, config)?,
            _ => self.pipeline.with_config(config),
        };

        tracing::info!(config = ?self.pipeline.config(), "Orchestrator configuration updated");
        Ok(())
    }
}

fn gemini_pipeline(
    api_key: &str,
    reports_dir: &Path,
    config: OrchestratorConfig,
) -> Result<Pipeline, AppError> {
    let oracle = Arc::new(GeminiClient::new(api_key, &config)?);
    let registry = Arc::new(CapabilityRegistry::with_oracle_defaults(oracle.clone()));
    let renderer: Arc<dyn Renderer> =
        Arc::new(MarkdownReportRenderer::new(reports_dir, REPORTS_URL_PREFIX));

    Ok(Pipeline::new(oracle, registry, Some(renderer), config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::ScriptedOracle;
    use tempfile::tempdir;

    fn test_state(dir: &Path) -> AppState {
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let registry = Arc::new(CapabilityRegistry::with_oracle_defaults(oracle.clone()));
        AppState::new(
            Pipeline::new(oracle, registry, None, OrchestratorConfig::default()),
            dir,
        )
    }

    #[test]
    fn test_update_config_keeps_registry() {
        let dir = tempdir().unwrap();
        let mut state = test_state(dir.path());
        let config = OrchestratorConfig {
            max_parallel_capabilities: 4,
            gemini_model: "gemini-other".to_string(),
            ..Default::default()
        };

        state.update_config(config.clone()).unwrap();

        assert_eq!(state.config(), &config);
        assert_eq!(state.pipeline().registry().len(), 6);
    }

    #[tokio::test]
    async fn test_from_config_creates_reports_dir() {
        let dir = tempdir().unwrap();
        let reports = dir.path().join("out/reports");
        let mut config = Config::from_env();
        config.reports_dir = reports.to_string_lossy().to_string();
        config.api_key = Some("test-key".to_string());

        let state = AppState::from_config(&config).await.unwrap();

        assert!(reports.is_dir());
        assert!(state.reports_dir().is_absolute());
        assert_eq!(state.pipeline().registry().len(), 6);
    }
}
