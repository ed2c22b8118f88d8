//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor, and the service configuration read from the
//! environment.

use std::path::PathBuf;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use signoff_definition::{ConfigError, WorkflowConfig};
use signoff_engine::{ApprovalEngine, MemoryDocumentGateway};

// -- Configuration ------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Listen port (`SIGNOFF_PORT`, default 8080).
    pub port: u16,
    /// YAML workflow definitions seeded at boot (`SIGNOFF_WORKFLOWS`).
    pub workflows: Option<PathBuf>,
    /// Serve `/metrics` (`SIGNOFF_METRICS_ENABLED`, default true).
    pub metrics_enabled: bool,
    /// `SIGNOFF_LOG_FORMAT`: `json` or `text` (default).
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            workflows: None,
            metrics_enabled: true,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Unparseable values fall back to
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("SIGNOFF_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            workflows: lookup("SIGNOFF_WORKFLOWS")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            metrics_enabled: lookup("SIGNOFF_METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.metrics_enabled),
            log_format: match lookup("SIGNOFF_LOG_FORMAT").as_deref() {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<ApprovalEngine>,
    /// Document records the demo service routes. Host applications plug in
    /// their own gateway instead.
    pub documents: MemoryDocumentGateway,
    /// Present when a Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl AppState {
    /// Empty state with default configuration and no metrics recorder.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State over a fresh engine and in-memory document gateway.
    pub fn with_config(config: AppConfig, metrics: Option<PrometheusHandle>) -> Self {
        let documents = MemoryDocumentGateway::new();
        let engine = ApprovalEngine::new(Arc::new(documents.clone()));
        Self {
            config,
            engine: Arc::new(engine),
            documents,
            metrics,
        }
    }

    /// Seed workflow definitions from the configured YAML file, if any.
    /// Returns the number of workflows created.
    pub fn seed_workflows(&self) -> Result<usize, ConfigError> {
        let Some(path) = &self.config.workflows else {
            return Ok(0);
        };
        let config = WorkflowConfig::load(path)?;
        let created = config.apply(self.engine.registry())?;
        tracing::info!(path = %path.display(), workflows = created.len(), "workflows seeded");
        Ok(created.len())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
