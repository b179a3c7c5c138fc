//! Fundamentals resolution pipeline: per-entity resolver, bounded concurrent
//! orchestration, configuration and run reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use qcmp_core::stats::BatchSummary;
use qcmp_core::{CompanyResult, EntityReference, SearchCandidate};
use qcmp_extract::{ExtractError, RecordingDiagnostics, SchemaProfile};
use qcmp_fetch::{FetchError, HttpClientConfig, HttpFetcher, RetryPolicy, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;
use uuid::Uuid;

pub mod events;
pub mod orchestrate;
pub mod report;
pub mod resolver;
pub mod select;

pub use events::load_entities;
pub use orchestrate::{bounded_map, run};
pub use report::write_reports;
pub use resolver::FundamentalsResolver;
pub use select::{CandidateSelector, ExactLabelMatch, FirstCandidate, SimilarLabel};

pub const CRATE_NAME: &str = "qcmp-pipeline";

pub const DEFAULT_CONCURRENCY: usize = 20;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport: {0}")]
    Transport(#[from] FetchError),
    #[error("parse: {0}")]
    Parse(String),
}

impl From<ExtractError> for ResolveError {
    fn from(err: ExtractError) -> Self {
        ResolveError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for ResolveError {
    fn from(err: url::ParseError) -> Self {
        ResolveError::Parse(format!("invalid address: {err}"))
    }
}

/// Where the search index, detail pages and data endpoints live, and how the
/// data payload is laid out. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointProfile {
    pub base_url: String,
    pub search_path: String,
    /// Relative path with `{k}`, `{id}` and `{slug}` placeholders.
    pub detail_path_template: String,
    pub data_attribute: String,
    pub data_path_fragment: String,
    pub schema: SchemaProfile,
}

impl Default for EndpointProfile {
    fn default() -> Self {
        Self {
            base_url: "https://trendlyne.com/".to_string(),
            search_path: "/member/api/ac_snames/all/".to_string(),
            detail_path_template: "/equity/{k}/{id}/{slug}/".to_string(),
            data_attribute: "data-tablesurl".to_string(),
            data_path_fragment: "get-fundamental_results".to_string(),
            schema: SchemaProfile::default(),
        }
    }
}

impl EndpointProfile {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Site root, used as the referer for search calls.
    pub fn site_root(&self) -> Result<Url, url::ParseError> {
        self.base()?.join("/")
    }

    pub fn search_url(&self, term: &str) -> Result<Url, url::ParseError> {
        let mut url = self.base()?.join(&self.search_path)?;
        url.query_pairs_mut()
            .append_pair("term", term.trim())
            .append_pair("all-results", "true");
        Ok(url)
    }

    /// The candidate's own detail address when given (absolute or relative),
    /// otherwise the template filled from its key fields.
    pub fn detail_url(&self, candidate: &SearchCandidate) -> Result<Url, ResolveError> {
        if let Some(provided) = candidate.detail_url.as_deref() {
            return Ok(self.base()?.join(provided)?);
        }
        let key = candidate.numeric_key.ok_or_else(|| {
            ResolveError::NotFound(format!(
                "candidate {} has neither a detail address nor a numeric key",
                candidate.candidate_id
            ))
        })?;
        let path = self
            .detail_path_template
            .replace("{k}", &key.to_string())
            .replace("{id}", &candidate.candidate_id)
            .replace("{slug}", &candidate.slug);
        Ok(self.base()?.join(&path)?)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: usize,
    pub reports_dir: PathBuf,
    pub endpoints_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            http_max_retries: 0,
            reports_dir: PathBuf::from("./reports"),
            endpoints_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: var("QCMP_CONCURRENCY")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            user_agent: var("QCMP_USER_AGENT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            http_timeout_secs: var("QCMP_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            http_max_retries: var("QCMP_HTTP_MAX_RETRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.http_max_retries),
            reports_dir: var("QCMP_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            endpoints_file: var("QCMP_ENDPOINTS_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            global_concurrency: self.concurrency.max(1),
            retry: RetryPolicy::with_attempts(self.http_max_retries),
        }
    }

    pub fn load_endpoints(&self) -> Result<EndpointProfile> {
        match &self.endpoints_file {
            Some(path) => EndpointProfile::from_yaml_file(path),
            None => Ok(EndpointProfile::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested: usize,
    pub resolved: usize,
    pub summary: BatchSummary,
    pub reports_dir: PathBuf,
}

/// Live-network pipeline: one shared HTTP client, one resolver, one report
/// directory per run.
pub struct QuarterComparePipeline {
    config: PipelineConfig,
    resolver: Arc<FundamentalsResolver<HttpFetcher>>,
    diagnostics: Arc<RecordingDiagnostics>,
}

impl QuarterComparePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let endpoints = config.load_endpoints()?;
        let http = HttpFetcher::new(config.http_client_config())?;
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let resolver = FundamentalsResolver::new(http, endpoints)?.with_diagnostics(diagnostics.clone());
        Ok(Self {
            config,
            resolver: Arc::new(resolver),
            diagnostics,
        })
    }

    pub fn with_selector(self, selector: impl CandidateSelector + 'static) -> Result<Self> {
        let resolver = Arc::try_unwrap(self.resolver)
            .map_err(|_| anyhow::anyhow!("resolver already shared"))?
            .with_selector(selector);
        Ok(Self {
            resolver: Arc::new(resolver),
            ..self
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn resolve_one(&self, entity: &EntityReference) -> Result<CompanyResult, ResolveError> {
        self.resolver.resolve(entity).await
    }

    pub async fn run_once(&self, entities: Vec<EntityReference>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let requested = entities.len();

        let results = run(Arc::clone(&self.resolver), entities, self.config.concurrency).await;
        let finished_at = Utc::now();

        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        let summary = write_reports(
            &reports_dir,
            run_id,
            started_at,
            finished_at,
            &results,
            &self.diagnostics.drain(),
        )
        .await?;
        info!(%run_id, requested, resolved = results.len(), "run complete");

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            requested,
            resolved: results.len(),
            summary,
            reports_dir,
        })
    }
}
