//! Pipeline orchestration — cache, fan-out, format, select, clean.
//!
//! The orchestrator drives one request end to end: authentication gate,
//! cache lookup, provider fan-out, chain-of-thought formatting, ensemble
//! selection over the raw candidates, final cleaning of the winner, and
//! cache population. All pipeline state is request-scoped; the injected
//! [`QueryCache`] is the only thing shared across requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::QueryCache;
use crate::cleaner;
use crate::prompt;
use crate::provider::{Dispatcher, GenerationParams, ProviderSpec};
use crate::reasoning;
use crate::selection::SelectionStrategy;

/// Label recorded against each request in the request log.
const MODEL_LABEL: &str = "Multi-Model";

/// Error type for pipeline entry
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("query must not be empty")]
    EmptyQuery,
}

/// Result type for pipeline entry
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type RequestId = String;
pub type ResponseId = String;

/// Authentication collaborator consulted before the pipeline runs.
/// Unauthenticated callers never reach the orchestrator body.
pub trait Authenticator: Send + Sync {
    fn is_authenticated(&self, principal: &str) -> bool;
}

/// Accepts every caller. Default for deployments that gate upstream.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn is_authenticated(&self, _principal: &str) -> bool {
        true
    }
}

/// Persistence collaborator for request/response history. Failures here
/// never abort the pipeline — the orchestrator logs a warning and moves on.
#[async_trait]
pub trait RequestLog: Send + Sync {
    async fn create_request(
        &self,
        user_input: &str,
        model_label: &str,
    ) -> anyhow::Result<RequestId>;

    async fn record_response(
        &self,
        request_id: &RequestId,
        provider: &str,
        raw_text: &str,
    ) -> anyhow::Result<ResponseId>;

    async fn update_formatted(&self, response_id: &ResponseId, rendered: &str)
        -> anyhow::Result<()>;

    async fn finalize_request(&self, request_id: &RequestId, final_text: &str)
        -> anyhow::Result<()>;
}

/// Request log that records nothing, handing out fresh ids.
#[derive(Debug, Default)]
pub struct NoopLog;

#[async_trait]
impl RequestLog for NoopLog {
    async fn create_request(&self, _input: &str, _label: &str) -> anyhow::Result<RequestId> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn record_response(
        &self,
        _request_id: &RequestId,
        _provider: &str,
        _raw_text: &str,
    ) -> anyhow::Result<ResponseId> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn update_formatted(
        &self,
        _response_id: &ResponseId,
        _rendered: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn finalize_request(
        &self,
        _request_id: &RequestId,
        _final_text: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One request as kept by [`MemoryLog`].
#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub id: RequestId,
    pub user_input: String,
    pub model_label: String,
    pub created_at: DateTime<Utc>,
    pub final_text: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// One provider response as kept by [`MemoryLog`].
#[derive(Debug, Clone)]
pub struct LoggedResponse {
    pub id: ResponseId,
    pub request_id: RequestId,
    pub provider: String,
    pub raw_text: String,
    /// Chain-of-thought rendering, filled in after formatting.
    pub rendered: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// In-memory request log keeping the full timestamped request/response
/// history. Stands in for a database-backed collaborator in tests and
/// embedded use.
#[derive(Debug, Default)]
pub struct MemoryLog {
    requests: Mutex<Vec<LoggedRequest>>,
    responses: Mutex<Vec<LoggedResponse>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all logged requests, in creation order.
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of all logged responses, in creation order.
    pub fn responses(&self) -> Vec<LoggedResponse> {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RequestLog for MemoryLog {
    async fn create_request(
        &self,
        user_input: &str,
        model_label: &str,
    ) -> anyhow::Result<RequestId> {
        let id = Uuid::new_v4().to_string();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LoggedRequest {
                id: id.clone(),
                user_input: user_input.to_string(),
                model_label: model_label.to_string(),
                created_at: Utc::now(),
                final_text: None,
                finalized_at: None,
            });
        Ok(id)
    }

    async fn record_response(
        &self,
        request_id: &RequestId,
        provider: &str,
        raw_text: &str,
    ) -> anyhow::Result<ResponseId> {
        let id = Uuid::new_v4().to_string();
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LoggedResponse {
                id: id.clone(),
                request_id: request_id.clone(),
                provider: provider.to_string(),
                raw_text: raw_text.to_string(),
                rendered: None,
                created_at: Utc::now(),
            });
        Ok(id)
    }

    async fn update_formatted(
        &self,
        response_id: &ResponseId,
        rendered: &str,
    ) -> anyhow::Result<()> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.iter_mut().find(|r| &r.id == response_id) {
            Some(response) => {
                response.rendered = Some(rendered.to_string());
                Ok(())
            }
            None => Err(anyhow::anyhow!("unknown response id: {response_id}")),
        }
    }

    async fn finalize_request(
        &self,
        request_id: &RequestId,
        final_text: &str,
    ) -> anyhow::Result<()> {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        match requests.iter_mut().find(|r| &r.id == request_id) {
            Some(request) => {
                request.final_text = Some(final_text.to_string());
                request.finalized_at = Some(Utc::now());
                Ok(())
            }
            None => Err(anyhow::anyhow!("unknown request id: {request_id}")),
        }
    }
}

/// Configuration for the pipeline and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chat-completions endpoint shared by all providers.
    pub endpoint_url: String,
    /// Bearer token for the endpoint, if it requires one.
    pub api_key: Option<String>,
    /// Providers to fan out to, in declaration order.
    pub providers: Vec<ProviderSpec>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Per-provider-call timeout.
    pub request_timeout_secs: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// Keyword set for the quality scorer's keyword-density metric.
    pub keywords: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let default_models = [
            "claude-3-5-sonnet-20240620",
            "gpt-4o-mini-2024-07-18",
            "deepseek-coder",
        ];
        Self {
            endpoint_url: std::env::var("QUORUM_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8000/v1/chat/completions".to_string()),
            api_key: std::env::var("QUORUM_API_KEY").ok(),
            providers: default_models
                .iter()
                .map(|m| ProviderSpec {
                    id: m.to_string(),
                    model: m.to_string(),
                })
                .collect(),
            max_tokens: 2000,
            temperature: 0.2,
            top_p: 0.9,
            request_timeout_secs: 120,
            cache_capacity: 100,
            cache_ttl_secs: 300,
            keywords: crate::selection::DEFAULT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing fields fall back to
    /// the defaults (including env-var overrides).
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Drives the dispatch → cache → format → select → clean pipeline.
pub struct Orchestrator {
    cache: Arc<QueryCache>,
    dispatcher: Dispatcher,
    strategy: Box<dyn SelectionStrategy>,
    auth: Arc<dyn Authenticator>,
    log: Arc<dyn RequestLog>,
}

impl Orchestrator {
    /// Orchestrator with an open authenticator and a no-op request log.
    pub fn new(
        cache: Arc<QueryCache>,
        dispatcher: Dispatcher,
        strategy: Box<dyn SelectionStrategy>,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            strategy,
            auth: Arc::new(AllowAll),
            log: Arc::new(NoopLog),
        }
    }

    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.log = log;
        self
    }

    /// Answer one query.
    ///
    /// Flow: auth gate → blank check → cache lookup → request log →
    /// concurrent provider fan-out → per-candidate formatting (logged) →
    /// selection over raw candidates → clean the winner once → finalize →
    /// cache the cleaned text under the trimmed query.
    pub async fn handle_query(&self, principal: &str, user_input: &str) -> PipelineResult<String> {
        if !self.auth.is_authenticated(principal) {
            return Err(PipelineError::Unauthenticated);
        }

        let input = user_input.trim();
        if input.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        if let Some(cached) = self.cache.get(input) {
            info!(query = input, "cache hit");
            return Ok(cached);
        }

        let request_id = match self.log.create_request(input, MODEL_LABEL).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "request log create failed; continuing without history");
                None
            }
        };

        let messages = prompt::build_messages(input);
        let candidates = self.dispatcher.dispatch(&messages).await;
        info!(
            query = input,
            candidates = candidates.len(),
            failed = candidates.iter().filter(|c| c.is_error()).count(),
            "dispatch complete"
        );

        // Derived chain-of-thought view per candidate. Selection below
        // still sees the raw text; the rendered form goes to the log and
        // feeds the step-based strategy internally.
        let formatted: Vec<_> = candidates.iter().map(reasoning::format).collect();

        if let Some(request_id) = &request_id {
            for (candidate, view) in candidates.iter().zip(&formatted) {
                match self
                    .log
                    .record_response(request_id, &candidate.provider_id, &candidate.raw_text)
                    .await
                {
                    Ok(response_id) => {
                        if let Err(e) = self
                            .log
                            .update_formatted(&response_id, &view.rendered)
                            .await
                        {
                            warn!(provider = %candidate.provider_id, error = %e, "formatted update failed");
                        }
                    }
                    Err(e) => {
                        warn!(provider = %candidate.provider_id, error = %e, "response record failed");
                    }
                }
            }
        }

        if !candidates.is_empty() && candidates.iter().all(|c| c.is_error()) {
            // Degraded mode: the winner will be a sentinel text and the
            // cleaner strips only the sentinel token, so failure detail
            // reaches the caller.
            warn!(query = input, "every provider failed; selecting among error candidates");
        }

        let selection = self.strategy.select(&candidates, input);
        let final_text = cleaner::clean(&selection.text);

        if let Some(request_id) = &request_id {
            if let Err(e) = self.log.finalize_request(request_id, &final_text).await {
                warn!(error = %e, "request finalize failed");
            }
        }

        self.cache.put(input, &final_text);
        info!(query = input, score = selection.score, "query answered");
        Ok(final_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ProviderClient, ProviderResult};
    use crate::selection::{FixedBaseline, QualityScorer, SelfConsistencySelector, DEFAULT_KEYWORDS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderClient for CountingClient {
        async fn complete(&self, request: &ChatRequest) -> ProviderResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("answer from {}", request.model))
        }
    }

    struct DenyAll;
    impl Authenticator for DenyAll {
        fn is_authenticated(&self, _principal: &str) -> bool {
            false
        }
    }

    fn test_orchestrator(calls: Arc<AtomicUsize>) -> Orchestrator {
        let client = Arc::new(CountingClient { calls });
        let providers = vec![ProviderSpec {
            id: "p1".to_string(),
            model: "m1".to_string(),
        }];
        let dispatcher = Dispatcher::new(client, providers, GenerationParams::default());
        let cache = Arc::new(QueryCache::new(10, Duration::from_secs(300)));
        let strategy = Box::new(SelfConsistencySelector::new(
            QualityScorer::new(&DEFAULT_KEYWORDS).with_baseline(Arc::new(FixedBaseline(7.0)), 1.0),
        ));
        Orchestrator::new(cache, dispatcher, strategy)
    }

    #[tokio::test]
    async fn test_unauthenticated_rejected_before_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator =
            test_orchestrator(calls.clone()).with_authenticator(Arc::new(DenyAll));

        let result = orchestrator.handle_query("anon", "hello").await;
        assert!(matches!(result, Err(PipelineError::Unauthenticated)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = test_orchestrator(calls.clone());

        let result = orchestrator.handle_query("user", "   ").await;
        assert!(matches!(result, Err(PipelineError::EmptyQuery)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeat_query_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = test_orchestrator(calls.clone());

        let first = orchestrator.handle_query("user", "explain x").await.unwrap();
        let second = orchestrator.handle_query("user", "explain x").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_trimmed_for_cache_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = test_orchestrator(calls.clone());

        orchestrator.handle_query("user", "explain x").await.unwrap();
        orchestrator.handle_query("user", "  explain x  ").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memory_log_records_full_history() {
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(MemoryLog::new());
        let orchestrator = test_orchestrator(calls).with_request_log(log.clone());

        let answer = orchestrator
            .handle_query("user", "explain recursion")
            .await
            .unwrap();

        let requests = log.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_input, "explain recursion");
        assert_eq!(requests[0].model_label, "Multi-Model");
        assert_eq!(requests[0].final_text.as_deref(), Some(answer.as_str()));
        let finalized_at = requests[0].finalized_at.expect("request finalized");
        assert!(finalized_at >= requests[0].created_at);

        let responses = log.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, requests[0].id);
        assert_eq!(responses[0].provider, "p1");
        assert_eq!(responses[0].raw_text, "answer from m1");
        let rendered = responses[0].rendered.as_deref().expect("formatted recorded");
        assert!(rendered.starts_with("Chain of Thought:"));
        assert!(responses[0].created_at >= requests[0].created_at);
    }

    #[tokio::test]
    async fn test_memory_log_rejects_unknown_ids() {
        let log = MemoryLog::new();
        assert!(log
            .update_formatted(&"missing".to_string(), "steps")
            .await
            .is_err());
        assert!(log
            .finalize_request(&"missing".to_string(), "text")
            .await
            .is_err());
    }

    #[test]
    fn test_config_from_toml() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
endpoint_url = "http://example.test/v1/chat/completions"
max_tokens = 512
cache_ttl_secs = 60

[[providers]]
id = "a"
model = "model-a"

[[providers]]
id = "b"
model = "model-b"
"#
        )
        .unwrap();

        let config = PipelineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.endpoint_url, "http://example.test/v1/chat/completions");
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].model, "model-b");
        // Unspecified fields keep their defaults.
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn test_config_file_missing() {
        let err = PipelineConfig::from_toml_file(std::path::Path::new("/nonexistent/quorum.toml"));
        assert!(matches!(err, Err(ConfigError::Io(_))));
    }
}
