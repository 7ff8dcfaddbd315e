//! Provider fan-out — chat-completion wire types and concurrent dispatch.
//!
//! All configured providers receive the same prompt through one
//! chat-completions endpoint. Each call is an independent request/response
//! exchange with its own timeout; a failed call never aborts the batch.
//! Failures are converted exactly once, at this boundary, into ordinary
//! [`Candidate`] text carrying the `Error:` sentinel prefix, so everything
//! downstream operates on a uniform candidate shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Sentinel prefix marking a candidate that carries failure detail instead
/// of a provider answer. Matched case-insensitively by the cleaner.
pub const ERROR_SENTINEL: &str = "Error:";

/// Error type for provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// One configured provider: a stable identifier plus the model name sent
/// on the wire. Declaration order in the config fixes candidate order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Stable identifier used to correlate candidates back to providers.
    pub id: String,
    /// Model name passed in the request body.
    pub model: String,
}

/// One message in a chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Sampling and length parameters shared by every provider call in a batch.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

/// One provider's unmodified answer to a query. Created once per dispatch,
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider_id: String,
    pub raw_text: String,
}

impl Candidate {
    /// Whether this candidate carries failure detail instead of an answer.
    pub fn is_error(&self) -> bool {
        self.raw_text
            .trim_start()
            .get(..ERROR_SENTINEL.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ERROR_SENTINEL))
    }
}

/// A backend that can answer one chat-completion request.
///
/// The `Result` is the tagged success/failure type at the HTTP boundary;
/// the dispatcher converts failures into sentinel candidates so callers
/// never see a provider error as an `Err`.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> ProviderResult<String>;
}

/// `ProviderClient` over a single chat-completions endpoint.
pub struct HttpProviderClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpProviderClient {
    /// Build a client with a per-call timeout. `api_key`, when present, is
    /// sent as a bearer token.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn complete(&self, request: &ChatRequest) -> ProviderResult<String> {
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let mut req = self.http.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("no choices[0].message.content".to_string())
            })
    }
}

/// Fans one prompt out to every configured provider concurrently.
pub struct Dispatcher {
    client: Arc<dyn ProviderClient>,
    providers: Vec<ProviderSpec>,
    params: GenerationParams,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        providers: Vec<ProviderSpec>,
        params: GenerationParams,
    ) -> Self {
        Self {
            client,
            providers,
            params,
        }
    }

    /// Send `messages` to every provider and collect one [`Candidate`] per
    /// provider, in declaration order regardless of completion order.
    ///
    /// Calls run concurrently, so batch latency is bounded by the slowest
    /// provider. A failed call degrades to a sentinel candidate
    /// (`"Error: <detail>"`) rather than aborting the batch; the returned
    /// list length always equals the configured provider count.
    pub async fn dispatch(&self, messages: &[ChatMessage]) -> Vec<Candidate> {
        let calls = self.providers.iter().map(|spec| {
            let request = ChatRequest {
                model: spec.model.clone(),
                messages: messages.to_vec(),
                max_tokens: self.params.max_tokens,
                temperature: self.params.temperature,
                top_p: self.params.top_p,
            };
            let client = self.client.clone();
            let provider_id = spec.id.clone();

            async move {
                match client.complete(&request).await {
                    Ok(text) => {
                        debug!(provider = %provider_id, chars = text.len(), "provider answered");
                        Candidate {
                            provider_id,
                            raw_text: text,
                        }
                    }
                    Err(e) => {
                        warn!(provider = %provider_id, error = %e, "provider call failed");
                        Candidate {
                            raw_text: format!("{ERROR_SENTINEL} {e}"),
                            provider_id,
                        }
                    }
                }
            }
        });

        join_all(calls).await
    }
}
