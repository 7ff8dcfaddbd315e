//! Quorum — multi-provider LLM ensemble pipeline.
//!
//! Forwards one user query to several independent chat-completion backends,
//! caches answers for repeated identical queries, reformats each raw answer
//! into a numbered reasoning trail, picks a winner by frequency voting plus
//! a multi-metric quality score, and normalizes the winning text once.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Orchestrator                       │
//! │  auth gate → cache lookup → fan-out → select → clean  │
//! └───────┬──────────────┬───────────────┬───────────────┘
//!         │              │               │
//!         ▼              ▼               ▼
//!   ┌──────────┐   ┌───────────┐   ┌───────────────┐
//!   │QueryCache│   │Dispatcher │   │  Selection    │
//!   │ TTL+LRU  │   │ N× reqwest│   │ self-consist. │
//!   └──────────┘   └───────────┘   │ / step-based  │
//!                                  └───────────────┘
//! ```
//!
//! Provider calls within one fan-out run concurrently; everything else is
//! synchronous computation over request-scoped data. A failed provider call
//! degrades to an `Error:`-prefixed sentinel candidate instead of aborting
//! the batch, and sentinel candidates compete in selection like any other —
//! an all-failed batch still produces an answer (with the sentinel token
//! stripped but the failure detail intact).

pub mod cache;
pub mod cleaner;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod reasoning;
pub mod selection;

// Re-export key cache types
pub use cache::{Clock, ManualClock, QueryCache, SystemClock};

// Re-export key provider types
pub use provider::{
    Candidate, ChatMessage, ChatRequest, Dispatcher, GenerationParams, HttpProviderClient,
    ProviderClient, ProviderError, ProviderResult, ProviderSpec, ERROR_SENTINEL,
};

// Re-export key formatting types
pub use reasoning::{FormattedCandidate, COT_HEADER};

// Re-export key selection types
pub use selection::{
    BaselineEstimator, FixedBaseline, GrammarMetric, QualityScorer, ScoredCandidate,
    SelectionResult, SelectionStrategy, SelfConsistencySelector, SimilarityMetric,
    StepCountSelector, UniformBaseline, DEFAULT_KEYWORDS,
};

// Re-export key pipeline types
pub use pipeline::{
    AllowAll, Authenticator, ConfigError, LoggedRequest, LoggedResponse, MemoryLog, NoopLog,
    Orchestrator, PipelineConfig, PipelineError, PipelineResult, RequestLog,
};
