//! Error taxonomy for the fetch–filter–cache–analyze pipeline.
//!
//! Failures local to one source or one article are recovered where they
//! occur (a failed fetch is zero articles, a failed analysis is an
//! `"Analysis failed: …"` string). These types keep that recovery typed
//! until the pipeline boundary.

use std::time::Duration;
use thiserror::Error;

/// A network-level failure while retrieving one source.
///
/// Callers treat this as "zero articles from this source"; it is logged and
/// never propagated past the aggregator.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("could not read body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Malformed feed or HTML. Adapters swallow this into an empty article list.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("invalid selector `{selector}`")]
    Selector { selector: String },
}

/// Failure reported by the language-model backend for a single call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no API credential configured (set OPENAI_API_KEY)")]
    MissingCredential,

    #[error("Rate limit exceeded. Please try again in a few minutes.")]
    RateLimited,

    #[error(
        "API quota exceeded. Please check your OpenAI account billing and quota status at https://platform.openai.com/account/billing"
    )]
    QuotaExceeded,

    #[error("Authentication failed. Please check your API key configuration.")]
    Authentication,

    #[error("API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Transport(String),

    #[error("API error: could not decode response: {0}")]
    Decode(String),

    #[error("API error: completion contained no text")]
    EmptyCompletion,
}

impl ApiError {
    /// Only throttling is worth retrying; everything else fails fast.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimited)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Why an analysis produced no summary.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("Rate limit exceeded after {attempts} attempts. Please try again in a few minutes.")]
    RateLimitExhausted { attempts: usize },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl AnalysisError {
    /// Render the error in the success-shaped form handed to callers.
    pub fn to_boundary_string(&self) -> String {
        format!("Analysis failed: {self}")
    }
}

/// Failure loading settings from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
