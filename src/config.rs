//! Runtime settings.
//!
//! Every value has a default, so the pipeline runs with no config file at
//! all. A YAML file can override any subset:
//!
//! ```yaml
//! fetch:
//!   timeout_secs: 5
//! analyzer:
//!   model: gpt-4o-mini
//!   max_retries: 5
//! relevance:
//!   threshold: 2
//! sources:
//!   - name: inman
//!     url: https://www.inman.com/feed/
//!     kind: feed
//! ```

use crate::error::ConfigError;
use crate::models::{SiteProfile, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const FEED_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const PAGE_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Top-level settings for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub analyzer: AnalyzerSettings,
    pub relevance: RelevanceSettings,
    pub selection: SelectionSettings,
    pub cache: CacheSettings,
    pub batch: BatchSettings,
    pub sources: Vec<SourceConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            analyzer: AnalyzerSettings::default(),
            relevance: RelevanceSettings::default(),
            selection: SelectionSettings::default(),
            cache: CacheSettings::default(),
            batch: BatchSettings::default(),
            sources: default_sources(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, filling gaps with defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let settings = Self::from_yaml_str(&raw).map_err(|source| ConfigError::Yaml {
            path: display,
            source,
        })?;
        info!(sources = settings.sources.len(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Default watch list: three feeds and two pages.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::feed("techcrunch_main", "https://techcrunch.com/feed/"),
        SourceConfig::feed("inman", "https://www.inman.com/feed/"),
        SourceConfig::feed("crunchbase_news", "https://news.crunchbase.com/feed/"),
        SourceConfig::page("propmodo", "https://www.propmodo.com/", SiteProfile::Propmodo),
        SourceConfig::page(
            "proptechzone",
            "https://www.proptechzone.com/",
            SiteProfile::Proptechzone,
        ),
    ]
}

/// Content fetching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Hard per-request timeout.
    pub timeout_secs: u64,
    /// How long a fetched body is reused for the same URL.
    pub cache_ttl_secs: u64,
    pub feed_user_agent: String,
    pub page_user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            cache_ttl_secs: 300,
            feed_user_agent: FEED_USER_AGENT.to_string(),
            page_user_agent: PAGE_USER_AGENT.to_string(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Language-model call knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Credential; `OPENAI_API_KEY` is used when unset.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Total attempts made while the API keeps signalling a rate limit.
    pub max_retries: usize,
    /// Base backoff; attempt `n` (from 0) waits `retry_delay * 2^n`.
    pub retry_delay_secs: u64,
    /// Optional random extra wait per retry, in milliseconds.
    pub jitter_ms: u64,
    /// Per-request HTTP timeout for the API call.
    pub request_timeout_secs: u64,
    /// Label that selects the industry-wide prompt template.
    pub industry_label: String,
    /// Content is cut to this many characters before prompting.
    pub max_content_chars: usize,
    /// Capacity of the in-process memo table.
    pub memo_capacity: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            max_retries: 3,
            retry_delay_secs: 1,
            jitter_ms: 0,
            request_timeout_secs: 60,
            industry_label: "PropTech Industry".to_string(),
            max_content_chars: 2000,
            memo_capacity: 100,
        }
    }
}

impl AnalyzerSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceSettings {
    /// Distinct keyword matches needed to count as relevant.
    pub threshold: usize,
    /// Phrases added to the built-in vocabulary.
    pub extra_keywords: Vec<String>,
}

impl Default for RelevanceSettings {
    fn default() -> Self {
        Self {
            threshold: 1,
            extra_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Articles taken from each source when selecting relevant content.
    pub per_source: usize,
    /// Floor on the number of articles returned when any exist.
    pub min_results: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            per_source: 3,
            min_results: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Append-only JSON-lines file backing the result cache.
    pub path: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: "ai_summary_cache.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Analyses in flight at once.
    pub concurrency: usize,
    /// Time budget for a single article's analysis.
    pub task_timeout_secs: u64,
    /// Upper bound on analyses per report.
    pub max_analyses: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            task_timeout_secs: 30,
            max_analyses: 8,
        }
    }
}

impl BatchSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}
