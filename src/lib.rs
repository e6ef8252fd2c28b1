//! # PropTech Intel
//!
//! A fetch–filter–cache–analyze pipeline for real-estate technology news.
//!
//! ## Pipeline
//!
//! 1. **Fetch**: every configured source (RSS feed or HTML page) is fetched
//!    concurrently with a hard timeout and a short-lived response cache
//! 2. **Parse**: a per-kind adapter turns the response into [`Article`]s
//! 3. **Filter**: a keyword [`RelevanceFilter`] keeps topical articles,
//!    backfilling with others when too few pass
//! 4. **Analyze**: a language model summarizes each article into fixed
//!    sections, behind a content-addressed result cache and rate-limit
//!    backoff
//!
//! [`IntelService`] is the entry point for callers such as a web layer; it
//! only returns plain, serializable data.

pub mod aggregator;
pub mod analyzer;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod outputs;
pub mod relevance;
pub mod service;
pub mod sources;
pub mod utils;

pub use aggregator::{Aggregator, Selection};
pub use analyzer::Analyzer;
pub use config::Settings;
pub use models::{AnalyzedArticle, Article, CachedAnalysis, ConnectionStatus, IntelReport, SourceConfig};
pub use relevance::{RelevanceFilter, is_relevant};
pub use service::{DefaultIntelService, IntelService};
