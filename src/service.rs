//! The pipeline facade a web layer (or the CLI) calls into.
//!
//! [`IntelService`] owns one [`Aggregator`], one [`Analyzer`] and one
//! [`SummaryStore`], and returns plain serializable data. Nothing here
//! returns an error: a failed analysis is an `"Analysis failed: …"` summary.

use crate::aggregator::{Aggregator, Selection};
use crate::analyzer::Analyzer;
use crate::api::{ChatBackend, OpenAiClient};
use crate::cache::{JsonlSummaryCache, SummaryStore};
use crate::config::{BatchSettings, Settings};
use crate::error::AnalysisError;
use crate::fetcher::{FetchPage, Fetcher};
use crate::models::{AnalyzedArticle, Article, CachedAnalysis, ConnectionStatus, IntelReport};
use crate::utils::truncate_for_log;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::error::Error;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Label used when an article carries no source.
const UNKNOWN_SOURCE: &str = "Unknown";

/// The production wiring: reqwest fetcher, OpenAI client, JSON-lines cache.
pub type DefaultIntelService = IntelService<Fetcher, OpenAiClient, JsonlSummaryCache>;

pub struct IntelService<F, B, S> {
    aggregator: Aggregator<F>,
    analyzer: Analyzer<B>,
    store: S,
    batch: BatchSettings,
}

impl DefaultIntelService {
    /// Wire up the production components from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, Box<dyn Error>> {
        let fetcher = Fetcher::new(settings.fetch.cache_ttl())?;
        let backend = OpenAiClient::from_settings(&settings.analyzer)?;
        Ok(Self::new(
            Aggregator::from_settings(settings, fetcher),
            Analyzer::new(backend, &settings.analyzer),
            JsonlSummaryCache::new(&settings.cache.path),
            settings.batch.clone(),
        ))
    }
}

impl<F, B, S> IntelService<F, B, S>
where
    F: FetchPage,
    B: ChatBackend,
    S: SummaryStore,
{
    pub fn new(aggregator: Aggregator<F>, analyzer: Analyzer<B>, store: S, batch: BatchSettings) -> Self {
        Self {
            aggregator,
            analyzer,
            store,
            batch,
        }
    }

    pub fn aggregator(&self) -> &Aggregator<F> {
        &self.aggregator
    }

    pub fn analyzer(&self) -> &Analyzer<B> {
        &self.analyzer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn scrape_relevant_articles(&self, max_articles: usize) -> Vec<Article> {
        self.aggregator.scrape_relevant_articles(max_articles).await
    }

    pub async fn scrape_relevant_selection(&self, max_articles: usize) -> Selection {
        self.aggregator.scrape_relevant_selection(max_articles).await
    }

    pub async fn scrape_all(&self, max_per_source: usize) -> Vec<Article> {
        self.aggregator.scrape_all(max_per_source).await
    }

    /// Analyze without consulting the result cache.
    pub async fn analyze(&self, content: &str, label: &str) -> String {
        self.analyzer.analyze(content, label).await
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        self.analyzer.test_connection().await
    }

    pub async fn get_cached_summary(&self, content: &str, label: &str) -> Option<String> {
        self.store.get(content, label).await
    }

    pub async fn set_cached_summary(&self, content: &str, label: &str, summary: &str) {
        self.store.put(content, label, summary).await
    }

    /// Analyze with the result cache as a lookaside. Only successful
    /// analyses are written back.
    #[instrument(level = "info", skip(self, content))]
    pub async fn analyze_cached(&self, content: &str, label: &str) -> CachedAnalysis {
        if let Some(summary) = self.store.get(content, label).await {
            info!(content = %truncate_for_log(content, 50), "Using cached summary");
            return CachedAnalysis {
                summary,
                cached: true,
            };
        }
        let summary = match self.analyzer.try_analyze(content, label).await {
            Ok(summary) => {
                self.store.put(content, label, &summary).await;
                summary
            }
            Err(e) => e.to_boundary_string(),
        };
        CachedAnalysis {
            summary,
            cached: false,
        }
    }

    /// Analyze one article within the per-task time budget.
    async fn analyze_article(&self, article: &Article) -> AnalyzedArticle {
        let label = if article.source.is_empty() {
            UNKNOWN_SOURCE
        } else {
            article.source.as_str()
        };
        let content = article.analysis_text();
        let budget = self.batch.task_timeout();

        let result = match timeout(budget, self.analyze_cached(&content, label)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(source = %label, title = %truncate_for_log(&article.title, 50), ?budget, "Analysis timed out");
                CachedAnalysis {
                    summary: AnalysisError::TimedOut(budget).to_boundary_string(),
                    cached: false,
                }
            }
        };

        AnalyzedArticle {
            title: article.title.clone(),
            source: article.source.clone(),
            url: article.url.clone(),
            published: article.published.clone(),
            summary: result.summary,
            cached: result.cached,
        }
    }

    /// Select relevant articles and analyze the first `batch.max_analyses`
    /// of them, `batch.concurrency` at a time.
    #[instrument(level = "info", skip(self))]
    pub async fn intel_report(&self, max_articles: usize) -> IntelReport {
        let selection = self.aggregator.scrape_relevant_selection(max_articles).await;
        let to_analyze = selection.articles.len().min(self.batch.max_analyses);

        let intelligence: Vec<AnalyzedArticle> = stream::iter(&selection.articles[..to_analyze])
            .map(|article| self.analyze_article(article))
            .buffer_unordered(self.batch.concurrency.max(1))
            .collect()
            .await;

        info!(
            found = selection.articles.len(),
            analyzed = intelligence.len(),
            backfilled = selection.backfilled,
            "Intelligence report ready"
        );

        IntelReport {
            total_articles_found: selection.articles.len(),
            analyses_completed: intelligence.len(),
            backfilled: selection.backfilled,
            generated_at: Utc::now(),
            intelligence,
        }
    }
}
