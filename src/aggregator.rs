//! Concurrent multi-source aggregation.
//!
//! [`Aggregator::scrape_all`] launches one fetch+parse task per configured
//! source and joins every one of them, whatever each one's outcome. A source
//! that times out, answers with an error status, returns garbage or even
//! panics contributes zero articles and is logged; its siblings are
//! unaffected.
//!
//! All tasks share one cooperative scheduler. For callers outside async
//! code, the `*_blocking` bridges drive the same futures on a private
//! runtime, offloading to a worker thread when a runtime is already running
//! on the calling thread.

use crate::config::{FetchSettings, SelectionSettings, Settings};
use crate::error::FetchFailure;
use crate::fetcher::FetchPage;
use crate::models::{Article, SourceConfig};
use crate::relevance::RelevanceFilter;
use crate::sources::{headers_for, parse_source};
use futures::FutureExt;
use futures::future::join_all;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use tokio::runtime::{Builder, Handle};
use tracing::{error, info, instrument, warn};

/// Articles chosen for analysis plus how they were chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Relevant articles first, then any backfill.
    pub articles: Vec<Article>,
    /// How many of `articles` passed the relevance filter.
    pub relevant: usize,
    /// How many of `articles` were added without passing it.
    pub backfilled: usize,
}

impl Selection {
    /// `true` when the filter alone could not meet the minimum.
    pub fn is_backfilled(&self) -> bool {
        self.backfilled > 0
    }
}

/// Fans fetch+parse out over every configured source.
pub struct Aggregator<F> {
    sources: Vec<SourceConfig>,
    fetcher: F,
    filter: RelevanceFilter,
    fetch: FetchSettings,
    selection: SelectionSettings,
}

impl<F: FetchPage> Aggregator<F> {
    pub fn new(
        sources: Vec<SourceConfig>,
        fetcher: F,
        filter: RelevanceFilter,
        fetch: FetchSettings,
        selection: SelectionSettings,
    ) -> Self {
        Self {
            sources,
            fetcher,
            filter,
            fetch,
            selection,
        }
    }

    /// Build an aggregator over `settings.sources` with the configured filter.
    pub fn from_settings(settings: &Settings, fetcher: F) -> Self {
        let filter = RelevanceFilter::with_extra_keywords(
            &settings.relevance.extra_keywords,
            settings.relevance.threshold,
        );
        Self::new(
            settings.sources.clone(),
            fetcher,
            filter,
            settings.fetch.clone(),
            settings.selection.clone(),
        )
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn filter(&self) -> &RelevanceFilter {
        &self.filter
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    async fn run_source(
        &self,
        source: &SourceConfig,
        max_items: usize,
    ) -> Result<Vec<Article>, FetchFailure> {
        let headers = headers_for(source.kind, &self.fetch);
        let body = self
            .fetcher
            .fetch(&source.url, &headers, self.fetch.timeout())
            .await?;
        Ok(parse_source(source, &body, max_items))
    }

    /// Fetch and parse one source, isolating failures and panics.
    async fn isolated(&self, source: &SourceConfig, max_items: usize) -> Vec<Article> {
        match AssertUnwindSafe(self.run_source(source, max_items))
            .catch_unwind()
            .await
        {
            Ok(Ok(articles)) => {
                info!(source = %source.name, count = articles.len(), "Scraped source");
                articles
            }
            Ok(Err(e)) => {
                warn!(source = %source.name, url = %source.url, error = %e, "Fetch failed; source contributes nothing");
                Vec::new()
            }
            Err(_) => {
                error!(source = %source.name, "Source task panicked; source contributes nothing");
                Vec::new()
            }
        }
    }

    /// Up to `max_per_source` articles from every source.
    ///
    /// Every source runs concurrently, so one slow source costs at most its
    /// own fetch timeout. Items from one source keep that source's order.
    /// Nothing is promised about the order across sources.
    ///
    /// # Arguments
    ///
    /// * `max_per_source` - Cap applied to each source's parsed items
    ///
    /// # Returns
    ///
    /// The concatenated articles. Sources that failed or panicked
    /// contribute nothing; the call itself never fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let aggregator = Aggregator::from_settings(&settings, Fetcher::new(settings.fetch.cache_ttl())?);
    /// let articles = aggregator.scrape_all(10).await;
    /// ```
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_all(&self, max_per_source: usize) -> Vec<Article> {
        let tasks = self
            .sources
            .iter()
            .map(|source| self.isolated(source, max_per_source));
        let articles: Vec<Article> = join_all(tasks).await.into_iter().flatten().collect();
        info!(
            sources = self.sources.len(),
            count = articles.len(),
            "Aggregated articles"
        );
        articles
    }

    /// Scrape a single configured source by name. `None` if no source has
    /// that name.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_source(&self, name: &str, max_items: usize) -> Option<Vec<Article>> {
        let source = self.sources.iter().find(|s| s.name == name)?;
        Some(self.isolated(source, max_items).await)
    }

    /// Relevant articles, topped up with non-relevant ones when too few pass.
    ///
    /// Returns at most `max(max_articles, min_results)` items and at least
    /// `min(min_results, available)`.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_relevant_selection(&self, max_articles: usize) -> Selection {
        let all = self.scrape_all(self.selection.per_source).await;
        select(all, &self.filter, max_articles, self.selection.min_results)
    }

    /// Flat form of [`scrape_relevant_selection`](Self::scrape_relevant_selection).
    pub async fn scrape_relevant_articles(&self, max_articles: usize) -> Vec<Article> {
        self.scrape_relevant_selection(max_articles).await.articles
    }
}

impl<F: FetchPage + Sync> Aggregator<F> {
    /// [`scrape_all`](Self::scrape_all) for synchronous callers.
    pub fn scrape_all_blocking(&self, max_per_source: usize) -> io::Result<Vec<Article>> {
        block_on_worker(|| self.scrape_all(max_per_source))
    }

    /// [`scrape_relevant_articles`](Self::scrape_relevant_articles) for
    /// synchronous callers.
    pub fn scrape_relevant_articles_blocking(&self, max_articles: usize) -> io::Result<Vec<Article>> {
        block_on_worker(|| self.scrape_relevant_articles(max_articles))
    }
}

/// Partition `all` by relevance and apply the backfill policy.
fn select(
    all: Vec<Article>,
    filter: &RelevanceFilter,
    max_articles: usize,
    min_results: usize,
) -> Selection {
    let (relevant, rest): (Vec<Article>, Vec<Article>) = all
        .into_iter()
        .partition(|a| filter.is_relevant(&a.relevance_text()));

    // Relevant overflow past `max_articles` tops up before anything else.
    let mut relevant = relevant.into_iter();
    let mut articles: Vec<Article> = relevant.by_ref().take(max_articles).collect();
    articles.extend(relevant.take(min_results.saturating_sub(articles.len())));
    let relevant_count = articles.len();
    articles.extend(rest.into_iter().take(min_results.saturating_sub(articles.len())));
    articles.truncate(max_articles.max(min_results));

    let backfilled = articles.len() - relevant_count;
    if backfilled > 0 {
        warn!(
            relevant = relevant_count,
            backfilled,
            "Too few relevant articles; backfilled with unfiltered content"
        );
    }
    Selection {
        articles,
        relevant: relevant_count,
        backfilled,
    }
}

/// Drive a future to completion from synchronous code.
///
/// Inside a running runtime the future is moved to a scoped worker thread
/// with its own current-thread runtime, since blocking the caller's runtime
/// thread on itself would deadlock.
fn block_on_worker<T, Fut, M>(make: M) -> io::Result<T>
where
    M: FnOnce() -> Fut + Send,
    Fut: Future<Output = T>,
    T: Send,
{
    let run = move || -> io::Result<T> {
        let rt = Builder::new_current_thread().enable_all().build()?;
        Ok(rt.block_on(make()))
    };
    if Handle::try_current().is_ok() {
        std::thread::scope(|scope| {
            scope
                .spawn(run)
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("aggregation worker panicked")))
        })
    } else {
        run()
    }
}
