//! HTTP retrieval for feed and page sources.
//!
//! [`Fetcher`] performs one GET per call with a hard timeout and a
//! short-lived, URL-keyed [`ResponseCache`]. Any network or protocol problem
//! comes back as a [`FetchFailure`]; there is no retry at this layer.

use crate::error::FetchFailure;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA, USER_AGENT};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Something that can turn a URL into response text.
///
/// The aggregator only talks to this trait, so tests can substitute canned
/// responses for the network.
pub trait FetchPage {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<String, FetchFailure>;
}

/// Request headers for RSS endpoints.
pub fn feed_headers(user_agent: &str) -> HeaderMap {
    let mut h = base_headers(user_agent);
    h.insert(
        ACCEPT,
        HeaderValue::from_static("application/rss+xml, application/xml, text/xml, */*"),
    );
    h
}

/// Request headers for HTML pages.
pub fn page_headers(user_agent: &str) -> HeaderMap {
    let mut h = base_headers(user_agent);
    h.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    h
}

fn base_headers(user_agent: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    let ua = HeaderValue::from_str(user_agent).unwrap_or_else(|_| {
        warn!(user_agent, "Invalid User-Agent; using default");
        HeaderValue::from_static(crate::config::FEED_USER_AGENT)
    });
    h.insert(USER_AGENT, ua);
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    h
}

/// URL-keyed response bodies that expire after a fixed time-to-live.
///
/// Shared by every concurrent fetch of one [`Fetcher`]. Entries are
/// independent and overwritable, so a plain mutex around a map suffices.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh body for `url`, dropping it if it has expired.
    pub fn get(&self, url: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(url) {
            Some((stored, body)) if stored.elapsed() < self.ttl => Some(body.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, url: &str, body: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(url.to_string(), (Instant::now(), body));
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// reqwest-backed [`FetchPage`] with a response cache.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    cache: ResponseCache,
}

impl Fetcher {
    /// Build a fetcher whose cached bodies live for `cache_ttl`.
    pub fn new(cache_ttl: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, cache_ttl))
    }

    pub fn with_client(client: Client, cache_ttl: Duration) -> Self {
        Self {
            client,
            cache: ResponseCache::new(cache_ttl),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

impl FetchPage for Fetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<String, FetchFailure> {
        if let Some(body) = self.cache.get(url) {
            debug!(bytes = body.len(), "Serving cached response");
            return Ok(body);
        }

        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_failure(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchFailure::Timeout {
                    url: url.to_string(),
                    timeout,
                }
            } else {
                FetchFailure::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        debug!(bytes = body.len(), status = status.as_u16(), "Fetched");
        self.cache.insert(url, body.clone());
        Ok(body)
    }
}

fn transport_failure(url: &str, timeout: Duration, e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchFailure::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
