//! Data models shared by the pipeline and its callers.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`Article`]: one normalized item produced by a source adapter
//! - [`CacheEntry`]: one memoized analysis in the result cache
//! - [`SourceConfig`]: where a source lives and which adapter parses it
//! - Outward shapes: [`AnalyzedArticle`], [`IntelReport`], [`ConnectionStatus`]
//!
//! Everything that crosses the library boundary is plain `serde` data so a
//! web layer can serialize it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single article retrieved from a feed or a page.
///
/// `title` and `source` are always set. `content` may be empty, and `url` is
/// empty for items whose source exposes no link. `published` is kept in the
/// source's own date format and is never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// The headline (or anchor text for page sources).
    pub title: String,
    /// Canonical link, possibly empty.
    pub url: String,
    /// Source-native publish marker, possibly empty.
    pub published: String,
    /// Identifier of the source that produced this article.
    pub source: String,
    /// Best-effort body or summary text.
    pub content: String,
}

impl Article {
    /// Text the relevance filter looks at: title and body joined by a space.
    pub fn relevance_text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }

    /// Text handed to the analyzer for this article.
    pub fn analysis_text(&self) -> String {
        format!("Title: {}\nContent: {}", self.title, self.content)
    }
}

/// A memoized analysis, keyed by `(content_hash, source_label)`.
///
/// Entries are append-only: several may share a key, and lookups return the
/// most recently created one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 of the exact analyzed text.
    pub content_hash: String,
    /// Label the content was analyzed under; part of the key.
    pub source_label: String,
    /// The stored analysis text.
    pub summary: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// HTML layout families the page adapter knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteProfile {
    /// propmodo.com: news/article anchors, falling back to heading links.
    Propmodo,
    /// proptechzone.com: company cards.
    Proptechzone,
    /// builtin.com: `div.article-card` blocks with an `h2` headline.
    Builtin,
    /// Any page whose article/post containers carry a heading and a link.
    Generic,
}

/// How a configured source is fetched and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// An RSS item list.
    Feed,
    /// An HTML page read with the given site profile.
    Page { profile: SiteProfile },
}

/// One configured source: a stable label, an endpoint and its adapter kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier, copied into [`Article::source`].
    pub name: String,
    /// Endpoint to fetch.
    pub url: String,
    /// Adapter selection.
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceConfig {
    pub fn feed(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            kind: SourceKind::Feed,
        }
    }

    pub fn page(name: &str, url: &str, profile: SiteProfile) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            kind: SourceKind::Page { profile },
        }
    }
}

/// Result of an analysis with the result cache consulted first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    /// Analysis text, or an `"Analysis failed: …"` string.
    pub summary: String,
    /// `true` when the summary came from the result cache.
    pub cached: bool,
}

/// One article together with its analysis, as returned in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedArticle {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published: String,
    /// Analysis text, or an `"Analysis failed: …"` string.
    pub summary: String,
    pub cached: bool,
}

/// A batch of analyzed articles produced in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelReport {
    /// How many articles the aggregator selected.
    pub total_articles_found: usize,
    /// How many analyses finished (successfully or not).
    pub analyses_completed: usize,
    /// How many selected articles did not pass the relevance filter.
    pub backfilled: usize,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    pub intelligence: Vec<AnalyzedArticle>,
}

/// Outcome of a connectivity check against the language-model API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Success { response: String },
    Error { error: String },
}

impl ConnectionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectionStatus::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            title: "Proptech funding round".to_string(),
            url: "https://example.com/a".to_string(),
            published: "Mon, 06 May 2025 10:00:00 GMT".to_string(),
            source: "inman".to_string(),
            content: "A startup raised money.".to_string(),
        }
    }

    #[test]
    fn test_article_texts() {
        let a = article();
        assert_eq!(a.relevance_text(), "Proptech funding round A startup raised money.");
        assert_eq!(
            a.analysis_text(),
            "Title: Proptech funding round\nContent: A startup raised money."
        );
    }

    #[test]
    fn test_source_config_yaml() {
        let yaml = r#"
- name: inman
  url: https://www.inman.com/feed/
  kind: feed
- name: propmodo
  url: https://www.propmodo.com/
  kind: page
  profile: propmodo
"#;
        let sources: Vec<SourceConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sources[0], SourceConfig::feed("inman", "https://www.inman.com/feed/"));
        assert_eq!(
            sources[1],
            SourceConfig::page("propmodo", "https://www.propmodo.com/", SiteProfile::Propmodo)
        );
    }

    #[test]
    fn test_connection_status_serialization() {
        let ok = ConnectionStatus::Success {
            response: "AI connected!".to_string(),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["response"], "AI connected!");

        let err = ConnectionStatus::Error {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert!(!err.is_success());
    }
}
