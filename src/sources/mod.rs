//! Source adapters: response text in, [`Article`]s out.
//!
//! | Kind | Module | Parser |
//! |------|--------|--------|
//! | RSS feed | [`feed`] | `quick-xml` event stream |
//! | HTML page | [`page`] | `scraper` selector strategies per [`SiteProfile`] |
//!
//! Adapters never fail outward. Malformed input is logged and yields an
//! empty list, so one broken source cannot affect the others.
//!
//! [`SiteProfile`]: crate::models::SiteProfile

pub mod feed;
pub mod page;

use crate::config::FetchSettings;
use crate::fetcher::{feed_headers, page_headers};
use crate::models::{Article, SourceConfig, SourceKind};
use reqwest::header::HeaderMap;
use tracing::warn;

/// Parse `body` fetched from `source` with the adapter its kind selects.
pub fn parse_source(source: &SourceConfig, body: &str, max_items: usize) -> Vec<Article> {
    let parsed = match source.kind {
        SourceKind::Feed => feed::parse_feed(body, &source.name, max_items),
        SourceKind::Page { profile } => {
            page::parse_page(body, &source.url, &source.name, profile, max_items)
        }
    };
    parsed.unwrap_or_else(|e| {
        warn!(source = %source.name, error = %e, "Could not parse source; treating as empty");
        Vec::new()
    })
}

/// Request headers appropriate for `kind`.
pub fn headers_for(kind: SourceKind, settings: &FetchSettings) -> HeaderMap {
    match kind {
        SourceKind::Feed => feed_headers(&settings.feed_user_agent),
        SourceKind::Page { .. } => page_headers(&settings.page_user_agent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteProfile;
    use reqwest::header::USER_AGENT;

    #[test]
    fn test_dispatch_by_kind() {
        let feed = SourceConfig::feed("inman", "https://www.inman.com/feed/");
        let xml = "<rss><channel><item><title>Rent control vote</title></item></channel></rss>";
        let articles = parse_source(&feed, xml, 5);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "inman");

        let page = SourceConfig::page("propmodo", "https://www.propmodo.com/", SiteProfile::Propmodo);
        let html = r#"<a href="/news/a">Zoning reform</a>"#;
        let articles = parse_source(&page, html, 5);
        assert_eq!(articles[0].url, "https://www.propmodo.com/news/a");
    }

    #[test]
    fn test_malformed_feed_is_empty() {
        let feed = SourceConfig::feed("broken", "https://example.com/feed");
        assert!(parse_source(&feed, "<rss><item><title>x</wrong></item>", 5).is_empty());
    }

    #[test]
    fn test_headers_for_kind() {
        let settings = FetchSettings::default();
        let h = headers_for(SourceKind::Feed, &settings);
        assert_eq!(h[USER_AGENT], settings.feed_user_agent.as_str());
        let h = headers_for(
            SourceKind::Page {
                profile: SiteProfile::Generic,
            },
            &settings,
        );
        assert_eq!(h[USER_AGENT], settings.page_user_agent.as_str());
    }
}
