//! HTML page adapter.
//!
//! Each [`SiteProfile`] is an ordered list of CSS selector strategies. The
//! first strategy that matches at least one element wins, and its matches
//! are turned into articles in document order.

use crate::error::ParseFailure;
use crate::models::{Article, SiteProfile};
use crate::utils::{normalize_whitespace, truncate_chars};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Generic containers qualify when their class mentions an article or post.
static ARTICLE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(article|post)").expect("static regex"));

/// Body text kept from a generic container.
const GENERIC_CONTENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Every matching anchor is an article; its text is both title and body.
    Anchors(&'static str),
    /// Every matching container holding a heading and a link is an article.
    Cards(CardLayout),
}

#[derive(Debug, Clone, Copy)]
struct CardLayout {
    container: &'static str,
    heading: &'static str,
    /// Keep only containers whose `class` matches [`ARTICLE_CLASS`].
    class_filter: bool,
    body: CardBody,
}

#[derive(Debug, Clone, Copy)]
enum CardBody {
    /// Repeat the heading text.
    Heading,
    /// Whitespace-normalized container text, capped in characters.
    ContainerText(usize),
}

fn strategies(profile: SiteProfile) -> &'static [Strategy] {
    const PROPMODO: &[Strategy] = &[
        Strategy::Anchors(r#"a[href*="/news/"]"#),
        Strategy::Anchors(r#"a[href*="/article/"]"#),
        Strategy::Anchors("article a"),
        Strategy::Anchors(".post-title a"),
        Strategy::Anchors("h2 a"),
        Strategy::Anchors("h3 a"),
    ];
    const PROPTECHZONE: &[Strategy] = &[Strategy::Anchors(r#"a.card, a[href*="/companies/"]"#)];
    const BUILTIN: &[Strategy] = &[Strategy::Cards(CardLayout {
        container: "div.article-card",
        heading: "h2",
        class_filter: false,
        body: CardBody::Heading,
    })];
    const GENERIC: &[Strategy] = &[Strategy::Cards(CardLayout {
        container: "article, div",
        heading: "h1, h2, h3",
        class_filter: true,
        body: CardBody::ContainerText(GENERIC_CONTENT_CHARS),
    })];

    match profile {
        SiteProfile::Propmodo => PROPMODO,
        SiteProfile::Proptechzone => PROPTECHZONE,
        SiteProfile::Builtin => BUILTIN,
        SiteProfile::Generic => GENERIC,
    }
}

fn selector(css: &str) -> Result<Selector, ParseFailure> {
    Selector::parse(css).map_err(|_| ParseFailure::Selector {
        selector: css.to_string(),
    })
}

/// Extract up to `max_items` articles from `html` fetched from `page_url`.
pub fn parse_page(
    html: &str,
    page_url: &str,
    source: &str,
    profile: SiteProfile,
    max_items: usize,
) -> Result<Vec<Article>, ParseFailure> {
    if max_items == 0 {
        return Ok(Vec::new());
    }
    let document = Html::parse_document(html);

    for (index, strategy) in strategies(profile).iter().enumerate() {
        let found = match strategy {
            Strategy::Anchors(css) => anchors(&document, css, page_url, source, max_items)?,
            Strategy::Cards(layout) => cards(&document, layout, page_url, source, max_items)?,
        };
        if !found.is_empty() {
            debug!(?profile, strategy = index, count = found.len(), "Selector strategy matched");
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

fn anchors(
    document: &Html,
    css: &str,
    page_url: &str,
    source: &str,
    max_items: usize,
) -> Result<Vec<Article>, ParseFailure> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .take(max_items)
        .map(|a| {
            let text = element_text(a);
            Article {
                title: text.clone(),
                url: resolve_link(page_url, a.value().attr("href").unwrap_or_default()),
                published: String::new(),
                source: source.to_string(),
                content: text,
            }
        })
        .collect())
}

fn cards(
    document: &Html,
    layout: &CardLayout,
    page_url: &str,
    source: &str,
    max_items: usize,
) -> Result<Vec<Article>, ParseFailure> {
    let container_sel = selector(layout.container)?;
    let heading_sel = selector(layout.heading)?;
    let link_sel = selector("a")?;

    let mut articles = Vec::new();
    for container in document.select(&container_sel) {
        if articles.len() >= max_items {
            break;
        }
        if layout.class_filter {
            let class = container.value().attr("class").unwrap_or_default();
            if !ARTICLE_CLASS.is_match(class) {
                continue;
            }
        }
        let (Some(heading), Some(link)) = (
            container.select(&heading_sel).next(),
            container.select(&link_sel).next(),
        ) else {
            continue;
        };

        let title = element_text(heading);
        let content = match layout.body {
            CardBody::Heading => title.clone(),
            CardBody::ContainerText(max) => {
                truncate_chars(&element_text(container), max).to_string()
            }
        };
        articles.push(Article {
            title,
            url: resolve_link(page_url, link.value().attr("href").unwrap_or_default()),
            published: String::new(),
            source: source.to_string(),
            content,
        });
    }
    Ok(articles)
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Make `href` absolute relative to the page it was found on.
///
/// - `/path` is prefixed with the page's scheme and host
/// - `//host/path` borrows the page's scheme
/// - `http…` is kept as is
/// - anything else is appended to the page URL
pub fn resolve_link(page_url: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http") {
        return href.to_string();
    }
    let parsed = Url::parse(page_url).ok();
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = parsed.as_ref().map(|u| u.scheme()).unwrap_or("https");
        return format!("{scheme}://{rest}");
    }
    if href.starts_with('/') {
        let origin = match &parsed {
            Some(u) if u.has_host() => u.origin().ascii_serialization(),
            _ => page_url.trim_end_matches('/').to_string(),
        };
        return format!("{origin}{href}");
    }
    format!("{}/{}", page_url.trim_end_matches('/'), href)
}
