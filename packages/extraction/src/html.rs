//! HTML helpers shared by the HTML-flavoured strategies.
//!
//! Parsing goes through `scraper` selectors and markdown conversion through
//! `htmd`. Every helper takes the raw body so strategies stay stateless.

use htmd::options::{HeadingStyle, Options};
use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

pub(crate) fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Convert HTML to markdown, dropping scripts, styles and the document head.
pub fn html_to_markdown(html: &str) -> String {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "head", "iframe"])
        .options(Options {
            heading_style: HeadingStyle::Atx,
            ..Default::default()
        })
        .build();

    converter
        .convert(html)
        .unwrap_or_else(|_| {
            // Fallback: strip tags and return plain text
            let document = Html::parse_fragment(html);
            document.root_element().text().collect::<String>()
        })
        .trim()
        .to_string()
}

/// Inner HTML of the first element matching `css`.
pub fn select_html(html: &str, css: &str) -> Option<String> {
    let sel = selector(css)?;
    Html::parse_document(html)
        .select(&sel)
        .next()
        .map(|el| el.inner_html())
}

/// Extract the `<title>` text.
pub fn extract_title(html: &str) -> Option<String> {
    let sel = selector("title")?;
    Html::parse_document(html)
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract absolute links from anchor `href` attributes, skipping anchors and pseudo-schemes.
pub fn extract_links(base_url: &Url, html: &str) -> Vec<String> {
    let Some(sel) = selector("a[href]") else {
        return vec![];
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for href in document.select(&sel).filter_map(|el| el.value().attr("href")) {
        let href = href.trim();
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(resolved) = base_url.join(href) {
            let resolved = resolved.to_string();
            if !links.contains(&resolved) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Links on the same host as `base_url`, excluding the page itself.
pub fn same_site_links(base_url: &Url, html: &str) -> Vec<String> {
    let base_host = base_url.host_str().unwrap_or_default();
    extract_links(base_url, html)
        .into_iter()
        .filter(|link| {
            Url::parse(link)
                .map(|u| {
                    u.host_str() == Some(base_host)
                        && u.path() != base_url.path()
                        && matches!(u.scheme(), "http" | "https")
                })
                .unwrap_or(false)
        })
        .collect()
}

/// RSS/Atom feeds advertised via `<link rel="alternate" type="application/rss+xml">`.
pub fn extract_feed_links(base_url: &Url, html: &str) -> Vec<String> {
    let Some(sel) = selector("link[rel][href]") else {
        return vec![];
    };

    let document = Html::parse_document(html);
    let mut feeds = Vec::new();

    for el in document.select(&sel) {
        let el = el.value();
        let rel = el.attr("rel").unwrap_or_default().to_ascii_lowercase();
        let kind = el.attr("type").unwrap_or_default().to_ascii_lowercase();

        if !rel.split_whitespace().any(|r| r == "alternate") {
            continue;
        }
        if !(kind.contains("rss") || kind.contains("atom")) {
            continue;
        }
        let Some(href) = el.attr("href") else { continue };
        if let Ok(resolved) = base_url.join(href.trim()) {
            let resolved = resolved.to_string();
            if !feeds.contains(&resolved) {
                feeds.push(resolved);
            }
        }
    }

    feeds
}

/// Content of `<meta property=.. content=..>` or `<meta name=.. content=..>`.
pub fn extract_meta(html: &str, key: &str) -> Option<String> {
    extract_meta_all(html, key).into_iter().next()
}

/// Every `content` value for a repeated meta key, in document order.
pub fn extract_meta_all(html: &str, key: &str) -> Vec<String> {
    let Some(sel) = selector("meta[content]") else {
        return vec![];
    };

    Html::parse_document(html)
        .select(&sel)
        .filter_map(|el| {
            let el = el.value();
            let name = el.attr("property").or_else(|| el.attr("name"))?;
            if !name.eq_ignore_ascii_case(key) {
                return None;
            }
            el.attr("content")
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        })
        .collect()
}
