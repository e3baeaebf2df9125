//! Generic web pages. Registered last; it claims anything that looks like text.

use std::collections::HashMap;

use url::Url;

use crate::error::{ExtractionError, Result};
use crate::html as markup;
use crate::traits::fetcher::{media_type, FetchedPage};
use crate::types::{ExtractedData, ExtractedKind, Extraction};

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

#[derive(Debug, Clone)]
pub struct HtmlStrategy {
    /// Cap on same-site links kept for crawl expansion
    pub max_links: usize,
}

impl Default for HtmlStrategy {
    fn default() -> Self {
        Self { max_links: 50 }
    }
}

impl HtmlStrategy {
    pub fn can_handle(&self, _url: &Url, headers: &HashMap<String, String>) -> bool {
        match media_type(headers) {
            None => true,
            Some(mt) => HTML_TYPES.contains(&mt.as_str()) || mt == "text/plain",
        }
    }

    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        let is_html = page
            .media_type()
            .map(|mt| HTML_TYPES.contains(&mt.as_str()))
            .unwrap_or(true);

        if !is_html {
            if !page.has_content() {
                return Err(ExtractionError::Malformed {
                    url: page.final_url.clone(),
                    reason: "empty text document".into(),
                });
            }
            let data = ExtractedData::article(page.final_url.clone(), "web", page.body.trim());
            return Ok(Extraction::Data(data));
        }

        let base = Url::parse(&page.final_url).map_err(|_| ExtractionError::Malformed {
            url: page.final_url.clone(),
            reason: "unparseable URL".into(),
        })?;
        let body = &page.body;

        let title = markup::extract_meta(body, "og:title").or_else(|| markup::extract_title(body));
        let text = markup::html_to_markdown(body);
        let audio_url = markup::extract_meta(body, "og:audio")
            .and_then(|audio| base.join(&audio).ok())
            .map(|u| u.to_string());

        if text.is_empty() && audio_url.is_none() {
            return Err(ExtractionError::Malformed {
                url: page.final_url.clone(),
                reason: "page has no readable text".into(),
            });
        }

        let mut links = markup::same_site_links(&base, body);
        links.truncate(self.max_links);

        let platform = if audio_url.is_some() { "podcast" } else { "web" };
        let mut data = ExtractedData::article(page.final_url.clone(), platform, text)
            .with_title(title)
            .with_author(markup::extract_meta(body, "author"))
            .with_published_at(markup::extract_meta(body, "article:published_time"))
            .with_image_url(markup::extract_meta(body, "og:image"))
            .with_links(links)
            .with_feed_links(markup::extract_feed_links(&base, body));

        if let Some(audio_url) = audio_url {
            data = data.with_kind(ExtractedKind::Audio {
                audio_url,
                duration_seconds: None,
            });
        }

        Ok(Extraction::Data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html><head>
          <title>Fallback title</title>
          <meta property="og:title" content="Real title">
          <meta property="og:image" content="https://cdn.example.com/cover.jpg">
          <meta name="author" content="Jane Doe">
          <link rel="alternate" type="application/rss+xml" href="/rss">
        </head><body>
          <h1>Real title</h1>
          <p>First paragraph.</p>
          <a href="/next-post">Next</a>
          <a href="https://other.org/">Elsewhere</a>
        </body></html>
    "#;

    #[test]
    fn test_can_handle_text_like_types() {
        let url = Url::parse("https://example.com/").unwrap();
        let ct = |v: &str| HashMap::from([("content-type".to_string(), v.to_string())]);

        assert!(HtmlStrategy::default().can_handle(&url, &ct("text/html")));
        assert!(HtmlStrategy::default().can_handle(&url, &ct("text/plain")));
        assert!(HtmlStrategy::default().can_handle(&url, &HashMap::new()));
        assert!(!HtmlStrategy::default().can_handle(&url, &ct("image/png")));
    }

    #[test]
    fn test_extract_article() {
        let page = FetchedPage::new("https://example.com/post", ARTICLE).with_content_type("text/html");
        let Extraction::Data(data) = HtmlStrategy::default().extract(&page).unwrap() else {
            panic!("expected data");
        };

        assert_eq!(data.platform, "web");
        assert_eq!(data.title.as_deref(), Some("Real title"));
        assert_eq!(data.author.as_deref(), Some("Jane Doe"));
        assert_eq!(data.image_url.as_deref(), Some("https://cdn.example.com/cover.jpg"));
        assert_eq!(data.links, vec!["https://example.com/next-post".to_string()]);
        assert_eq!(data.feed_links, vec!["https://example.com/rss".to_string()]);
        assert!(data.text.contains("First paragraph."));
    }

    #[test]
    fn test_og_audio_marks_podcast_episode() {
        let html = r#"<meta property="og:audio" content="/media/ep1.mp3"><p>Show notes</p>"#;
        let page = FetchedPage::new("https://pod.example.com/ep1", html).with_content_type("text/html");

        let Extraction::Data(data) = HtmlStrategy::default().extract(&page).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(
            data.kind,
            ExtractedKind::Audio {
                audio_url: "https://pod.example.com/media/ep1.mp3".into(),
                duration_seconds: None
            }
        );
        assert_eq!(data.platform, "podcast");
    }

    #[test]
    fn test_link_cap() {
        let html = (0..10)
            .map(|i| format!(r#"<a href="/p{i}">p{i}</a>"#))
            .collect::<String>();
        let page = FetchedPage::new("https://example.com/", html).with_content_type("text/html");
        let strategy = HtmlStrategy { max_links: 3 };

        let Extraction::Data(data) = strategy.extract(&page).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(data.links.len(), 3);
    }

    #[test]
    fn test_blank_page_is_malformed() {
        let page = FetchedPage::new("https://example.com/", "<html><body></body></html>")
            .with_content_type("text/html");
        assert!(HtmlStrategy::default().extract(&page).is_err());
    }
}
