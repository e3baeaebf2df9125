//! Output types produced by extraction strategies.

use serde::{Deserialize, Serialize};

/// What kind of material a strategy found at a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedKind {
    /// Readable text (web article, paper abstract, full text)
    Article,
    /// Audio episode that needs transcription before summarizing
    Audio {
        audio_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<u64>,
    },
    /// Binary document (e.g. PDF) whose text came from the fetcher, if at all
    Document { media_type: String, byte_len: usize },
}

/// Normalized extraction output handed back to the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// URL the data was extracted from, after delegation and redirects
    pub url: String,

    /// Source tag (e.g. "arxiv", "pubmed", "web")
    pub platform: String,

    pub kind: ExtractedKind,

    pub title: Option<String>,

    /// Markdown or plain text body, empty when none is available yet
    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    /// Preview image advertised by the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Same-site links, used for crawl expansion
    #[serde(default)]
    pub links: Vec<String>,

    /// RSS/Atom feeds advertised by the page
    #[serde(default)]
    pub feed_links: Vec<String>,
}

impl ExtractedData {
    /// Create an article extraction with no optional fields.
    pub fn article(
        url: impl Into<String>,
        platform: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            platform: platform.into(),
            kind: ExtractedKind::Article,
            title: None,
            text: text.into(),
            author: None,
            published_at: None,
            image_url: None,
            links: Vec::new(),
            feed_links: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ExtractedKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_published_at(mut self, published_at: Option<String>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    pub fn with_feed_links(mut self, feed_links: Vec<String>) -> Self {
        self.feed_links = feed_links;
        self
    }

    /// Whether the material is audio and must be transcribed first.
    pub fn is_audio(&self) -> bool {
        matches!(self.kind, ExtractedKind::Audio { .. })
    }
}

/// Result of running one strategy against one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The strategy produced usable data.
    Data(ExtractedData),
    /// The real content lives elsewhere; dispatch again on this URL.
    Delegate(String),
}
