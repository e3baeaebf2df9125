//! Extraction strategies.
//!
//! The set of strategies is closed: each one is a variant of [`Strategy`] with
//! the same two capabilities. `can_handle` looks only at the URL and the
//! response headers, and `extract` is a pure function of the fetched page, so
//! dispatch is deterministic for a given registration order.
//!
//! Domain-specific strategies must be registered ahead of the generic ones;
//! [`default_strategies`] returns them in that order.

mod arxiv;
mod audio;
mod html;
mod pdf;
mod pubmed;

use std::collections::HashMap;

use url::Url;

pub use arxiv::ArxivStrategy;
pub use audio::AudioStrategy;
pub use html::HtmlStrategy;
pub use pdf::PdfStrategy;
pub use pubmed::PubMedStrategy;

use crate::error::Result;
use crate::traits::fetcher::FetchedPage;
use crate::types::Extraction;

/// One extraction strategy.
#[derive(Debug, Clone)]
pub enum Strategy {
    Arxiv(ArxivStrategy),
    PubMed(PubMedStrategy),
    Audio(AudioStrategy),
    Pdf(PdfStrategy),
    Html(HtmlStrategy),
}

impl Strategy {
    /// Stable name used in logs and extraction provenance.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Arxiv(_) => "arxiv",
            Strategy::PubMed(_) => "pubmed",
            Strategy::Audio(_) => "audio",
            Strategy::Pdf(_) => "pdf",
            Strategy::Html(_) => "html",
        }
    }

    /// Whether this strategy claims the URL given the response headers.
    ///
    /// `headers` must have lowercased names.
    pub fn can_handle(&self, url: &Url, headers: &HashMap<String, String>) -> bool {
        match self {
            Strategy::Arxiv(s) => s.can_handle(url, headers),
            Strategy::PubMed(s) => s.can_handle(url, headers),
            Strategy::Audio(s) => s.can_handle(url, headers),
            Strategy::Pdf(s) => s.can_handle(url, headers),
            Strategy::Html(s) => s.can_handle(url, headers),
        }
    }

    /// Extract data from a fetched page, or name another URL to dispatch on.
    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        match self {
            Strategy::Arxiv(s) => s.extract(page),
            Strategy::PubMed(s) => s.extract(page),
            Strategy::Audio(s) => s.extract(page),
            Strategy::Pdf(s) => s.extract(page),
            Strategy::Html(s) => s.extract(page),
        }
    }
}

/// All built-in strategies, domain-specific first.
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::Arxiv(ArxivStrategy),
        Strategy::PubMed(PubMedStrategy),
        Strategy::Audio(AudioStrategy),
        Strategy::Pdf(PdfStrategy),
        Strategy::Html(HtmlStrategy::default()),
    ]
}

/// Final path segment's extension, lowercased.
pub(crate) fn path_extension(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Host without a leading `www.`.
pub(crate) fn bare_host(url: &Url) -> &str {
    let host = url.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: &str) -> HashMap<String, String> {
        HashMap::from([("content-type".to_string(), content_type.to_string())])
    }

    fn first_match(url: &str, content_type: &str) -> &'static str {
        let url = Url::parse(url).unwrap();
        default_strategies()
            .iter()
            .find(|s| s.can_handle(&url, &headers(content_type)))
            .map(|s| s.name())
            .unwrap_or("none")
    }

    #[test]
    fn test_domain_strategies_win_over_generic() {
        assert_eq!(first_match("https://arxiv.org/abs/2401.00001", "text/html"), "arxiv");
        assert_eq!(
            first_match("https://pubmed.ncbi.nlm.nih.gov/12345678/", "text/html"),
            "pubmed"
        );
    }

    #[test]
    fn test_generic_strategies_by_content_type() {
        assert_eq!(first_match("https://example.com/paper", "application/pdf"), "pdf");
        assert_eq!(first_match("https://example.com/ep1", "audio/mpeg"), "audio");
        assert_eq!(first_match("https://example.com/post", "text/html; charset=utf-8"), "html");
        assert_eq!(first_match("https://example.com/blob", "application/zip"), "none");
    }

    #[test]
    fn test_path_extension() {
        let url = Url::parse("https://example.com/files/Report.PDF?x=1").unwrap();
        assert_eq!(path_extension(&url).as_deref(), Some("pdf"));

        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(path_extension(&url), None);
    }
}
