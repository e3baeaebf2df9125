//! arXiv abstract pages.
//!
//! `/abs/<id>` pages carry the title, authors and abstract as citation meta
//! tags and a `blockquote.abstract`. Direct `/pdf/<id>` links are delegated to
//! the abstract page so the pipeline always works from readable text.

use std::collections::HashMap;

use url::Url;

use super::bare_host;
use crate::error::{ExtractionError, Result};
use crate::html;
use crate::traits::fetcher::FetchedPage;
use crate::types::{ExtractedData, Extraction};

const HOSTS: &[&str] = &["arxiv.org", "export.arxiv.org"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ArxivStrategy;

impl ArxivStrategy {
    pub fn can_handle(&self, url: &Url, _headers: &HashMap<String, String>) -> bool {
        HOSTS.contains(&bare_host(url))
            && (url.path().starts_with("/abs/") || url.path().starts_with("/pdf/"))
    }

    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        let url = Url::parse(&page.final_url).map_err(|_| ExtractionError::Malformed {
            url: page.final_url.clone(),
            reason: "unparseable URL".into(),
        })?;

        if let Some(id) = url.path().strip_prefix("/pdf/") {
            let id = id.trim_end_matches(".pdf").trim_end_matches('/');
            if id.is_empty() {
                return Err(ExtractionError::Malformed {
                    url: page.final_url.clone(),
                    reason: "missing paper id".into(),
                });
            }
            return Ok(Extraction::Delegate(format!("https://arxiv.org/abs/{id}")));
        }

        let body = &page.body;
        let title = html::extract_meta(body, "citation_title").or_else(|| html::extract_title(body));
        let abstract_text = html::select_html(body, "blockquote.abstract")
            .map(|inner| html::html_to_markdown(&inner))
            .map(|text| text.trim_start_matches("Abstract:").trim().to_string())
            .filter(|text| !text.is_empty());

        let Some(abstract_text) = abstract_text else {
            return Err(ExtractionError::Malformed {
                url: page.final_url.clone(),
                reason: "no abstract on arXiv page".into(),
            });
        };

        let authors = html::extract_meta_all(body, "citation_author");
        let text = match &title {
            Some(title) => format!("# {title}\n\n{abstract_text}"),
            None => abstract_text,
        };

        let data = ExtractedData::article(page.final_url.clone(), "arxiv", text)
            .with_title(title)
            .with_author((!authors.is_empty()).then(|| authors.join(", ")))
            .with_published_at(
                html::extract_meta(body, "citation_date")
                    .or_else(|| html::extract_meta(body, "citation_online_date")),
            );

        Ok(Extraction::Data(data))
    }
}
