//! PubMed citation pages.
//!
//! When the citation links to a free PubMed Central copy the strategy
//! delegates there, and the generic HTML strategy extracts the full text.
//! Otherwise the abstract on the citation page is used.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::bare_host;
use crate::error::{ExtractionError, Result};
use crate::html::{self, re};
use crate::traits::fetcher::FetchedPage;
use crate::types::{ExtractedData, Extraction};

// Matched anywhere in the body; the PMC id also turns up outside anchors
static PMC_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"/pmc/articles/(PMC\d+)"));

#[derive(Debug, Clone, Copy, Default)]
pub struct PubMedStrategy;

impl PubMedStrategy {
    pub fn can_handle(&self, url: &Url, _headers: &HashMap<String, String>) -> bool {
        bare_host(url) == "pubmed.ncbi.nlm.nih.gov"
    }

    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        let body = &page.body;

        if let Some(pmc_id) = PMC_LINK.captures(body).and_then(|cap| cap.get(1)) {
            return Ok(Extraction::Delegate(format!(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/{}/",
                pmc_id.as_str()
            )));
        }

        let abstract_text = html::select_html(body, "div.abstract-content")
            .map(|inner| html::html_to_markdown(&inner))
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ExtractionError::Malformed {
                url: page.final_url.clone(),
                reason: "no abstract or PMC full text on PubMed page".into(),
            })?;

        let title = html::extract_meta(body, "citation_title").or_else(|| html::extract_title(body));
        let authors = html::extract_meta_all(body, "citation_author");
        let text = match &title {
            Some(title) => format!("# {title}\n\n{abstract_text}"),
            None => abstract_text,
        };

        let data = ExtractedData::article(page.final_url.clone(), "pubmed", text)
            .with_title(title)
            .with_author((!authors.is_empty()).then(|| authors.join(", ")))
            .with_published_at(html::extract_meta(body, "citation_date"));

        Ok(Extraction::Data(data))
    }
}
