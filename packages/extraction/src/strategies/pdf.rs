//! PDF documents identified by content type or file extension.
//!
//! The fetcher is responsible for turning the document into text; a fetcher
//! that cannot leaves the body empty and the pipeline decides what to do with
//! a text-less document.

use std::collections::HashMap;

use url::Url;

use super::path_extension;
use crate::error::{ExtractionError, Result};
use crate::traits::fetcher::{media_type, FetchedPage};
use crate::types::{ExtractedData, ExtractedKind, Extraction};

const PDF: &str = "application/pdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfStrategy;

impl PdfStrategy {
    pub fn can_handle(&self, url: &Url, headers: &HashMap<String, String>) -> bool {
        match media_type(headers) {
            Some(mt) if mt == PDF => true,
            Some(mt) if mt != "application/octet-stream" => false,
            _ => path_extension(url).as_deref() == Some("pdf"),
        }
    }

    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        if page.byte_len == 0 {
            return Err(ExtractionError::Malformed {
                url: page.final_url.clone(),
                reason: "empty PDF response".into(),
            });
        }

        let title = page
            .header("x-document-title")
            .map(str::to_string)
            .or_else(|| {
                Url::parse(&page.final_url).ok().and_then(|u| {
                    u.path_segments()
                        .and_then(|mut s| s.next_back().map(str::to_string))
                })
            })
            .filter(|t| !t.is_empty());

        let data = ExtractedData::article(page.final_url.clone(), "pdf", page.body.trim())
            .with_kind(ExtractedKind::Document {
                media_type: PDF.to_string(),
                byte_len: page.byte_len,
            })
            .with_title(title);

        Ok(Extraction::Data(data))
    }
}
