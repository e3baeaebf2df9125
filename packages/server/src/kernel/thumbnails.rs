//! Thumbnail lookup from page preview metadata.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use extraction::{html, Fetcher};
use tracing::debug;
use url::Url;

use super::traits::BaseThumbnailService;
use crate::domains::contents::Content;

const IMAGE_META_KEYS: &[&str] = &["og:image", "og:image:url", "twitter:image"];

/// Uses the preview image found at extraction time, or re-reads the page's
/// OpenGraph and Twitter card tags.
pub struct OpenGraphThumbnails {
    fetcher: Arc<dyn Fetcher>,
}

impl OpenGraphThumbnails {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl BaseThumbnailService for OpenGraphThumbnails {
    async fn thumbnail_for(&self, content: &Content) -> Result<Option<String>> {
        if let Some(image) = &content.metadata.image_url {
            return Ok(Some(image.clone()));
        }

        let page_url = content
            .metadata
            .provenance
            .as_ref()
            .map(|p| p.final_url.as_str())
            .unwrap_or(&content.url);

        let page = self.fetcher.fetch(page_url).await?;
        let Ok(base) = Url::parse(&page.final_url) else {
            return Ok(None);
        };

        let image = IMAGE_META_KEYS
            .iter()
            .find_map(|key| html::extract_meta(&page.body, key))
            .and_then(|image| base.join(&image).ok())
            .map(|u| u.to_string());

        debug!(content_id = %content.id, found = image.is_some(), "thumbnail lookup");
        Ok(image)
    }
}
