//! Direct links to audio files (podcast episodes).

use std::collections::HashMap;

use url::Url;

use super::path_extension;
use crate::error::Result;
use crate::traits::fetcher::{media_type, FetchedPage};
use crate::types::{ExtractedData, ExtractedKind, Extraction};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "wav", "flac"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AudioStrategy;

impl AudioStrategy {
    pub fn can_handle(&self, url: &Url, headers: &HashMap<String, String>) -> bool {
        match media_type(headers) {
            Some(mt) if mt.starts_with("audio/") => true,
            // Some hosts serve episodes as octet-stream
            Some(mt) if mt != "application/octet-stream" => false,
            _ => path_extension(url)
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false),
        }
    }

    pub fn extract(&self, page: &FetchedPage) -> Result<Extraction> {
        let duration_seconds = page
            .header("x-content-duration")
            .and_then(|d| d.parse::<f64>().ok())
            .map(|d| d.round() as u64);

        let title = Url::parse(&page.final_url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty());

        let data = ExtractedData::article(page.final_url.clone(), "podcast", "")
            .with_kind(ExtractedKind::Audio {
                audio_url: page.final_url.clone(),
                duration_seconds,
            })
            .with_title(title);

        Ok(Extraction::Data(data))
    }
}
