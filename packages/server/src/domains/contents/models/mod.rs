pub mod content;
pub mod metadata;

pub use content::{Content, ContentStatus, ContentType};
pub use metadata::{
    ArticleDetails, ContentDetails, ContentMetadata, DeepDive, NewsDetails, PodcastDetails,
    Provenance, StructuredSummary,
};
