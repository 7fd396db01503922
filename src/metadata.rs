use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Descriptive data attached to a song submitted for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    title: String,
    artist: String,
    /// Optional external identifier (e.g. a YouTube video id) forwarded to the ingester.
    source_id: Option<String>,
}

impl SongMetadata {
    /// Builds metadata, rejecting blank titles or artists.
    pub fn new(title: &str, artist: &str) -> PipelineResult<Self> {
        let title = title.trim();
        let artist = artist.trim();
        if title.is_empty() {
            return Err(PipelineError::Validation("title must not be empty".to_string()));
        }
        if artist.is_empty() {
            return Err(PipelineError::Validation("artist must not be empty".to_string()));
        }
        Ok(Self {
            title: title.to_string(),
            artist: artist.to_string(),
            source_id: None,
        })
    }

    /// Re-checks the invariants `new` enforces; deserialized values skip `new`.
    pub fn validate(&self) -> PipelineResult<()> {
        Self::new(&self.title, &self.artist).map(|_| ())
    }

    pub fn with_source_id(mut self, source_id: Option<&str>) -> Self {
        self.source_id = source_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }
}
