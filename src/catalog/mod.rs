//! Read-only access to the external catalog store, for display.
//!
//! Stores either keep `title` and `artist` as separate fields or a single
//! composite key (see [`SongKey`]); readers accept both.

mod http_reader;
mod mongo_reader;
mod null_reader;
mod song_key;
mod sqlite_reader;

pub use http_reader::HttpCatalogReader;
pub use mongo_reader::{MongoCatalogReader, DEFAULT_DATABASE};
pub use null_reader::NullCatalogReader;
pub use song_key::{SongKey, KEY_SEPARATOR, UNKNOWN_ARTIST};
pub use sqlite_reader::SqliteCatalogReader;

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub artist: String,
}

impl CatalogEntry {
    /// Builds an entry from whichever representation the store used.
    pub fn from_parts(
        id: impl Into<String>,
        title: Option<&str>,
        artist: Option<&str>,
        key: Option<&str>,
    ) -> Option<Self> {
        let id = id.into();
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let artist = artist.map(str::trim).filter(|a| !a.is_empty());
        match (title, artist, key) {
            (Some(title), Some(artist), _) => Some(Self {
                id,
                title: title.to_string(),
                artist: artist.to_string(),
            }),
            (_, _, Some(key)) => {
                let parsed = SongKey::parse(key);
                Some(Self {
                    id,
                    title: parsed.title,
                    artist: parsed.artist,
                })
            }
            (Some(title), None, None) => Some(Self {
                id,
                title: title.to_string(),
                artist: UNKNOWN_ARTIST.to_string(),
            }),
            _ => None,
        }
    }
}

/// Result of a catalog read: never an `Err`, the failure rides along.
#[derive(Debug, Default)]
pub struct CatalogListing {
    pub entries: Vec<CatalogEntry>,
    pub error: Option<PipelineError>,
}

impl CatalogListing {
    pub fn ok(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            error: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            error: Some(PipelineError::StoreUnavailable(reason.into())),
        }
    }
}

/// Trait for catalog store backends.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Lists all indexed songs. Order is whatever the store returns.
    async fn list_entries(&self) -> CatalogListing;

    /// Short backend name for logs.
    fn describe(&self) -> String;
}
