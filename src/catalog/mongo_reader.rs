//! Catalog reader over the engines' MongoDB store (`songs` collection).
//!
//! Uses the same connection string the engines get through the environment.

use super::{CatalogEntry, CatalogListing, CatalogReader};
use crate::config::Secret;
use crate::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_DATABASE: &str = "song-recognition";
const SONGS_COLLECTION: &str = "songs";

pub struct MongoCatalogReader {
    uri: Secret,
    database: Option<String>,
    timeout: Duration,
}

impl MongoCatalogReader {
    /// # Arguments
    /// * `uri` - Connection string, as handed to the engines
    /// * `database` - Database name; falls back to the one in the URI, then [`DEFAULT_DATABASE`]
    /// * `timeout_sec` - Connect and server selection timeout in seconds
    pub fn new(uri: Secret, database: Option<String>, timeout_sec: u64) -> Self {
        Self {
            uri,
            database,
            timeout: Duration::from_secs(timeout_sec),
        }
    }

    async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
        let mut options = ClientOptions::parse(self.uri.expose())
            .await
            .context("Invalid catalog connection string")?;
        options.connect_timeout = Some(self.timeout);
        options.server_selection_timeout = Some(self.timeout);
        options.app_name = Some("seektune".to_string());
        let client = Client::with_options(options).context("Failed to create catalog client")?;

        let database = match &self.database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };
        let collection = database.collection::<Document>(SONGS_COLLECTION);

        let mut cursor = collection
            .find(doc! {})
            .await
            .context("Failed to query catalog store")?;
        let mut entries = Vec::new();
        while cursor.advance().await.context("Failed to read catalog store")? {
            let document = cursor.deserialize_current()?;
            match entry_from_document(&document) {
                Some(entry) => entries.push(entry),
                None => debug!("Skipping catalog document without title or key"),
            }
        }
        Ok(entries)
    }
}

fn entry_from_document(document: &Document) -> Option<CatalogEntry> {
    let id = match document.get("_id") {
        Some(Bson::Int32(id)) => id.to_string(),
        Some(Bson::Int64(id)) => id.to_string(),
        Some(Bson::String(id)) => id.clone(),
        Some(Bson::ObjectId(id)) => id.to_hex(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    CatalogEntry::from_parts(
        id,
        document.get_str("title").ok(),
        document.get_str("artist").ok(),
        document.get_str("key").ok(),
    )
}

#[async_trait]
impl CatalogReader for MongoCatalogReader {
    async fn list_entries(&self) -> CatalogListing {
        let started = Instant::now();
        let result = self.fetch().await;
        metrics::record_catalog_read("mongo", started.elapsed());

        match result {
            Ok(entries) => CatalogListing::ok(entries),
            Err(e) => {
                let reason = self.uri.redact_in(&format!("{:#}", e));
                warn!("Catalog read from {} failed: {}", self.describe(), reason);
                CatalogListing::unavailable(reason)
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "mongo:{}",
            self.database.as_deref().unwrap_or("<uri default>")
        )
    }
}
