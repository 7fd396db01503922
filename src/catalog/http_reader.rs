//! Catalog reader for a document store exposed over HTTP.
//!
//! The endpoint returns the `songs` collection as JSON, either as a bare array
//! or wrapped in `{"documents": [...]}` / `{"songs": [...]}`.

use super::{CatalogEntry, CatalogListing, CatalogReader};
use crate::metrics;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct HttpCatalogReader {
    client: reqwest::Client,
    url: String,
}

impl HttpCatalogReader {
    /// # Arguments
    /// * `url` - Full URL of the songs listing (e.g., "http://localhost:8080/songs")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(url: String, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }

    async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to connect to catalog store")?;

        if !response.status().is_success() {
            anyhow::bail!("Catalog store responded with status {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse catalog response")?;
        parse_documents(&body)
    }
}

fn parse_documents(body: &Value) -> Result<Vec<CatalogEntry>> {
    let documents = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("documents")
            .or_else(|| map.get("songs"))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("catalog response has no document list"))?,
        _ => return Err(anyhow!("unexpected catalog response shape")),
    };

    Ok(documents
        .iter()
        .filter_map(|doc| {
            let entry = CatalogEntry::from_parts(
                document_id(doc),
                doc.get("title").and_then(Value::as_str),
                doc.get("artist").and_then(Value::as_str),
                doc.get("key").and_then(Value::as_str),
            );
            if entry.is_none() {
                debug!("Skipping catalog document without title or key");
            }
            entry
        })
        .collect())
}

/// Accepts string, numeric and extended-JSON (`{"$oid": ...}`) identifiers.
fn document_id(doc: &Value) -> String {
    let raw = doc.get("_id").or_else(|| doc.get("id"));
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Object(map)) => map
            .get("$oid")
            .or_else(|| map.get("$numberLong"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl CatalogReader for HttpCatalogReader {
    async fn list_entries(&self) -> CatalogListing {
        let started = Instant::now();
        let result = self.fetch().await;
        metrics::record_catalog_read("http", started.elapsed());
        match result {
            Ok(entries) => CatalogListing::ok(entries),
            Err(e) => {
                warn!("Catalog read from {} failed: {:#}", self.url, e);
                CatalogListing::unavailable(format!("{:#}", e))
            }
        }
    }

    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }
}
