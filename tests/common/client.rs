//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn file_part(bytes: Vec<u8>, filename: &str) -> Part {
        Part::bytes(bytes).file_name(filename.to_string())
    }

    // ========================================================================
    // Info
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Identify
    // ========================================================================

    /// POST /v1/identify
    pub async fn identify_upload(&self, bytes: Vec<u8>, filename: &str) -> Response {
        let form = Form::new().part("file", Self::file_part(bytes, filename));
        self.client
            .post(format!("{}/v1/identify", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Identify request failed")
    }

    /// POST /v1/identify/record
    pub async fn identify_record(&self, duration_secs: Option<f64>) -> Response {
        let body = match duration_secs {
            Some(secs) => json!({ "duration_secs": secs }),
            None => json!({}),
        };
        self.client
            .post(format!("{}/v1/identify/record", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Record request failed")
    }

    // ========================================================================
    // Add
    // ========================================================================

    /// POST /v1/songs with an uploaded file
    pub async fn add_song(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        title: &str,
        artist: &str,
        source_id: Option<&str>,
    ) -> Response {
        let mut form = Form::new()
            .part("file", Self::file_part(bytes, filename))
            .text("title", title.to_string())
            .text("artist", artist.to_string());
        if let Some(source_id) = source_id {
            form = form.text("source_id", source_id.to_string());
        }
        self.send_add(form).await
    }

    /// POST /v1/songs referencing a file already on the server
    pub async fn add_song_from_path(&self, path: &str, title: &str, artist: &str) -> Response {
        let form = Form::new()
            .text("path", path.to_string())
            .text("title", title.to_string())
            .text("artist", artist.to_string());
        self.send_add(form).await
    }

    async fn send_add(&self, form: Form) -> Response {
        self.client
            .post(format!("{}/v1/songs", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Add request failed")
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// GET /v1/catalog
    pub async fn get_catalog(&self) -> Response {
        self.client
            .get(format!("{}/v1/catalog", self.base_url))
            .send()
            .await
            .expect("Catalog request failed")
    }
}
