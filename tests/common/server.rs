//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own fake engines, scratch
//! directory and catalog database.

use super::constants::*;
use super::fixtures::{create_engine_dir, create_test_catalog_db, ingester_ok, matcher_found};
use seektune::config::{AppConfig, CliConfig};
use seektune::orchestrator::RequestOrchestrator;
use seektune::server::{server::make_app, RequestsLoggingLevel, ServerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// What the spawned server is wired to.
pub struct TestServerOptions {
    /// Matcher script, `None` for a missing matcher
    pub matcher: Option<String>,
    /// Ingester script, `None` for a missing ingester
    pub ingester: Option<String>,
    /// Whether to configure the SQLite catalog
    pub with_catalog: bool,
    pub allow_local_paths: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            matcher: Some(matcher_found()),
            ingester: Some(ingester_ok()),
            with_catalog: true,
            allow_local_paths: false,
        }
    }
}

/// Test server instance
///
/// When dropped, the server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    // Private fields - keep resources alive until drop
    engine_dir: TempDir,
    scratch_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server with working engines and a catalog
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if fixtures can't be created, the config doesn't resolve, or the
    /// server doesn't become ready within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let engine_dir = create_engine_dir(options.matcher.as_deref(), options.ingester.as_deref())
            .expect("Failed to create engine dir");
        let scratch_dir = TempDir::new().expect("Failed to create scratch dir");

        let catalog_db = options.with_catalog.then(|| {
            create_test_catalog_db(engine_dir.path()).expect("Failed to create catalog db")
        });

        let cli = CliConfig {
            temp_dir: Some(scratch_dir.path().to_path_buf()),
            working_dir: Some(engine_dir.path().to_path_buf()),
            matcher: Some(PathBuf::from("./shazam")),
            ingester: Some(PathBuf::from("./add")),
            ffmpeg: Some(PathBuf::from("./ffmpeg")),
            catalog_db,
            ..Default::default()
        };
        let app_config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");
        let orchestrator =
            RequestOrchestrator::from_config(&app_config).expect("Failed to build orchestrator");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            allow_local_paths: options.allow_local_paths,
            ..Default::default()
        };
        let app = make_app(config, Arc::new(orchestrator)).expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            engine_dir,
            scratch_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Directory holding the fake engines and their logs
    pub fn engine_dir(&self) -> &Path {
        self.engine_dir.path()
    }

    /// Lines a fake engine appended to its log (`shazam.log`, `add.log`, `ffmpeg.log`)
    pub fn engine_log(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.engine_dir.path().join(name))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Number of entries left in the scratch directory
    pub fn leftovers(&self) -> usize {
        std::fs::read_dir(self.scratch_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Waits for the server to become ready by polling `/`
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
