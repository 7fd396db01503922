use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    pub frontend_dir_path: Option<String>,
    /// Upper bound for request bodies; uploads are validated again downstream.
    pub max_body_bytes: usize,
    /// Whether `POST /v1/songs` may reference a file already on the server.
    pub allow_local_paths: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            metrics_port: 9091,
            frontend_dir_path: None,
            max_body_bytes: 100 * 1024 * 1024,
            allow_local_paths: false,
        }
    }
}
