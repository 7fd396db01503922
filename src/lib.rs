//! SeekTune front-end orchestrator library
//!
//! Turns recordings, uploads and local files into the inputs the external
//! fingerprinting engines expect, runs them, and interprets what they report.
//! Both binaries (`seektune-server`, `seektune-cli`) are thin layers over
//! [`RequestOrchestrator`].

pub mod audio;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod transient;

// Re-export commonly used types for convenience
pub use audio::{AudioArtifact, AudioFormat, AudioSource, CaptureRequest};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use engine::{IngestResult, MatchResult};
pub use error::{PipelineError, PipelineResult};
pub use metadata::SongMetadata;
pub use orchestrator::{RequestOrchestrator, Stage, WorkflowReport};
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
