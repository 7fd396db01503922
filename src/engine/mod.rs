//! Out-of-process calls to the fingerprint engine and interpretation of what
//! it reports.
//!
//! The matcher is called as `<matcher> <audio>`, the ingester as
//! `<ingester> <audio> <title> <artist> [source_id]`. Both may need the
//! catalog connection string, which is injected into the child environment.

mod interpreter;
mod invoker;

pub use interpreter::{interpret_ingest, interpret_match, EngineProtocol, IngestResult, MatchResult};
pub use invoker::{
    resolve_executable, EngineInvocation, EngineInvoker, EngineOutcome, EngineSettings,
    EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, EXIT_TIMED_OUT,
};
