//! Shared constants for end-to-end tests
//!
//! When the fake engines or the fixture catalog change, update only this file.

// ============================================================================
// Timeouts
// ============================================================================

/// How long a single test request may take
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for a freshly spawned server
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness probes
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

// ============================================================================
// Fake engine output
// ============================================================================

/// What the fake matcher prints on a hit
pub const MATCH_DETAILS: &str = "Song: X by Y";

/// What the fake ingester prints on success
pub const INGEST_DETAILS: &str = "Song added";

/// What the failing ingester prints on stderr
pub const INGEST_REJECTION: &str = "song already indexed";

// ============================================================================
// Fixture catalog
// ============================================================================

pub const SONG_1_ID: &str = "1";
pub const SONG_1_TITLE: &str = "Bohemian Rhapsody";
pub const SONG_1_ARTIST: &str = "Queen";

pub const SONG_2_ID: &str = "2";
pub const SONG_2_TITLE: &str = "Untitled Demo";
