//! Test fixtures: fake engine executables and a small catalog database
//!
//! The fake engines are shell scripts that log their arguments next to
//! themselves, so tests can assert on what the pipeline passed them.

use super::constants::*;
use rusqlite::Connection;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Copies its `-i` input to its last argument, like a lossless ffmpeg.
///
/// When recording, `-i` names the capture device ("default"), which the
/// fixture provides as a WAV file in the working directory.
pub const FAKE_FFMPEG: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/ffmpeg.log"
in=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"
  out="$a"
done
cp "$in" "$out"
"#;

pub fn matcher_found() -> String {
    format!(
        "#!/bin/sh\necho \"$1\" >> \"$(dirname \"$0\")/shazam.log\"\necho \"{}\"\n",
        MATCH_DETAILS
    )
}

pub const MATCHER_NO_MATCH: &str =
    "#!/bin/sh\necho \"$1\" >> \"$(dirname \"$0\")/shazam.log\"\nexit 0\n";

pub fn ingester_ok() -> String {
    format!(
        "#!/bin/sh\nprintf '%s|' \"$@\" >> \"$(dirname \"$0\")/add.log\"\necho >> \"$(dirname \"$0\")/add.log\"\necho \"{}\"\n",
        INGEST_DETAILS
    )
}

pub fn ingester_rejecting() -> String {
    format!(
        "#!/bin/sh\nprintf '%s|' \"$@\" >> \"$(dirname \"$0\")/add.log\"\necho >> \"$(dirname \"$0\")/add.log\"\necho \"{}\" >&2\nexit 1\n",
        INGEST_REJECTION
    )
}

/// Minimal WAV header, enough for format sniffing.
pub fn wav_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

/// Minimal MP3 (ID3-tagged) prefix, enough for format sniffing.
pub fn mp3_bytes() -> Vec<u8> {
    let mut bytes = b"ID3".to_vec();
    bytes.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0]);
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

fn install(dir: &Path, name: &str, body: &str) -> std::io::Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, body)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
}

/// Creates the engine working directory.
///
/// `matcher`/`ingester` of `None` leave that engine missing.
pub fn create_engine_dir(matcher: Option<&str>, ingester: Option<&str>) -> std::io::Result<TempDir> {
    let dir = TempDir::new()?;
    install(dir.path(), "ffmpeg", FAKE_FFMPEG)?;
    if let Some(body) = matcher {
        install(dir.path(), "shazam", body)?;
    }
    if let Some(body) = ingester {
        install(dir.path(), "add", body)?;
    }
    // The "capture device" the fake recorder copies from.
    std::fs::write(dir.path().join("default"), wav_bytes())?;
    Ok(dir)
}

/// Creates a catalog database with one composite-key row and one key without artist.
pub fn create_test_catalog_db(dir: &Path) -> anyhow::Result<PathBuf> {
    let db_path = dir.join("catalog.db");
    let conn = Connection::open(&db_path)?;
    conn.execute("CREATE TABLE songs (id INTEGER PRIMARY KEY, key TEXT NOT NULL)", [])?;
    conn.execute(
        "INSERT INTO songs (id, key) VALUES (?1, ?2)",
        (
            SONG_1_ID.parse::<i64>()?,
            format!("{}---{}", SONG_1_TITLE, SONG_1_ARTIST),
        ),
    )?;
    conn.execute(
        "INSERT INTO songs (id, key) VALUES (?1, ?2)",
        (SONG_2_ID.parse::<i64>()?, SONG_2_TITLE),
    )?;
    Ok(db_path)
}
