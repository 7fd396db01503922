//! Runs the external matcher/ingester (and the transcoder) as child processes.

use super::interpreter::EngineProtocol;
use crate::audio::AudioArtifact;
use crate::config::Secret;
use crate::metadata::SongMetadata;
use crate::metrics;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Exit status reported when the executable is missing or not executable.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status reported when the OS refused to start the process.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Exit status reported when the configured timeout elapsed.
pub const EXIT_TIMED_OUT: i32 = 124;

/// Everything the invoker needs to know, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub matcher_path: PathBuf,
    pub ingester_path: PathBuf,
    /// Working directory for engine processes; relative executable paths resolve against it.
    pub working_dir: PathBuf,
    /// Name of the environment variable the catalog connection string is injected under.
    pub connection_env_var: String,
    pub connection_secret: Option<Secret>,
    /// Additional non-secret environment for engine processes.
    pub extra_env: BTreeMap<String, String>,
    /// No timeout when `None`: a long engine run blocks its request until it exits.
    pub timeout: Option<Duration>,
    pub protocol: EngineProtocol,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            matcher_path: PathBuf::from("./shazam"),
            ingester_path: PathBuf::from("./add"),
            working_dir: PathBuf::from("."),
            connection_env_var: "MONGO_URI".to_string(),
            connection_secret: None,
            extra_env: BTreeMap::new(),
            timeout: None,
            protocol: EngineProtocol::default(),
        }
    }
}

/// One external-process call. Built per call, never reused.
#[derive(Clone)]
pub struct EngineInvocation {
    pub label: &'static str,
    pub executable_path: PathBuf,
    pub argument_list: Vec<String>,
    pub environment_overrides: BTreeMap<String, String>,
    pub working_directory: PathBuf,
}

// Override values may hold credentials: only their names are printed.
impl fmt::Debug for EngineInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInvocation")
            .field("label", &self.label)
            .field("executable_path", &self.executable_path)
            .field("argument_list", &self.argument_list)
            .field(
                "environment_overrides",
                &self.environment_overrides.keys().collect::<Vec<_>>(),
            )
            .field("working_directory", &self.working_directory)
            .finish()
    }
}

/// What came back from a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub exit_status: i32,
    pub standard_output: String,
    pub standard_error: String,
    /// False when no process was started (missing executable, spawn refused).
    pub launched: bool,
    pub elapsed: Duration,
}

impl EngineOutcome {
    fn not_launched(exit_status: i32, reason: String) -> Self {
        Self {
            exit_status,
            standard_output: String::new(),
            standard_error: reason,
            launched: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn success(&self) -> bool {
        self.launched && self.exit_status == 0
    }
}

pub struct EngineInvoker {
    settings: EngineSettings,
}

impl EngineInvoker {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolves `executable` to a runnable file, or `None`.
    pub fn resolve(&self, executable: &Path) -> Option<PathBuf> {
        resolve_executable(executable, &self.settings.working_dir)
    }

    /// Environment shared by every engine call: extra env plus the connection secret.
    fn base_environment(&self) -> BTreeMap<String, String> {
        let mut env = self.settings.extra_env.clone();
        if let Some(secret) = &self.settings.connection_secret {
            env.insert(
                self.settings.connection_env_var.clone(),
                secret.expose().to_string(),
            );
        }
        env
    }

    pub fn invocation(&self, label: &'static str, executable: &Path, arguments: Vec<String>) -> EngineInvocation {
        EngineInvocation {
            label,
            executable_path: executable.to_path_buf(),
            argument_list: arguments,
            environment_overrides: self.base_environment(),
            working_directory: self.settings.working_dir.clone(),
        }
    }

    /// Invocation for helper tools (the transcoder): extra env only, no connection secret.
    pub fn tool_invocation(&self, label: &'static str, executable: &Path, arguments: Vec<String>) -> EngineInvocation {
        EngineInvocation {
            label,
            executable_path: executable.to_path_buf(),
            argument_list: arguments,
            environment_overrides: self.settings.extra_env.clone(),
            working_directory: self.settings.working_dir.clone(),
        }
    }

    /// Runs `executable` with `arguments`, merging `env` on top of the shared environment.
    pub async fn invoke(
        &self,
        executable: &Path,
        arguments: &[String],
        env: &BTreeMap<String, String>,
    ) -> EngineOutcome {
        let mut invocation = self.invocation("engine", executable, arguments.to_vec());
        invocation
            .environment_overrides
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.execute(invocation).await
    }

    pub async fn run_matcher(&self, artifact: &AudioArtifact) -> EngineOutcome {
        let args = vec![artifact.source_path().to_string_lossy().to_string()];
        let invocation = self.invocation("matcher", &self.settings.matcher_path, args);
        self.execute(invocation).await
    }

    pub async fn run_ingester(&self, artifact: &AudioArtifact, metadata: &SongMetadata) -> EngineOutcome {
        let mut args = vec![
            artifact.source_path().to_string_lossy().to_string(),
            metadata.title().to_string(),
            metadata.artist().to_string(),
        ];
        if let Some(source_id) = metadata.source_id() {
            args.push(source_id.to_string());
        }
        let invocation = self.invocation("ingester", &self.settings.ingester_path, args);
        self.execute(invocation).await
    }

    /// Executes one invocation and waits for the process to exit.
    ///
    /// Never spawns anything when the executable can't be resolved. No retries.
    /// The connection secret is scrubbed from the captured output.
    pub async fn execute(&self, invocation: EngineInvocation) -> EngineOutcome {
        let mut outcome = self.execute_inner(&invocation).await;
        metrics::record_engine_invocation(invocation.label, outcome.exit_status, outcome.elapsed);
        if let Some(secret) = &self.settings.connection_secret {
            outcome.standard_output = secret.redact_in(&outcome.standard_output);
            outcome.standard_error = secret.redact_in(&outcome.standard_error);
        }
        outcome
    }

    async fn execute_inner(&self, invocation: &EngineInvocation) -> EngineOutcome {
        let Some(resolved) = self.resolve(&invocation.executable_path) else {
            warn!(
                "{} executable {:?} not found or not executable",
                invocation.label, invocation.executable_path
            );
            return EngineOutcome::not_launched(
                EXIT_NOT_FOUND,
                format!(
                    "{} executable not found or not executable: {}",
                    invocation.label,
                    invocation.executable_path.display()
                ),
            );
        };

        info!(
            "Invoking {} {:?} ({} args, env overrides: {:?})",
            invocation.label,
            resolved,
            invocation.argument_list.len(),
            invocation.environment_overrides.keys().collect::<Vec<_>>()
        );
        debug!("{} arguments: {:?}", invocation.label, invocation.argument_list);

        let started = Instant::now();
        // The inherited environment stays in place; overrides are layered on top.
        let child = Command::new(&resolved)
            .args(&invocation.argument_list)
            .envs(&invocation.environment_overrides)
            .current_dir(&invocation.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {} {:?}: {}", invocation.label, resolved, e);
                return EngineOutcome::not_launched(
                    EXIT_NOT_EXECUTABLE,
                    format!("failed to start {}: {}", invocation.label, e),
                );
            }
        };

        let waited = match self.settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    warn!("{} timed out after {:?}", invocation.label, limit);
                    return EngineOutcome {
                        exit_status: EXIT_TIMED_OUT,
                        standard_output: String::new(),
                        standard_error: format!("{} timed out after {:?}", invocation.label, limit),
                        launched: true,
                        elapsed: started.elapsed(),
                    };
                }
            },
            None => child.wait_with_output().await,
        };

        let elapsed = started.elapsed();
        match waited {
            Ok(output) => {
                let exit_status = output.status.code().unwrap_or(-1);
                info!(
                    "{} exited with status {} after {:?}",
                    invocation.label, exit_status, elapsed
                );
                EngineOutcome {
                    exit_status,
                    standard_output: String::from_utf8_lossy(&output.stdout).to_string(),
                    standard_error: String::from_utf8_lossy(&output.stderr).to_string(),
                    launched: true,
                    elapsed,
                }
            }
            Err(e) => {
                warn!("Failed waiting for {}: {}", invocation.label, e);
                EngineOutcome {
                    exit_status: -1,
                    standard_output: String::new(),
                    standard_error: format!("failed waiting for {}: {}", invocation.label, e),
                    launched: true,
                    elapsed,
                }
            }
        }
    }
}

/// Finds a runnable file for `executable`.
///
/// Anything with a path separator is taken relative to `working_dir`; bare
/// names are looked up on `PATH`.
pub fn resolve_executable(executable: &Path, working_dir: &Path) -> Option<PathBuf> {
    if executable.as_os_str().is_empty() {
        return None;
    }
    if executable.is_absolute() || executable.components().count() > 1 {
        let candidate = if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            // Absolute, so the child's current_dir doesn't apply twice.
            std::path::absolute(working_dir.join(executable)).ok()?
        };
        return is_executable(&candidate).then_some(candidate);
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(executable))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::audio::{ArtifactOrigin, AudioFormat};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invoker_in(dir: &Path) -> EngineInvoker {
        EngineInvoker::new(EngineSettings {
            matcher_path: dir.join("shazam"),
            ingester_path: dir.join("add"),
            working_dir: dir.to_path_buf(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_missing_executable_is_not_spawned() {
        let dir = TempDir::new().unwrap();
        let invoker = invoker_in(dir.path());

        let outcome = invoker
            .invoke(&dir.path().join("nope"), &[], &BTreeMap::new())
            .await;

        assert_eq!(outcome.exit_status, EXIT_NOT_FOUND);
        assert!(!outcome.launched);
        assert!(outcome.standard_error.contains("not found"));
    }

    #[tokio::test]
    async fn test_non_executable_file_is_not_spawned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shazam");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let invoker = invoker_in(dir.path());

        let outcome = invoker.invoke(&path, &[], &BTreeMap::new()).await;

        assert_eq!(outcome.exit_status, EXIT_NOT_FOUND);
        assert!(!outcome.launched);
    }

    #[tokio::test]
    async fn test_captures_status_and_output() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "engine", "echo \"out $1\"; echo oops >&2; exit 3");
        let invoker = invoker_in(dir.path());

        let outcome = invoker
            .invoke(&script, &["arg".to_string()], &BTreeMap::new())
            .await;

        assert!(outcome.launched);
        assert_eq!(outcome.exit_status, 3);
        assert_eq!(outcome.standard_output, "out arg\n");
        assert_eq!(outcome.standard_error, "oops\n");
    }

    #[tokio::test]
    async fn test_env_is_merged_with_inherited() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "engine",
            "echo \"$MONGO_URI|$EXTRA|${PATH:+has-path}\" > \"$(dirname \"$0\")/env.txt\"",
        );
        let invoker = EngineInvoker::new(EngineSettings {
            working_dir: dir.path().to_path_buf(),
            connection_secret: Some(Secret::new("mongodb://secret")),
            ..Default::default()
        });
        let mut env = BTreeMap::new();
        env.insert("EXTRA".to_string(), "x".to_string());

        let outcome = invoker.invoke(&script, &[], &env).await;

        assert!(outcome.success());
        let seen = std::fs::read_to_string(dir.path().join("env.txt")).unwrap();
        assert_eq!(seen.trim(), "mongodb://secret|x|has-path");
    }

    #[tokio::test]
    async fn test_secret_is_scrubbed_from_output() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "add",
            "echo \"connected to $MONGO_URI\"; echo \"E11000 on $MONGO_URI\" >&2; exit 1",
        );
        let invoker = EngineInvoker::new(EngineSettings {
            ingester_path: dir.path().join("add"),
            working_dir: dir.path().to_path_buf(),
            connection_secret: Some(Secret::new("mongodb://user:pw@host")),
            ..Default::default()
        });
        let artifact = AudioArtifact::new("/tmp/x.mp3", AudioFormat::Mp3, ArtifactOrigin::Uploaded);
        let metadata = SongMetadata::new("Song", "Band").unwrap();

        let outcome = invoker.run_ingester(&artifact, &metadata).await;

        assert_eq!(outcome.standard_output.trim(), "connected to ***");
        assert_eq!(outcome.standard_error.trim(), "E11000 on ***");
    }

    #[tokio::test]
    async fn test_tool_invocation_gets_no_secret() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "ffmpeg", "echo \"[${MONGO_URI:-unset}|$EXTRA]\"");
        let mut extra_env = BTreeMap::new();
        extra_env.insert("EXTRA".to_string(), "x".to_string());
        let invoker = EngineInvoker::new(EngineSettings {
            working_dir: dir.path().to_path_buf(),
            connection_secret: Some(Secret::new("mongodb://user:pw@host")),
            extra_env,
            ..Default::default()
        });

        let invocation = invoker.tool_invocation("transcoder", &script, vec![]);
        assert!(!invocation.environment_overrides.contains_key("MONGO_URI"));
        let outcome = invoker.execute(invocation).await;

        assert_eq!(outcome.standard_output.trim(), "[unset|x]");
    }

    #[tokio::test]
    async fn test_relative_path_resolves_against_working_dir() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "shazam", "echo matched");
        let invoker = EngineInvoker::new(EngineSettings {
            matcher_path: PathBuf::from("./shazam"),
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let artifact = AudioArtifact::new("/tmp/x.mp3", AudioFormat::Mp3, ArtifactOrigin::Uploaded);

        let outcome = invoker.run_matcher(&artifact).await;

        assert!(outcome.success());
        assert_eq!(outcome.standard_output.trim(), "matched");
    }

    #[tokio::test]
    async fn test_ingester_receives_metadata_arguments() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "add", "printf '%s|' \"$@\"");
        let invoker = invoker_in(dir.path());
        let artifact = AudioArtifact::new("/tmp/x.mp3", AudioFormat::Mp3, ArtifactOrigin::Uploaded);
        let metadata = SongMetadata::new("Song Title", "The Artist")
            .unwrap()
            .with_source_id(Some("abc123"));

        let outcome = invoker.run_ingester(&artifact, &metadata).await;

        assert_eq!(outcome.standard_output, "/tmp/x.mp3|Song Title|The Artist|abc123|");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "slow", "sleep 5");
        let invoker = EngineInvoker::new(EngineSettings {
            working_dir: dir.path().to_path_buf(),
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        });

        let outcome = invoker.invoke(&script, &[], &BTreeMap::new()).await;

        assert_eq!(outcome.exit_status, EXIT_TIMED_OUT);
        assert!(outcome.launched);
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_debug_hides_env_values() {
        let invoker = EngineInvoker::new(EngineSettings {
            connection_secret: Some(Secret::new("mongodb://user:pw@host")),
            ..Default::default()
        });
        let invocation = invoker.invocation("matcher", Path::new("./shazam"), vec![]);
        let printed = format!("{:?}", invocation);
        assert!(printed.contains("MONGO_URI"));
        assert!(!printed.contains("pw@host"));
    }

    #[test]
    fn test_bare_name_searches_path() {
        assert!(resolve_executable(Path::new("sh"), Path::new("/nonexistent")).is_some());
        assert!(resolve_executable(Path::new("definitely-not-a-real-binary-xyz"), Path::new(".")).is_none());
        assert!(resolve_executable(Path::new(""), Path::new(".")).is_none());
    }
}
