//! External query tools (`bd` and `gt`).
//!
//! Beads are never read from storage directly. Every query shells out to a
//! line-oriented CLI and parses what it prints:
//!
//! | Call | Command | Context |
//! |------|---------|---------|
//! | list | `bd list --json [--status=S] [--type=T]` | `BEADS_DIR=<location>` |
//! | show | `bd show <id> --json` | `BEADS_DIR=<location>` |
//! | ready | `gt ready --json` | town root |
//! | status | `gt status --json` | town root |
//!
//! Each invocation runs in the town root with its own timeout. Output is
//! trimmed; valid JSON is returned as parsed, anything else is wrapped in a
//! JSON string so callers always receive a [`Value`].
//!
//! The [`BeadSource`] trait is the seam between the aggregation layer and
//! the `bd` binary, so tests (and embedders) can substitute their own source.

use async_trait::async_trait;
use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Environment variable telling `bd` which beads directory to operate on.
pub const BEADS_DIR_ENV: &str = "BEADS_DIR";

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure of a single external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (not installed, bad working dir).
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("{command} exited {code}: {stderr}")]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The program did not finish in time and was killed.
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Reading the program's output failed.
    #[error("failed to collect output of {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Optional filters forwarded verbatim to `bd list`.
///
/// Values are not validated; the tool decides what is legal. Empty strings
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<String>,
    pub bead_type: Option<String>,
}

impl ListFilter {
    /// Build a filter from decoded query pairs (`status`, `type`).
    ///
    /// The first value of a repeated key is used; unknown keys are ignored.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "status" => &mut filter.status,
                "type" => &mut filter.bead_type,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        filter
    }

    /// Command-line arguments for `bd list`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["list".to_string(), "--json".to_string()];
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            args.push(format!("--status={}", status));
        }
        if let Some(bead_type) = self.bead_type.as_deref().filter(|s| !s.is_empty()) {
            args.push(format!("--type={}", bead_type));
        }
        args
    }
}

/// A configured external program: what to run, where, and for how long.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    base_args: Vec<OsString>,
    workdir: PathBuf,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Arguments placed before every call's own arguments.
    ///
    /// Lets a wrapper script stand in for the real binary, e.g.
    /// `ToolCommand::new("sh", root).with_base_args(["fake-bd.sh"])`.
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run the program with `args` and extra environment, returning its
    /// normalized output.
    pub async fn run(&self, args: &[String], env: &[(&str, &OsStr)]) -> Result<Value, ToolError> {
        let command = self.describe(args);
        tracing::debug!(%command, workdir = %self.workdir.display(), "running tool");

        let child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .envs(env.iter().copied())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.to_string_lossy().to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Io {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(ToolError::Exit {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(normalize_output(&output.stdout))
    }
}

/// Parse trimmed tool output as JSON, or wrap it as a JSON string.
pub fn normalize_output(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// A queryable bead store addressed by its beads directory.
#[async_trait]
pub trait BeadSource: Send + Sync {
    /// List beads held at `location`.
    async fn list(&self, location: &Path, filter: &ListFilter) -> Result<Value, ToolError>;

    /// Fetch one bead from `location`.
    async fn show(&self, location: &Path, bead_id: &str) -> Result<Value, ToolError>;
}

/// [`BeadSource`] backed by the `bd` binary.
#[derive(Debug, Clone)]
pub struct BdCli {
    command: ToolCommand,
}

impl BdCli {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    /// `bd` from `PATH`, run inside `town_root`.
    pub fn for_town(town_root: &Path, timeout: Duration) -> Self {
        Self::new(ToolCommand::new("bd", town_root).with_timeout(timeout))
    }
}

#[async_trait]
impl BeadSource for BdCli {
    async fn list(&self, location: &Path, filter: &ListFilter) -> Result<Value, ToolError> {
        self.command
            .run(&filter.to_args(), &[(BEADS_DIR_ENV, location.as_os_str())])
            .await
    }

    async fn show(&self, location: &Path, bead_id: &str) -> Result<Value, ToolError> {
        let args = vec!["show".to_string(), bead_id.to_string(), "--json".to_string()];
        self.command
            .run(&args, &[(BEADS_DIR_ENV, location.as_os_str())])
            .await
    }
}

/// Town-level queries backed by the `gt` binary.
#[derive(Debug, Clone)]
pub struct GtCli {
    command: ToolCommand,
}

impl GtCli {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    /// `gt` from `PATH`, run inside `town_root`.
    pub fn for_town(town_root: &Path, timeout: Duration) -> Self {
        Self::new(ToolCommand::new("gt", town_root).with_timeout(timeout))
    }

    /// Beads ready to be worked on across the town.
    pub async fn ready(&self) -> Result<Value, ToolError> {
        self.command
            .run(&["ready".to_string(), "--json".to_string()], &[])
            .await
    }

    /// Town status report.
    pub async fn status(&self) -> Result<Value, ToolError> {
        self.command
            .run(&["status".to_string(), "--json".to_string()], &[])
            .await
    }
}
