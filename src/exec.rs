//! Process execution.
//!
//! The runner never spawns processes itself. It hands an `ExecRequest` to a
//! `ProcessExecutor`; `ShellExecutor` is the implementation backed by
//! `tokio::process` that runs the command line through a shell and captures its
//! output up to a byte ceiling.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Default ceiling for captured stdout and stderr, per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A command line to run in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Full line passed to the shell.
    pub command: String,
    /// Working directory of the spawned shell.
    pub cwd: PathBuf,
    /// Ceiling for each captured stream.
    pub max_output_bytes: usize,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

/// Output of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecErrorKind {
    #[error("failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stream} exceeded the {limit} byte capture limit")]
    OutputLimit { stream: &'static str, limit: usize },
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("i/o error while running process: {0}")]
    Io(#[from] std::io::Error),
}

/// Execution failure, with whatever output was captured before it happened.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub stdout: String,
    pub stderr: String,
}

impl From<ExecErrorKind> for ExecError {
    fn from(kind: ExecErrorKind) -> Self {
        Self {
            kind,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Runs a command line and reports its exit status and output.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, ExecError>;
}

#[async_trait]
impl<T: ProcessExecutor + ?Sized> ProcessExecutor for &T {
    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, ExecError> {
        (**self).execute(request).await
    }
}

/// Shell interpreter used to run command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub program: String,
    pub args: Vec<String>,
}

impl Shell {
    /// A POSIX-style shell invoked as `<program> -c <line>`.
    pub fn posix(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["-c".to_string()],
        }
    }

    /// Picks the shell: the explicit preference, then `$SHELL`, then the platform default.
    pub fn resolve(preferred: Option<&str>) -> Self {
        if let Some(program) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
            return Self::posix(program);
        }
        Self::platform_default()
    }

    #[cfg(unix)]
    fn platform_default() -> Self {
        let program = std::env::var("SHELL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string());
        Self::posix(program)
    }

    #[cfg(not(unix))]
    fn platform_default() -> Self {
        Self {
            program: "cmd".to_string(),
            args: vec!["/C".to_string()],
        }
    }
}

/// Executes command lines through a shell on the local machine.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: Shell,
}

impl ShellExecutor {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, ExecError> {
        let mut command = Command::new(&self.shell.program);
        command
            .args(&self.shell.args)
            .arg(&request.command)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| ExecErrorKind::Spawn {
            shell: self.shell.program.clone(),
            source,
        })?;
        let mut group = ProcessGroupGuard::new(child.id());
        tracing::debug!(pid = ?child.id(), cwd = %request.cwd.display(), "spawned shell");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = request.max_output_bytes;
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let run = async {
            tokio::try_join!(
                read_capped(stdout, &mut stdout_buf, limit, "stdout"),
                read_capped(stderr, &mut stderr_buf, limit, "stderr"),
            )?;
            let status = child.wait().await?;
            Ok::<_, ExecErrorKind>(status)
        };
        let result = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .unwrap_or(Err(ExecErrorKind::Timeout(timeout))),
            None => run.await,
        };

        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();
        match result {
            Ok(status) => {
                group.disarm();
                Ok(ExecOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(kind) => Err(ExecError {
                kind,
                stdout,
                stderr,
            }),
        }
    }
}

// Reads a stream to EOF, failing once more than `limit` bytes arrive.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    buf: &mut Vec<u8>,
    limit: usize,
    stream: &'static str,
) -> Result<(), ExecErrorKind> {
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = reader.take((limit as u64).saturating_add(1));
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    if buf.len() > limit {
        buf.truncate(limit);
        return Err(ExecErrorKind::OutputLimit { stream, limit });
    }
    Ok(())
}

// Kills the child's whole process group unless the child exited on its own.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        unsafe {
            libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}
