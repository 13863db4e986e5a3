//! Batch execution across the projects of a group.
//!
//! This module contains the `BatchRunner`, which visits every project of a `Group` in
//! list order, resolves its directory, expands the command template and hands the
//! resulting line to a `ProcessExecutor`. Failures are recorded per project; only
//! precondition violations abort a run.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::watch;

use crate::config::Group;
use crate::events::{EventSink, RunEvent};
use crate::exec::{ExecRequest, ProcessExecutor, DEFAULT_MAX_OUTPUT_BYTES};
use crate::process::{OutcomeStatus, ProjectOutcome, RunSummary};
use crate::template::{self, TemplateVars};

/// Per-invocation execution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Run from the group base instead of each project directory.
    pub no_cd: bool,
    /// Resolve commands without executing them.
    pub dry_run: bool,
    /// Maximum number of projects executing at once. `1` is strictly sequential.
    pub jobs: usize,
    /// Per-project time limit.
    pub timeout: Option<Duration>,
    /// Capture ceiling for each output stream of a project.
    pub max_output_bytes: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            no_cd: false,
            dry_run: false,
            jobs: 1,
            timeout: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to check {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Answers whether a project directory is present.
pub trait PathProbe: Send + Sync {
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// Checks the local filesystem.
///
/// Existence is checked right before use, so a directory removed in between still
/// reaches the executor and fails there.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }
}

/// Requests cancellation of a run.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by the runner to stop early.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the trigger is dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (CancelTrigger, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx }, CancelToken { rx })
}

/// Runs a command in every project of a group.
pub struct BatchRunner<E, P = FsProbe> {
    executor: E,
    probe: P,
    cancel: Option<CancelToken>,
}

impl<E: ProcessExecutor, P: PathProbe> BatchRunner<E, P> {
    pub fn new(executor: E, probe: P) -> Self {
        Self {
            executor,
            probe,
            cancel: None,
        }
    }

    /// Lets the run be stopped through the paired `CancelTrigger`.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `command` across `group`, emitting events to `sink` as they happen.
    ///
    /// Returns one outcome per project, in the group's order.
    pub async fn run<S: EventSink>(
        &self,
        group: &Group,
        command: &str,
        options: &RunOptions,
        sink: &mut S,
    ) -> Result<Vec<ProjectOutcome>, RunError> {
        if command.trim().is_empty() {
            return Err(RunError::InvalidArgument("no command provided".to_string()));
        }
        if group.base.as_os_str().is_empty() {
            return Err(RunError::InvalidArgument(
                "group has no base directory".to_string(),
            ));
        }
        if group.projects.is_empty() {
            return Err(RunError::InvalidArgument(
                "group has no projects".to_string(),
            ));
        }

        // Relative bases resolve against our cwd once, so the child's cwd and the
        // `cd` prefix both name the same directory.
        let base = std::path::absolute(&group.base).map_err(|source| RunError::Probe {
            path: group.base.clone(),
            source,
        })?;

        sink.emit(&RunEvent::Started {
            base: base.clone(),
            command: command.to_string(),
            projects: group.projects.len(),
            dry_run: options.dry_run,
        });

        // `buffered` yields in input order, so outcomes stay ordered for any `jobs`.
        let mut pending = stream::iter(group.projects.iter())
            .map(|project| self.run_project(&base, project, command, options))
            .buffered(options.jobs.max(1));

        let mut outcomes = Vec::with_capacity(group.projects.len());
        while let Some(outcome) = pending.next().await {
            let outcome = outcome?;
            sink.emit(&RunEvent::Outcome(outcome.clone()));
            outcomes.push(outcome);
        }

        let summary = RunSummary::from_outcomes(&outcomes);
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch completed"
        );
        sink.emit(&RunEvent::Completed(summary));
        Ok(outcomes)
    }

    async fn run_project(
        &self,
        base: &Path,
        project: &str,
        command: &str,
        options: &RunOptions,
    ) -> Result<ProjectOutcome, RunError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Ok(ProjectOutcome::cancelled(project, None));
        }

        let project_path = base.join(project);
        let exists = self
            .probe
            .exists(&project_path)
            .map_err(|source| RunError::Probe {
                path: project_path.clone(),
                source,
            })?;
        if !exists {
            tracing::info!(project, path = %project_path.display(), "directory not found, skipping");
            return Ok(ProjectOutcome::skipped(project));
        }

        let vars = TemplateVars {
            project,
            project_path: &project_path,
            base,
        };
        let expanded = template::expand(command, &vars);
        let line = template::compose(&expanded, &project_path, options.no_cd);
        if options.dry_run {
            return Ok(ProjectOutcome::dry_run(project, line));
        }

        let cwd = if options.no_cd {
            base.to_path_buf()
        } else {
            project_path
        };
        let request = ExecRequest {
            command: line,
            cwd,
            max_output_bytes: options.max_output_bytes,
            timeout: options.timeout,
        };
        tracing::debug!(project, cwd = %request.cwd.display(), command = %request.command, "executing");

        let started = Instant::now();
        let result = match &self.cancel {
            Some(token) => tokio::select! {
                result = self.executor.execute(&request) => Some(result),
                _ = token.cancelled() => None,
            },
            None => Some(self.executor.execute(&request).await),
        };
        let duration_ms = Some(started.elapsed().as_millis() as u64);

        let mut outcome = ProjectOutcome {
            project: project.to_string(),
            status: OutcomeStatus::Succeeded,
            command: Some(request.command),
            stdout: None,
            stderr: None,
            exit_code: None,
            error: None,
            duration_ms,
        };
        match result {
            None => {
                tracing::warn!(project, "cancelled");
                outcome.status = OutcomeStatus::Cancelled;
            }
            Some(Ok(output)) => {
                outcome.exit_code = output.exit_code;
                if !output.success() {
                    outcome.status = OutcomeStatus::Failed;
                    outcome.error = Some(match output.exit_code {
                        Some(code) => format!("command exited with status {}", code),
                        None => "command was terminated by a signal".to_string(),
                    });
                }
                outcome.stdout = Some(output.stdout);
                outcome.stderr = Some(output.stderr);
            }
            Some(Err(err)) => {
                outcome.status = OutcomeStatus::Failed;
                outcome.error = Some(err.kind.to_string());
                outcome.stdout = Some(err.stdout);
                outcome.stderr = Some(err.stderr);
            }
        }
        if outcome.status == OutcomeStatus::Failed {
            tracing::warn!(project, exit_code = ?outcome.exit_code, error = ?outcome.error, "project failed");
        }
        Ok(outcome)
    }
}
