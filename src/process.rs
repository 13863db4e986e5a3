//! Data structures describing per-project results.
//!
//! This module defines the outcome of running a command in one project (`ProjectOutcome`),
//! its status (`OutcomeStatus`), and the aggregate counts of a batch (`RunSummary`).

use serde::Serialize;

/// How a single project ended up in a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The project directory does not exist.
    Skipped,
    /// Dry run: the command was resolved but not executed.
    DryRun,
    /// The command exited with status 0.
    Succeeded,
    /// The command exited non-zero or could not be executed.
    Failed,
    /// The run was cancelled before or while this project executed.
    ///
    /// A running child is killed and whatever it had written so far is dropped, so a
    /// cancelled outcome never carries stdout or stderr.
    Cancelled,
}

/// Result of running the command in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOutcome {
    /// Project name.
    pub project: String,
    /// Final status.
    pub status: OutcomeStatus,
    /// Fully resolved command line. Absent for skipped projects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Captured standard output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Exit code, when the process exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Why the project failed. Only set for `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent executing, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ProjectOutcome {
    fn bare(project: &str, status: OutcomeStatus, command: Option<String>) -> Self {
        Self {
            project: project.to_string(),
            status,
            command,
            stdout: None,
            stderr: None,
            exit_code: None,
            error: None,
            duration_ms: None,
        }
    }

    pub fn skipped(project: &str) -> Self {
        Self::bare(project, OutcomeStatus::Skipped, None)
    }

    pub fn dry_run(project: &str, command: String) -> Self {
        Self::bare(project, OutcomeStatus::DryRun, Some(command))
    }

    pub fn cancelled(project: &str, command: Option<String>) -> Self {
        Self::bare(project, OutcomeStatus::Cancelled, command)
    }
}

/// Aggregate counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub dry_run: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ProjectOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Skipped => summary.skipped += 1,
                OutcomeStatus::DryRun => summary.dry_run += 1,
                OutcomeStatus::Succeeded => summary.succeeded += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Whether every executed project succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}
