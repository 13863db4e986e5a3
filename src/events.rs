//! Event definitions for batch runs.
//!
//! A run emits one `Started` event, one `Outcome` per project in list order, and a
//! final `Completed` event. Sinks receive them as they happen.

use std::path::PathBuf;

use serde::Serialize;

use crate::process::{ProjectOutcome, RunSummary};

/// Represents a step in a batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run passed validation and is about to visit projects.
    Started {
        base: PathBuf,
        command: String,
        projects: usize,
        dry_run: bool,
    },
    /// A project finished (or was skipped).
    Outcome(ProjectOutcome),
    /// Every project has been visited.
    Completed(RunSummary),
}

/// Receives run events as they occur.
pub trait EventSink {
    fn emit(&mut self, event: &RunEvent);
}

/// Collects events in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<RunEvent>,
}

#[cfg(test)]
impl EventSink for CollectingSink {
    fn emit(&mut self, event: &RunEvent) {
        self.events.push(event.clone());
    }
}
