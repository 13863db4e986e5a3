//! Rendering of run events.
//!
//! `ConsoleSink` prints a human-readable report (optionally colored, with or without
//! Unicode symbols) and `JsonSink` prints one JSON object per event. Both write each
//! event as soon as it arrives.

use std::io::Write;

use strip_ansi_escapes::strip;

use crate::events::{EventSink, RunEvent};
use crate::process::{OutcomeStatus, ProjectOutcome, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
    Gray,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Red => "31",
            Tone::Green => "32",
            Tone::Yellow => "33",
            Tone::Blue => "34",
            Tone::Cyan => "36",
            Tone::Gray => "90",
        }
    }
}

/// Glyphs used in the text report.
#[derive(Debug, Clone, Copy)]
struct Symbols {
    start: &'static str,
    ok: &'static str,
    fail: &'static str,
    skip: &'static str,
    cancel: &'static str,
    done: &'static str,
}

const UNICODE: Symbols = Symbols {
    start: "🚀",
    ok: "✔",
    fail: "✖",
    skip: "⚠",
    cancel: "⊘",
    done: "✨",
};

const ASCII: Symbols = Symbols {
    start: ">>",
    ok: "[ok]",
    fail: "[fail]",
    skip: "[skip]",
    cancel: "[cancel]",
    done: "::",
};

/// Human-readable report writer.
pub struct ConsoleSink<W: Write> {
    out: W,
    color: bool,
    symbols: Symbols,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, color: bool, use_symbols: bool) -> Self {
        Self {
            out,
            color,
            symbols: if use_symbols { UNICODE } else { ASCII },
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if self.color {
            format!("\u{1b}[{}m{}\u{1b}[0m", tone.code(), text)
        } else {
            text.to_string()
        }
    }

    fn line(&mut self, tone: Tone, text: &str) {
        let painted = self.paint(tone, text);
        let _ = writeln!(self.out, "{}", painted);
    }

    // Child output keeps its own colors only when we are coloring too.
    fn captured(&mut self, tone: Tone, text: Option<&str>) {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };
        let text = sanitize_text(text, !self.color);
        self.line(tone, &text);
    }

    fn outcome(&mut self, outcome: &ProjectOutcome) {
        let s = self.symbols;
        let name = outcome.project.as_str();
        match outcome.status {
            OutcomeStatus::Skipped => {
                self.line(
                    Tone::Yellow,
                    &format!("{}  {}: directory not found, skipping", s.skip, name),
                );
            }
            OutcomeStatus::DryRun => {
                self.line(Tone::Blue, &format!("[DRY RUN] {}:", name));
                let command = outcome.command.as_deref().unwrap_or_default();
                self.line(Tone::Gray, &format!("  {}", command));
                let _ = writeln!(self.out);
            }
            OutcomeStatus::Succeeded => {
                self.line(Tone::Green, &format!("{} {}", s.ok, name));
                self.captured(Tone::Gray, outcome.stdout.as_deref());
                self.captured(Tone::Yellow, outcome.stderr.as_deref());
                let _ = writeln!(self.out);
            }
            OutcomeStatus::Failed => {
                self.line(Tone::Red, &format!("{} {}", s.fail, name));
                if let Some(error) = outcome.error.as_deref() {
                    self.line(Tone::Red, &format!("  Error: {}", error));
                }
                self.captured(Tone::Gray, outcome.stdout.as_deref());
                self.captured(Tone::Yellow, outcome.stderr.as_deref());
                let _ = writeln!(self.out);
            }
            OutcomeStatus::Cancelled => {
                self.line(Tone::Yellow, &format!("{} {}: cancelled", s.cancel, name));
            }
        }
    }
}

impl<W: Write> EventSink for ConsoleSink<W> {
    fn emit(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Started {
                base,
                command,
                projects,
                dry_run,
            } => {
                let _ = writeln!(self.out);
                let header = format!("{} Running in: {}", self.symbols.start, base.display());
                self.line(Tone::Cyan, &header);
                self.line(Tone::Gray, &format!("Command: {}", command));
                let suffix = if *dry_run { " (dry run)" } else { "" };
                self.line(Tone::Gray, &format!("Projects: {}{}", projects, suffix));
                let _ = writeln!(self.out);
            }
            RunEvent::Outcome(outcome) => self.outcome(outcome),
            RunEvent::Completed(summary) => {
                let text = format!("{} Completed! {}", self.symbols.done, describe(summary));
                self.line(Tone::Cyan, &text);
                let _ = writeln!(self.out);
            }
        }
        let _ = self.out.flush();
    }
}

/// One JSON object per event, newline delimited.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for JsonSink<W> {
    fn emit(&mut self, event: &RunEvent) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let _ = writeln!(self.out, "{}", line);
                let _ = self.out.flush();
            }
            Err(err) => tracing::warn!("failed to encode event: {}", err),
        }
    }
}

/// Formats the summary counts, leaving out zero entries.
pub fn describe(summary: &RunSummary) -> String {
    let parts: Vec<String> = [
        (summary.succeeded, "succeeded"),
        (summary.failed, "failed"),
        (summary.skipped, "skipped"),
        (summary.dry_run, "previewed"),
        (summary.cancelled, "cancelled"),
    ]
    .iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{} {}", count, label))
    .collect();
    let noun = if summary.total == 1 { "project" } else { "projects" };
    if parts.is_empty() {
        format!("({} {})", summary.total, noun)
    } else {
        format!("({} {}: {})", summary.total, noun, parts.join(", "))
    }
}

/// Removes ANSI escape codes when `strip_ansi` is set. Invalid UTF-8 is replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}
