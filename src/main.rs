//! projects: run shell commands across groups of sibling project directories.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads the YAML configuration, dispatches the group management subcommands and
//! drives the batch runner for `run`.

mod config;
mod events;
mod exec;
mod logging;
mod output;
mod process;
mod runner;
mod template;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Args, Parser, Subcommand};

use crate::config::{Config, Settings};
use crate::exec::{Shell, ShellExecutor, DEFAULT_MAX_OUTPUT_BYTES};
use crate::output::{ConsoleSink, JsonSink};
use crate::process::RunSummary;
use crate::runner::{BatchRunner, CancelTrigger, FsProbe, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "projects",
    version,
    about = "Execute commands across multiple projects",
    styles = help_styles(),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to config.yml (default: $XDG_CONFIG_HOME/cli-projects/config.yml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase diagnostic output (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize the configuration file.
    Init,
    /// Add a new project group.
    Add {
        /// Name of the group.
        group: String,
        /// Base directory (defaults to the current directory).
        base: Option<String>,
        /// Add every subdirectory of the base as a project.
        #[arg(short, long)]
        scan: bool,
    },
    /// Add a project to a group (uses the current directory name if omitted).
    AddProject { group: String, project: Option<String> },
    /// Remove a project from a group.
    RemoveProject { group: String, project: String },
    /// Rename a group.
    Rename { group: String, new_name: String },
    /// Rename a project within a group.
    RenameProject {
        group: String,
        project: String,
        new_name: String,
    },
    /// Add subdirectories of the group's base that are not listed yet.
    Scan { group: String },
    /// Delete a project group.
    Delete { group: String },
    /// Clear all groups from the config.
    Clear {
        /// Confirm deleting every group.
        #[arg(short, long)]
        yes: bool,
    },
    /// List all groups, or the projects of one group.
    List { group: Option<String> },
    /// Run a command across all projects in a group.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Group to run in.
    group: String,
    /// Command to run. Supports ${PROJECT}, ${PROJECT_PATH} and ${PROJECT_BASE}.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
    /// Run from the base directory (not in each project).
    #[arg(short = 'n', long)]
    no_cd: bool,
    /// Show what would be executed without running.
    #[arg(short = 'd', long)]
    dry_run: bool,
    /// Number of projects to run at once (output stays in group order).
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Per-project time limit in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Shell used to run the command (default: $SHELL, then /bin/sh).
    #[arg(long)]
    shell: Option<String>,
    /// Capture limit for each of stdout and stderr, in bytes.
    #[arg(long)]
    max_output_bytes: Option<usize>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Use ASCII markers instead of Unicode symbols.
    #[arg(long)]
    ascii: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = logging::init(cli.verbose);
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            let label = if std::io::stderr().is_terminal() {
                "\u{1b}[31m✗ Error:\u{1b}[0m"
            } else {
                "✗ Error:"
            };
            eprintln!("{} {:#}", label, err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    match cli.command {
        Commands::Init => handle_init(&path)?,
        Commands::Add { group, base, scan } => handle_add(&path, &group, base, scan)?,
        Commands::AddProject { group, project } => handle_add_project(&path, &group, project)?,
        Commands::RemoveProject { group, project } => {
            handle_remove_project(&path, &group, &project)?
        }
        Commands::Rename { group, new_name } => handle_rename(&path, &group, &new_name)?,
        Commands::RenameProject {
            group,
            project,
            new_name,
        } => handle_rename_project(&path, &group, &project, &new_name)?,
        Commands::Scan { group } => handle_scan(&path, &group)?,
        Commands::Delete { group } => handle_delete(&path, &group)?,
        Commands::Clear { yes } => handle_clear(&path, yes)?,
        Commands::List { group } => handle_list(&path, group.as_deref())?,
        Commands::Run(args) => {
            let summary = handle_run(&path, args).await?;
            if !summary.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_init(path: &Path) -> Result<()> {
    config::init_config(path)?;
    println!("✓ Configuration initialized!");
    println!("  Config file: {}", path.display());
    println!("\nNext steps:");
    println!("  1. Add a group: projects add <group> [base]");
    println!("  2. List groups: projects list");
    Ok(())
}

fn handle_add(path: &Path, group: &str, base: Option<String>, scan: bool) -> Result<()> {
    let mut config = config::load_config(path)?;
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let base = match base {
        Some(raw) => cwd.join(config::expand_home(&raw)),
        None => cwd,
    };
    if !base.is_dir() {
        bail!("directory not found: {}", base.display());
    }
    let projects = if scan {
        config::scan_projects(&base)?
    } else {
        Vec::new()
    };
    config.add_group(group, base.clone(), projects.clone())?;
    config::save_config(path, &config)?;

    println!("✓ Added group: {}", group.trim());
    println!("  Base path: {}", base.display());
    if projects.is_empty() {
        println!("  No projects added. Use: projects add-project {} <project>", group.trim());
    } else {
        println!("  Projects: {}", projects.len());
    }
    Ok(())
}

fn handle_add_project(path: &Path, group: &str, project: Option<String>) -> Result<()> {
    let project = match project {
        Some(project) => project,
        None => current_dir_name()?,
    };
    let mut config = config::load_config(path)?;
    config.add_project(group, &project)?;
    config::save_config(path, &config)?;
    println!("✓ Added project: {}", project);
    println!("  Group: {}", group);
    Ok(())
}

fn handle_remove_project(path: &Path, group: &str, project: &str) -> Result<()> {
    let mut config = config::load_config(path)?;
    config.remove_project(group, project)?;
    config::save_config(path, &config)?;
    println!("✓ Removed project: {}", project);
    println!("  Group: {}", group);
    Ok(())
}

fn handle_rename(path: &Path, group: &str, new_name: &str) -> Result<()> {
    let mut config = config::load_config(path)?;
    config.rename_group(group, new_name)?;
    config::save_config(path, &config)?;
    println!("✓ Renamed group: {} → {}", group, new_name.trim());
    Ok(())
}

fn handle_rename_project(path: &Path, group: &str, project: &str, new_name: &str) -> Result<()> {
    let mut config = config::load_config(path)?;
    config.rename_project(group, project, new_name)?;
    config::save_config(path, &config)?;
    println!("✓ Renamed project: {} → {}", project, new_name);
    println!("  Group: {}", group);
    Ok(())
}

fn handle_scan(path: &Path, group: &str) -> Result<()> {
    let mut config = config::load_config(path)?;
    let base = config.group(group)?.base.clone();
    let found = config::scan_projects(&base)?;
    let added = config.merge_projects(group, found)?;
    if added.is_empty() {
        println!("No new projects found in {}", base.display());
        return Ok(());
    }
    config::save_config(path, &config)?;
    println!("✓ Added {} project(s) to {}:", added.len(), group);
    for project in added {
        println!("  + {}", project);
    }
    Ok(())
}

fn handle_delete(path: &Path, group: &str) -> Result<()> {
    let mut config = config::load_config(path)?;
    config.remove_group(group)?;
    config::save_config(path, &config)?;
    println!("✓ Deleted group: {}", group);
    Ok(())
}

fn handle_clear(path: &Path, yes: bool) -> Result<()> {
    let mut config = config::load_config(path)?;
    let count = config.groups.len();
    if count == 0 {
        println!("Config is already empty.");
        return Ok(());
    }
    if !yes {
        bail!(
            "this would delete all {} group(s); re-run with --yes to confirm",
            count
        );
    }
    config.groups.clear();
    config::save_config(path, &config)?;
    println!("✓ Config cleared successfully");
    Ok(())
}

fn handle_list(path: &Path, group: Option<&str>) -> Result<()> {
    let config = config::load_config(path)?;
    if config.groups.is_empty() {
        println!("No groups configured yet.");
        println!("Use: projects add <group> [base]");
        return Ok(());
    }

    if let Some(name) = group {
        let group = config.group(name)?;
        println!("\n📁 Group: {}\n", name);
        println!("Base: {}", group.base.display());
        println!("Projects: {}\n", group.projects.len());
        if group.projects.is_empty() {
            println!("No projects in this group.");
            return Ok(());
        }
        for project in &group.projects {
            let marker = if group.base.join(project).exists() {
                "✓"
            } else {
                "✗"
            };
            println!("  {} {}", marker, project);
        }
        println!();
        return Ok(());
    }

    println!("\n📁 Project Groups:\n");
    for (name, group) in &config.groups {
        println!("{}", name);
        println!("  Base: {}", group.base.display());
        println!("  Projects: {}", group.projects.len());
        println!();
    }
    Ok(())
}

/// Effective settings for one `run`, merged from CLI flags and the config file.
#[derive(Debug, Clone)]
struct RunSettings {
    options: RunOptions,
    shell: Shell,
    format: OutputFormat,
    color: bool,
    use_symbols: bool,
}

impl RunSettings {
    fn from_cli(args: &RunArgs, settings: &Settings, color_allowed: bool) -> Self {
        let options = RunOptions {
            no_cd: args.no_cd,
            dry_run: args.dry_run,
            jobs: args.jobs.or(settings.jobs).unwrap_or(1).max(1),
            timeout: args
                .timeout
                .or(settings.timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_output_bytes: args
                .max_output_bytes
                .or(settings.max_output_bytes)
                .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
        };
        let preferred = args.shell.as_deref().or(settings.shell.as_deref());
        Self {
            options,
            shell: Shell::resolve(preferred),
            format: args.format,
            color: color_allowed && !args.no_color,
            use_symbols: !args.ascii,
        }
    }
}

async fn handle_run(path: &Path, args: RunArgs) -> Result<RunSummary> {
    let config: Config = config::load_config(path)?;
    let group = config.group(&args.group)?.clone();
    let command = join_command(&args.command);

    let stdout = std::io::stdout();
    let color_allowed = stdout.is_terminal() && std::env::var_os("NO_COLOR").is_none();
    let settings = RunSettings::from_cli(&args, &config.settings, color_allowed);
    tracing::info!(
        group = %args.group,
        shell = %settings.shell.program,
        jobs = settings.options.jobs,
        "starting run"
    );

    let (trigger, token) = runner::cancel_pair();
    spawn_signal_listener(trigger);
    let runner = BatchRunner::new(ShellExecutor::new(settings.shell.clone()), FsProbe)
        .with_cancel(token);

    let outcomes = match settings.format {
        OutputFormat::Text => {
            let mut sink = ConsoleSink::new(stdout.lock(), settings.color, settings.use_symbols);
            runner
                .run(&group, &command, &settings.options, &mut sink)
                .await?
        }
        OutputFormat::Json => {
            let mut sink = JsonSink::new(stdout.lock());
            runner
                .run(&group, &command, &settings.options, &mut sink)
                .await?
        }
    };
    Ok(RunSummary::from_outcomes(&outcomes))
}

// Ctrl-C cancels the in-flight project and everything after it.
fn spawn_signal_listener(trigger: CancelTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            trigger.cancel();
        }
    });
}

/// Joins command words and strips one pair of matching surrounding quotes.
fn join_command(parts: &[String]) -> String {
    let command = parts.join(" ");
    for quote in ['\'', '"'] {
        if command.len() >= 2 && command.starts_with(quote) && command.ends_with(quote) {
            return command[1..command.len() - 1].to_string();
        }
    }
    command
}

fn current_dir_name() -> Result<String> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    cwd.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("could not determine project name from {}", cwd.display()))
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn join_command_strips_matching_quotes() {
        assert_eq!(join_command(&words(&["'git status'"])), "git status");
        assert_eq!(join_command(&words(&["\"npm", "test\""])), "npm test");
        assert_eq!(join_command(&words(&["git", "status"])), "git status");
        assert_eq!(join_command(&words(&["'oops\""])), "'oops\"");
        assert_eq!(join_command(&words(&["'"])), "'");
    }

    #[test]
    fn run_args_accept_hyphenated_commands() {
        let cli = Cli::try_parse_from(["projects", "run", "-n", "work", "ls", "-la"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.group, "work");
        assert!(args.no_cd);
        assert_eq!(args.command, vec!["ls", "-la"]);
    }

    #[test]
    fn cli_flags_override_config_settings() {
        let cli = Cli::try_parse_from([
            "projects", "run", "--jobs", "3", "--shell", "/bin/bash", "g", "make",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let settings = Settings {
            shell: Some("/bin/zsh".to_string()),
            max_output_bytes: Some(64),
            jobs: Some(8),
            timeout_secs: Some(5),
        };
        let resolved = RunSettings::from_cli(&args, &settings, true);
        assert_eq!(resolved.options.jobs, 3);
        assert_eq!(resolved.shell, Shell::posix("/bin/bash"));
        assert_eq!(resolved.options.max_output_bytes, 64);
        assert_eq!(resolved.options.timeout, Some(Duration::from_secs(5)));
        assert!(resolved.color);
    }

    #[test]
    fn defaults_are_sequential_without_timeout() {
        let cli = Cli::try_parse_from(["projects", "run", "--no-color", "g", "make"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let resolved = RunSettings::from_cli(&args, &Settings::default(), true);
        assert_eq!(resolved.options, RunOptions::default());
        assert!(!resolved.color);
        assert!(resolved.use_symbols);
    }
}
