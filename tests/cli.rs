#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    _root: TempDir,
    config: PathBuf,
    base: PathBuf,
}

impl Workspace {
    fn new(projects: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("group");
        fs::create_dir(&base).unwrap();
        for project in projects {
            fs::create_dir(base.join(project)).unwrap();
        }
        let config = root.path().join("config").join("config.yml");
        Self {
            _root: root,
            config,
            base,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("projects").unwrap();
        cmd.arg("--config").arg(&self.config).env("SHELL", "/bin/sh");
        cmd
    }

    fn write_group(&self, name: &str, projects: &[&str]) {
        let listed = projects
            .iter()
            .map(|p| format!("      - {}\n", p))
            .collect::<String>();
        fs::create_dir_all(self.config.parent().unwrap()).unwrap();
        fs::write(
            &self.config,
            format!(
                "groups:\n  {}:\n    base: {}\n    projects:\n{}",
                name,
                self.base.display(),
                listed
            ),
        )
        .unwrap();
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn init_creates_config_once() {
    let ws = Workspace::new(&[]);
    ws.cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration initialized"));
    assert!(ws.config.exists());
    ws.cmd()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn add_with_scan_and_list_group() {
    let ws = Workspace::new(&["web", "api"]);
    ws.cmd()
        .args(["add", "WORK"])
        .arg(&ws.base)
        .arg("--scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Projects: 2"));
    fs::remove_dir(ws.base.join("web")).unwrap();

    ws.cmd()
        .args(["list", "WORK"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ api").and(predicate::str::contains("✗ web")));

    let saved = read(&ws.config);
    assert!(saved.find("- api").unwrap() < saved.find("- web").unwrap());
}

#[test]
fn project_management_round_trip() {
    let ws = Workspace::new(&["a"]);
    ws.write_group("G", &["a"]);
    ws.cmd().args(["add-project", "G", "b"]).assert().success();
    ws.cmd()
        .args(["add-project", "G", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists in group 'G'"));
    ws.cmd().args(["remove-project", "G", "a"]).assert().success();
    fs::create_dir(ws.base.join("c")).unwrap();
    ws.cmd()
        .args(["scan", "G"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+ a").and(predicate::str::contains("+ c")));
    ws.cmd().args(["delete", "G"]).assert().success();
    ws.cmd()
        .args(["delete", "G"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("group not found: G"));
}

#[test]
fn rename_group_and_project_round_trip() {
    let ws = Workspace::new(&["a"]);
    ws.write_group("G", &["a", "z"]);
    ws.cmd()
        .args(["add", "H", ws.base.to_str().unwrap()])
        .assert()
        .success();
    ws.cmd()
        .args(["rename", "G", "F"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed group: G → F"));
    ws.cmd()
        .args(["rename", "F", "H"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("group 'H' already exists"));
    ws.cmd()
        .args(["rename-project", "F", "a", "b"])
        .assert()
        .success();
    ws.cmd()
        .args(["rename-project", "F", "z", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("project 'b' already exists in group 'F'"));
    let text = read(&ws.config);
    let f = text.find("F:").unwrap();
    let h = text.find("H:").unwrap();
    assert!(f < h, "renamed group keeps its position:\n{}", text);
    assert!(!text.contains("G:"));
    let b = text.find("- b").unwrap();
    let z = text.find("- z").unwrap();
    assert!(b < z, "renamed project keeps its position:\n{}", text);
}

#[test]
fn clear_requires_confirmation() {
    let ws = Workspace::new(&["a"]);
    ws.write_group("G", &["a"]);
    ws.cmd()
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    ws.cmd().args(["clear", "--yes"]).assert().success();
    ws.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No groups configured yet."));
}

#[test]
fn run_executes_in_each_project_and_skips_missing() {
    let ws = Workspace::new(&["one", "two"]);
    ws.write_group("G", &["one", "gone", "two"]);
    let output = ws
        .cmd()
        .args(["run", "G", "--ascii", "echo ${PROJECT} > marker.txt && pwd"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();

    assert_eq!(read(&ws.base.join("one/marker.txt")).trim(), "one");
    assert_eq!(read(&ws.base.join("two/marker.txt")).trim(), "two");
    let one = stdout.find("[ok] one").unwrap();
    let gone = stdout.find("[skip]  gone").unwrap();
    let two = stdout.find("[ok] two").unwrap();
    assert!(one < gone && gone < two);
    assert!(stdout.contains("Completed! (3 projects: 2 succeeded, 1 skipped)"));
}

#[test]
fn run_failure_sets_exit_status_but_continues() {
    let ws = Workspace::new(&["bad", "good"]);
    ws.write_group("G", &["bad", "good"]);
    ws.cmd()
        .args(["run", "G", "--ascii", "test ${PROJECT} = good || { echo nope >&2; exit 4; }"])
        .assert()
        .code(1)
        .stdout(
            predicate::str::contains("[fail] bad")
                .and(predicate::str::contains("Error: command exited with status 4"))
                .and(predicate::str::contains("nope"))
                .and(predicate::str::contains("[ok] good"))
                .and(predicate::str::contains("Completed!")),
        );
}

#[test]
fn run_success_still_shows_stderr() {
    let ws = Workspace::new(&["app"]);
    ws.write_group("G", &["app"]);
    ws.cmd()
        .args(["run", "G", "--ascii", "--no-color", "echo warn >&2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] app\nwarn\n"));
}

#[test]
fn dry_run_prints_commands_without_running() {
    let ws = Workspace::new(&["app"]);
    ws.write_group("G", &["app"]);
    let expected = format!("cd {} && touch ran", ws.base.join("app").display());
    ws.cmd()
        .args(["run", "G", "--dry-run", "touch", "ran"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] app:").and(predicate::str::contains(expected)));
    assert!(!ws.base.join("app/ran").exists());
}

#[test]
fn no_cd_runs_from_base() {
    let ws = Workspace::new(&["app"]);
    ws.write_group("G", &["app"]);
    ws.cmd()
        .args(["run", "G", "--no-cd", "touch from-${PROJECT}"])
        .assert()
        .success();
    assert!(ws.base.join("from-app").exists());
    assert!(!ws.base.join("app/from-app").exists());
}

#[test]
fn json_format_emits_event_lines() {
    let ws = Workspace::new(&["app"]);
    ws.write_group("G", &["app", "missing"]);
    let output = ws
        .cmd()
        .args(["run", "G", "--format", "json", "echo hi"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let events: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["event"], "started");
    assert_eq!(events[1]["status"], "succeeded");
    assert_eq!(events[1]["stdout"], "hi\n");
    assert_eq!(events[2]["status"], "skipped");
    assert_eq!(events[3]["event"], "completed");
}

#[test]
fn run_rejects_unknown_group_and_empty_command() {
    let ws = Workspace::new(&["app"]);
    ws.write_group("G", &["app"]);
    ws.cmd()
        .args(["run", "NOPE", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("group not found: NOPE"));
    ws.cmd()
        .args(["run", "G"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no command provided"));
}
