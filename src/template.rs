//! Command templating.
//!
//! Expands the `${PROJECT}`, `${PROJECT_PATH}` and `${PROJECT_BASE}` placeholders in a
//! user command and composes the final shell line handed to the executor.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Values substituted into a command for one project.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    /// Project name as listed in the group.
    pub project: &'a str,
    /// Base directory joined with the project name.
    pub project_path: &'a Path,
    /// The group's base directory.
    pub base: &'a Path,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"))
}

/// Expands every recognized placeholder in `raw`.
///
/// Replacement is a single pass, so substituted values are never expanded again.
/// Unknown `${...}` tokens are kept verbatim.
pub fn expand(raw: &str, vars: &TemplateVars<'_>) -> String {
    placeholder_regex()
        .replace_all(raw, |caps: &Captures<'_>| match &caps[1] {
            "PROJECT" => vars.project.to_string(),
            "PROJECT_PATH" => vars.project_path.to_string_lossy().into_owned(),
            "PROJECT_BASE" => vars.base.to_string_lossy().into_owned(),
            other => {
                tracing::debug!(placeholder = other, "leaving unknown placeholder untouched");
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Builds the line passed to the shell.
///
/// With `no_cd` the expanded command is used as is. Otherwise it is prefixed with a
/// `cd` into the project directory so both run in the same shell session.
pub fn compose(expanded: &str, project_path: &Path, no_cd: bool) -> String {
    if no_cd {
        return expanded.to_string();
    }
    let path = project_path.to_string_lossy();
    format!("cd {} && {}", shell_words::quote(&path), expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn vars<'a>(project: &'a str, path: &'a Path, base: &'a Path) -> TemplateVars<'a> {
        TemplateVars {
            project,
            project_path: path,
            base,
        }
    }

    #[test]
    fn expands_project_and_path() {
        let base = PathBuf::from("/home/u/g");
        let path = base.join("foo");
        let out = expand("echo ${PROJECT} at ${PROJECT_PATH}", &vars("foo", &path, &base));
        assert_eq!(out, "echo foo at /home/u/g/foo");
    }

    #[test]
    fn expands_base_and_repeated_tokens() {
        let base = PathBuf::from("/b");
        let path = base.join("bar");
        let out = expand(
            "ls ${PROJECT_BASE} && echo ${PROJECT}-${PROJECT}",
            &vars("bar", &path, &base),
        );
        assert_eq!(out, "ls /b && echo bar-bar");
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let base = PathBuf::from("/b");
        let path = base.join("x");
        let out = expand("echo ${UNKNOWN} ${project} ${}", &vars("x", &path, &base));
        assert_eq!(out, "echo ${UNKNOWN} ${project} ${}");
    }

    #[test]
    fn substituted_values_are_not_reexpanded() {
        let base = PathBuf::from("/b");
        let path = base.join("${PROJECT_BASE}");
        let out = expand("echo ${PROJECT}", &vars("${PROJECT_BASE}", &path, &base));
        assert_eq!(out, "echo ${PROJECT_BASE}");
    }

    #[test]
    fn compose_prefixes_cd_unless_disabled() {
        let path = PathBuf::from("/b/bar");
        assert_eq!(compose("make", &path, false), "cd /b/bar && make");
        assert_eq!(compose("make", &path, true), "make");
    }

    #[test]
    fn compose_quotes_paths_with_spaces() {
        let path = PathBuf::from("/b/my project");
        assert_eq!(compose("ls", &path, false), "cd '/b/my project' && ls");
    }
}
