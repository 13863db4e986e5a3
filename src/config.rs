//! Configuration management for projects.
//!
//! This module defines the structure of the `config.yml` file, which maps group names
//! to a base directory and an ordered list of member projects, and provides the
//! functions to locate, load, save and edit it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = "cli-projects";
const CONFIG_FILE: &str = "config.yml";

/// Top-level configuration structure corresponding to `config.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Groups keyed by name, in insertion order.
    #[serde(default)]
    pub groups: IndexMap<String, Group>,
    /// Defaults for `run`.
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
}

/// A named set of sibling project directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Common parent directory.
    pub base: PathBuf,
    /// Project directory names, in execution order.
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Run defaults that apply when the matching CLI flag is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Shell used to run commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Capture ceiling for each output stream, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,
    /// Number of projects to run at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Per-project time limit in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    fn is_empty(&self) -> bool {
        self == &Settings::default()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config file already exists: {}", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("group name is required")]
    InvalidGroupName,
    #[error("group '{0}' already exists")]
    GroupExists(String),
    #[error("group not found: {0}")]
    GroupNotFound(String),
    #[error("project '{project}' already exists in group '{group}'")]
    ProjectExists { group: String, project: String },
    #[error("project '{project}' is not in group '{group}'")]
    ProjectNotFound { group: String, project: String },
}

impl Config {
    pub fn group(&self, name: &str) -> Result<&Group, ConfigError> {
        self.groups
            .get(name)
            .ok_or_else(|| ConfigError::GroupNotFound(name.to_string()))
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut Group, ConfigError> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| ConfigError::GroupNotFound(name.to_string()))
    }

    pub fn add_group(
        &mut self,
        name: &str,
        base: PathBuf,
        projects: Vec<String>,
    ) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidGroupName);
        }
        if self.groups.contains_key(name) {
            return Err(ConfigError::GroupExists(name.to_string()));
        }
        self.groups
            .insert(name.to_string(), Group { base, projects });
        Ok(())
    }

    /// Removes a group, keeping the order of the others.
    pub fn remove_group(&mut self, name: &str) -> Result<Group, ConfigError> {
        self.groups
            .shift_remove(name)
            .ok_or_else(|| ConfigError::GroupNotFound(name.to_string()))
    }

    pub fn add_project(&mut self, group: &str, project: &str) -> Result<(), ConfigError> {
        let entry = self.group_mut(group)?;
        if entry.projects.iter().any(|p| p == project) {
            return Err(ConfigError::ProjectExists {
                group: group.to_string(),
                project: project.to_string(),
            });
        }
        entry.projects.push(project.to_string());
        Ok(())
    }

    pub fn remove_project(&mut self, group: &str, project: &str) -> Result<(), ConfigError> {
        let entry = self.group_mut(group)?;
        let Some(index) = entry.projects.iter().position(|p| p == project) else {
            return Err(ConfigError::ProjectNotFound {
                group: group.to_string(),
                project: project.to_string(),
            });
        };
        entry.projects.remove(index);
        Ok(())
    }

    /// Renames a group in place, keeping its position.
    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<(), ConfigError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(ConfigError::InvalidGroupName);
        }
        let Some(index) = self.groups.get_index_of(old) else {
            return Err(ConfigError::GroupNotFound(old.to_string()));
        };
        if new == old {
            return Ok(());
        }
        if self.groups.contains_key(new) {
            return Err(ConfigError::GroupExists(new.to_string()));
        }
        if let Some((_, group)) = self.groups.shift_remove_index(index) {
            self.groups.shift_insert(index, new.to_string(), group);
        }
        Ok(())
    }

    pub fn rename_project(&mut self, group: &str, old: &str, new: &str) -> Result<(), ConfigError> {
        let entry = self.group_mut(group)?;
        let Some(index) = entry.projects.iter().position(|p| p == old) else {
            return Err(ConfigError::ProjectNotFound {
                group: group.to_string(),
                project: old.to_string(),
            });
        };
        if old != new && entry.projects.iter().any(|p| p == new) {
            return Err(ConfigError::ProjectExists {
                group: group.to_string(),
                project: new.to_string(),
            });
        }
        entry.projects[index] = new.to_string();
        Ok(())
    }

    /// Appends every candidate not already in the group. Returns the names added.
    pub fn merge_projects(
        &mut self,
        group: &str,
        candidates: Vec<String>,
    ) -> Result<Vec<String>, ConfigError> {
        let entry = self.group_mut(group)?;
        let mut added = Vec::new();
        for candidate in candidates {
            if !entry.projects.contains(&candidate) {
                entry.projects.push(candidate.clone());
                added.push(candidate);
            }
        }
        Ok(added)
    }
}

/// Resolves the config path: `$XDG_CONFIG_HOME/cli-projects/config.yml`, else
/// `~/.config/cli-projects/config.yml`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => dirs_next::home_dir()
            .context("could not determine home directory")?
            .join(".config"),
    };
    Ok(base.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Loads the config, treating a missing or empty file as an empty config.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file missing, using empty config");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), groups = config.groups.len(), "loaded config");
    Ok(config)
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let raw = serde_yaml::to_string(config).context("failed to serialize config")?;
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Writes an empty config, refusing to overwrite an existing file.
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ConfigError::AlreadyInitialized(path.to_path_buf()).into());
    }
    save_config(path, &Config::default())
}

/// Non-hidden subdirectories of `base`, sorted by name.
pub fn scan_projects(base: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(base)
        .with_context(|| format!("failed to read directory {}", base.display()))?;
    let mut projects = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            projects.push(name);
        }
    }
    projects.sort();
    Ok(projects)
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(home) = dirs_next::home_dir() {
                return home.join(rest.trim_start_matches('/'));
            }
        }
    }
    PathBuf::from(path)
}
