use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = ".lacuna.toml";
pub const DEFAULT_DATA_FILE_NAME: &str = ".coverage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    #[default]
    Pytest,
    Nose,
}

impl RunnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Nose => "nose",
        }
    }

    pub fn default_program(self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Nose => "nosetests",
        }
    }
}

impl std::str::FromStr for RunnerKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pytest" => Ok(Self::Pytest),
            "nose" => Ok(Self::Nose),
            other => Err(format!(
                "invalid runner '{other}', expected one of: pytest, nose"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LacunaConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub kind: RunnerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

impl RunnerConfig {
    pub fn program(&self) -> &str {
        self.program
            .as_deref()
            .unwrap_or_else(|| self.kind.default_program())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default)]
    pub omit: Vec<String>,
    #[serde(default)]
    pub exclude_lines: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            omit: Vec::new(),
            exclude_lines: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub fn find_upwards(start: impl AsRef<Path>, name: &str) -> Option<PathBuf> {
    let start = start.as_ref();
    let mut dir = if start.is_dir() {
        Some(start)
    } else {
        start.parent()
    };
    while let Some(current) = dir {
        let candidate = current.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

pub fn config_path(start: impl AsRef<Path>) -> Option<PathBuf> {
    find_upwards(start, CONFIG_FILE_NAME)
}

pub fn load_config(start: impl AsRef<Path>) -> Result<LacunaConfig, ConfigError> {
    let Some(path) = config_path(start) else {
        return Ok(LacunaConfig::default());
    };

    let raw = fs::read_to_string(path)?;
    let parsed: LacunaConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

fn default_data_file() -> String {
    DEFAULT_DATA_FILE_NAME.to_owned()
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_owned())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn normalize_config(mut config: LacunaConfig) -> LacunaConfig {
    config.runner.program = normalize_optional(config.runner.program.take());

    let data_file = config.coverage.data_file.trim();
    config.coverage.data_file = if data_file.is_empty() {
        default_data_file()
    } else {
        data_file.to_owned()
    };
    config.coverage.omit = normalize_entries(std::mem::take(&mut config.coverage.omit));
    config.coverage.exclude_lines =
        normalize_entries(std::mem::take(&mut config.coverage.exclude_lines));

    config
}
