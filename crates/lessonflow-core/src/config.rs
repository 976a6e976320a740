//! Lessonflow configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{LessonSettings, ScoringMode};

/// Lesson settings applied when a lesson file leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSettings {
    #[serde(default)]
    pub scoring: ScoringMode,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub partial_credit: bool,
    #[serde(default)]
    pub min_questions: u32,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringMode::Custom,
            max_attempts: default_max_attempts(),
            partial_credit: false,
            min_questions: 0,
        }
    }
}

impl From<&DefaultSettings> for LessonSettings {
    fn from(defaults: &DefaultSettings) -> Self {
        LessonSettings {
            scoring: defaults.scoring,
            max_attempts: defaults.max_attempts,
            partial_credit: defaults.partial_credit,
            min_questions: defaults.min_questions,
        }
    }
}

/// Top-level lessonflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonflowConfig {
    #[serde(default)]
    pub defaults: DefaultSettings,
    /// Seed for random jumps; unset means a fresh seed per run.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Output directory for session reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./lessonflow-results")
}

impl Default for LessonflowConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultSettings::default(),
            seed: None,
            output_dir: default_output_dir(),
        }
    }
}

impl LessonflowConfig {
    pub fn lesson_settings(&self) -> LessonSettings {
        LessonSettings::from(&self.defaults)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `lessonflow.toml` in the current directory
/// 2. `~/.config/lessonflow/config.toml`
///
/// Environment variable overrides: `LESSONFLOW_MAX_ATTEMPTS`, `LESSONFLOW_SEED`.
pub fn load_config() -> Result<LessonflowConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<LessonflowConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("lessonflow.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => LessonflowConfig::default(),
    };

    // Apply env var overrides
    if let Ok(value) = std::env::var("LESSONFLOW_MAX_ATTEMPTS") {
        config.defaults.max_attempts = value
            .trim()
            .parse()
            .with_context(|| format!("invalid LESSONFLOW_MAX_ATTEMPTS: {value}"))?;
    }
    if let Ok(value) = std::env::var("LESSONFLOW_SEED") {
        config.seed = Some(
            value
                .trim()
                .parse()
                .with_context(|| format!("invalid LESSONFLOW_SEED: {value}"))?,
        );
    }

    Ok(config)
}

/// Parse a config document, expanding `${VAR}` references in path values.
pub fn parse_config(content: &str) -> Result<LessonflowConfig> {
    let mut config: LessonflowConfig = toml::from_str(content)?;
    let output_dir = config.output_dir.to_string_lossy().into_owned();
    config.output_dir = PathBuf::from(resolve_env_vars(&output_dir));
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("lessonflow"))
}
