use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const CONFIG_DIR_ENV: &str = "GENIE_CONFIG_DIR";
const CONFIG_DIR_NAME: &str = "genie";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_TRACKER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub fn config_directory() -> AppResult<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| {
            AppError::Configuration("could not determine the user config directory".to_string())
        })
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}

/// Values persisted by `genie config init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
    pub jira_base_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_token: Option<String>,
    pub default_project: Option<String>,
    pub epic_issue_type: Option<String>,
    pub story_issue_type: Option<String>,
    pub subtask_issue_type: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub system_prompt: Option<String>,
    pub model_timeout_secs: Option<u64>,
    pub tracker_timeout_secs: Option<u64>,
    pub max_image_bytes: Option<usize>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Configuration(format!("invalid config file {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Tracker issue-type names; instances may localize or rename them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTypeNames {
    pub epic: String,
    pub story: String,
    pub subtask: String,
}

impl Default for IssueTypeNames {
    fn default() -> Self {
        Self {
            epic: "Epic".to_string(),
            story: "Story".to_string(),
            subtask: "Sub-task".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira_base_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_token: Option<String>,
    pub default_project: Option<String>,
    pub issue_types: IssueTypeNames,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub system_prompt: Option<String>,
    pub model_timeout: Duration,
    pub tracker_timeout: Duration,
    pub max_image_bytes: usize,
}

impl AppConfig {
    pub fn load() -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        Self::resolve(stored, |key| env::var(key).ok())
    }

    /// Overlays environment values on top of the stored file.
    pub fn resolve(stored: StoredConfig, env: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let pick = |key: &str, fallback: Option<String>| {
            env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .or_else(|| fallback.filter(|value| !value.trim().is_empty()))
        };

        let defaults = IssueTypeNames::default();
        let issue_types = IssueTypeNames {
            epic: pick("JIRA_EPIC_ISSUE_TYPE", stored.epic_issue_type).unwrap_or(defaults.epic),
            story: pick("JIRA_STORY_ISSUE_TYPE", stored.story_issue_type).unwrap_or(defaults.story),
            subtask: pick("JIRA_SUBTASK_ISSUE_TYPE", stored.subtask_issue_type)
                .unwrap_or(defaults.subtask),
        };

        let model_timeout = parse_timeout(
            "GENIE_MODEL_TIMEOUT_SECS",
            env("GENIE_MODEL_TIMEOUT_SECS"),
            stored.model_timeout_secs,
            DEFAULT_MODEL_TIMEOUT_SECS,
        )?;
        let tracker_timeout = parse_timeout(
            "GENIE_TRACKER_TIMEOUT_SECS",
            env("GENIE_TRACKER_TIMEOUT_SECS"),
            stored.tracker_timeout_secs,
            DEFAULT_TRACKER_TIMEOUT_SECS,
        )?;
        let max_image_bytes = parse_number(
            "GENIE_MAX_IMAGE_BYTES",
            env("GENIE_MAX_IMAGE_BYTES"),
            stored.max_image_bytes,
        )?
        .unwrap_or(DEFAULT_MAX_IMAGE_BYTES);

        // Prompts keep their whitespace; only blank values are ignored.
        let system_prompt = env("SYSTEM_PROMPT")
            .filter(|value| !value.trim().is_empty())
            .or_else(|| stored.system_prompt.filter(|value| !value.trim().is_empty()));

        Ok(Self {
            jira_base_url: pick("JIRA_URL", stored.jira_base_url),
            jira_email: pick("JIRA_EMAIL", stored.jira_email),
            jira_token: pick("JIRA_API_TOKEN", stored.jira_token),
            default_project: pick("JIRA_PROJECT_KEY", stored.default_project),
            issue_types,
            gemini_api_key: pick("GOOGLE_API_KEY", stored.gemini_api_key),
            gemini_model: pick("GEMINI_MODEL", stored.gemini_model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            system_prompt,
            model_timeout,
            tracker_timeout,
            max_image_bytes,
        })
    }
}

/// A zero timeout would fail every request immediately.
fn parse_timeout(
    key: &str,
    env_value: Option<String>,
    stored: Option<u64>,
    default_secs: u64,
) -> AppResult<Duration> {
    match parse_number(key, env_value, stored)?.unwrap_or(default_secs) {
        0 => Err(AppError::Configuration(format!(
            "{key} must be at least 1 second"
        ))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    env_value: Option<String>,
    stored: Option<T>,
) -> AppResult<Option<T>> {
    match env_value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Configuration(format!("{key} must be a number, got '{raw}'"))),
        None => Ok(stored),
    }
}
