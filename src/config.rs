use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_REFRESH_SECONDS: u64 = 1;
const DEFAULT_MESSAGE_PREVIEW_CHARS: usize = 100;
const MIN_MESSAGE_PREVIEW_CHARS: usize = 16;
const CONFIG_SCHEMA_VERSION: u32 = 2;

pub const DEFAULT_TARGET_SUBSTRING: &str = "claude";
pub const DEFAULT_EXCLUDED_SUBSTRINGS: [&str; 1] = ["Claude.app"];
pub const DEFAULT_HELPER_MARKERS: [&str; 2] = ["--claude-in-chrome-mcp", "--mcp"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub schema_version: u32,
    pub refresh_interval_secs: u64,
    pub show_helpers: bool,
    pub process: ProcessMatchConfig,
    pub display: DisplayConfig,
}

/// String-level rules deciding which processes belong to the monitored tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessMatchConfig {
    pub target_substring: String,
    pub excluded_substrings: Vec<String>,
    pub helper_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub message_preview_chars: usize,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub refresh_interval: Duration,
    pub show_helpers: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            refresh_interval_secs: DEFAULT_REFRESH_SECONDS,
            show_helpers: false,
            process: ProcessMatchConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for ProcessMatchConfig {
    fn default() -> Self {
        Self {
            target_substring: DEFAULT_TARGET_SUBSTRING.to_string(),
            excluded_substrings: DEFAULT_EXCLUDED_SUBSTRINGS
                .iter()
                .map(ToString::to_string)
                .collect(),
            helper_markers: DEFAULT_HELPER_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            message_preview_chars: DEFAULT_MESSAGE_PREVIEW_CHARS,
        }
    }
}

impl WatchConfig {
    pub fn load_or_init() -> Result<Self> {
        let cfg_path = config_path();
        if let Some(parent) = cfg_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        if cfg_path.exists() {
            let raw = fs::read_to_string(&cfg_path)
                .with_context(|| format!("failed to read {}", cfg_path.display()))?;
            let mut parsed: WatchConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", cfg_path.display()))?;
            if parsed.normalize_and_migrate() {
                parsed.save()?;
            }
            Ok(parsed)
        } else {
            let cfg = WatchConfig::default();
            cfg.save()?;
            Ok(cfg)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }

        if self.refresh_interval_secs == 0 {
            self.refresh_interval_secs = DEFAULT_REFRESH_SECONDS;
            changed = true;
        }

        let target = self.process.target_substring.trim().to_string();
        if target.is_empty() {
            self.process.target_substring = DEFAULT_TARGET_SUBSTRING.to_string();
            changed = true;
        } else if target != self.process.target_substring {
            self.process.target_substring = target;
            changed = true;
        }

        if normalize_string_list(&mut self.process.excluded_substrings) {
            changed = true;
        }
        if normalize_string_list(&mut self.process.helper_markers) {
            changed = true;
        }

        if self.display.message_preview_chars < MIN_MESSAGE_PREVIEW_CHARS {
            self.display.message_preview_chars = MIN_MESSAGE_PREVIEW_CHARS;
            changed = true;
        }

        changed
    }
}

/// CLI flags win over the environment, which wins over the config file.
pub fn runtime_settings(
    config: &WatchConfig,
    interval_override: Option<u64>,
    show_helpers_flag: bool,
) -> RuntimeSettings {
    let refresh_secs = interval_override
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| env_u64("CLAUDEWATCH_REFRESH_SECONDS", config.refresh_interval_secs));
    RuntimeSettings {
        refresh_interval: Duration::from_secs(refresh_secs.max(1)),
        show_helpers: show_helpers_flag || config.show_helpers,
    }
}

/// Root of the monitored tool's per-user state, `~/.claude` unless
/// `CLAUDE_CONFIG_DIR` points elsewhere.
pub fn claude_home() -> PathBuf {
    if let Ok(custom) = env::var("CLAUDE_CONFIG_DIR") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

pub fn projects_path() -> PathBuf {
    claude_home().join("projects")
}

pub fn config_path() -> PathBuf {
    if let Ok(custom) = env::var("CLAUDEWATCH_CONFIG") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claudewatch")
        .join("config.json")
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn normalize_string_list(values: &mut Vec<String>) -> bool {
    let normalized: Vec<String> = values
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .fold(Vec::new(), |mut acc, value| {
            if !acc.contains(&value) {
                acc.push(value);
            }
            acc
        });
    if *values != normalized {
        *values = normalized;
        return true;
    }
    false
}
