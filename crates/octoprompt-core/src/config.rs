//! Octoprompt configuration system.
//!
//! The config is a single JSON document (camelCase keys, editable by
//! external tools) at `~/.octoprompt/config.json`. [`ConfigHandle`] is the
//! shared, explicitly-passed access point: the engine reads snapshots, the
//! gateway toggles schedules through it, and the owner calls
//! `SchedulerEngine::restart` after any mutation.

use crate::error::{OctopromptError, Result};
use crate::schedule::ScheduleConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// Directory holding prompt template files.
    #[serde(default = "default_prompts_directory")]
    pub prompts_directory: String,
    /// Workspace root, substituted into prompt templates.
    #[serde(default = "default_workspace_directory")]
    pub workspace_directory: String,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
    #[serde(default)]
    pub global_options: GlobalOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_forward: Option<BridgeForwardConfig>,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
fn default_prompts_directory() -> String {
    "~/.octoprompt/prompts".into()
}
fn default_workspace_directory() -> String {
    "~".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            prompts_directory: default_prompts_directory(),
            workspace_directory: default_workspace_directory(),
            schedules: Vec::new(),
            global_options: GlobalOptions::default(),
            slack: None,
            http: None,
            bridge_forward: None,
        }
    }
}

impl AppConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OctopromptError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| OctopromptError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| OctopromptError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path (~/.octoprompt/config.json).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.json")
    }

    /// Get the Octoprompt home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".octoprompt")
    }

    /// The prompts directory with `~` expanded.
    pub fn resolved_prompts_directory(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.prompts_directory).into_owned())
    }

    /// The workspace directory with `~` expanded.
    pub fn resolved_workspace_directory(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.workspace_directory).into_owned())
    }

    /// Look up a schedule by id.
    pub fn schedule(&self, id: &str) -> Option<&ScheduleConfig> {
        self.schedules.iter().find(|s| s.id == id)
    }
}

/// Options that apply to every schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOptions {
    /// Show desktop notifications for fires.
    #[serde(default = "bool_true")]
    pub show_notifications: bool,
    /// Allow two schedules to execute at the same time.
    #[serde(default)]
    pub allow_concurrent_executions: bool,
    /// Path to the assistant CLI binary. Resolved via $PATH when relative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_cli_path: Option<String>,
    /// Directory for daily log files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<String>,
}

fn bool_true() -> bool {
    true
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            show_notifications: true,
            allow_concurrent_executions: false,
            assistant_cli_path: None,
            log_directory: None,
        }
    }
}

/// Slack webhook notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    #[serde(default = "bool_true")]
    pub notify_on_complete: bool,
    #[serde(default = "bool_true")]
    pub notify_on_failure: bool,
}

/// Embedded HTTP control API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Bearer token. Empty means the API is open.
    #[serde(default)]
    pub secret: String,
}

fn default_http_host() -> String {
    "127.0.0.1".into()
}
fn default_http_port() -> u16 {
    19840
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_http_host(),
            port: default_http_port(),
            secret: String::new(),
        }
    }
}

/// Inbound bridge-event relay settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeForwardConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Shared secret for the HMAC-SHA256 body signature.
    #[serde(default)]
    pub webhook_secret: String,
    /// Event types to forward. Absent means forward everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_channel: Option<String>,
}

/// Shared, mutex-guarded access to the live configuration.
///
/// Constructed once in `main` and handed to every collaborator — there is
/// no process-wide singleton or notification bus. Whoever mutates through
/// the handle is responsible for restarting the scheduler afterwards.
pub struct ConfigHandle {
    path: PathBuf,
    current: Mutex<AppConfig>,
}

impl ConfigHandle {
    /// Load the config at `path`. A missing file yields the default config.
    pub fn load(path: PathBuf) -> Self {
        let config = if path.exists() {
            match AppConfig::load_from(&path) {
                Ok(config) => {
                    tracing::info!(
                        "📋 Loaded config with {} schedule(s) from {}",
                        config.schedules.len(),
                        path.display()
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!("⚠️ {e} — starting with empty config");
                    AppConfig::default()
                }
            }
        } else {
            tracing::info!("📋 No config found at {} — starting empty", path.display());
            AppConfig::default()
        };
        Self {
            path,
            current: Mutex::new(config),
        }
    }

    /// Wrap an already-built config (used by tests and first-run setup).
    pub fn with_config(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            current: Mutex::new(config),
        }
    }

    /// A point-in-time copy of the config.
    pub fn snapshot(&self) -> AppConfig {
        self.current.lock().clone()
    }

    /// Re-read the config file from disk. Keeps the old config on error.
    pub fn reload(&self) -> Result<()> {
        let fresh = AppConfig::load_from(&self.path)?;
        tracing::info!("🔄 Config reloaded ({} schedule(s))", fresh.schedules.len());
        *self.current.lock() = fresh;
        Ok(())
    }

    /// Flip a schedule's enabled flag and persist. Returns the new value.
    pub fn toggle_schedule(&self, id: &str) -> Result<bool> {
        let mut config = self.current.lock();
        let schedule = config
            .schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| OctopromptError::ScheduleNotFound(id.to_string()))?;
        schedule.enabled = !schedule.enabled;
        let enabled = schedule.enabled;
        if let Err(e) = config.save_to(&self.path) {
            tracing::warn!("⚠️ Failed to save config: {e}");
        }
        Ok(enabled)
    }
}
