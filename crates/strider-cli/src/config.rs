//! Configuration vault – reads/writes `~/.strider/config.toml`.
//!
//! Every tunable of the supervisor lives here: the controller table, the
//! input-device selection and debounce timing, the transport selection, and
//! the recovery retry/backoff parameters.  The file is consumed once at
//! startup into an immutable configuration object.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use strider_input::MonitorConfig;
use strider_supervisor::ArbiterConfig;
use strider_types::{ControllerDescriptor, ControllerKind};

/// Which switching transport the supervisor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportChoice {
    /// In-process controller-manager double (dry runs, CI).
    #[default]
    Sim,
    /// Rosbridge WebSocket to the real control manager.
    Rosbridge,
}

/// Which safety-input device the monitor samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputChoice {
    /// Scripted idle source; estop is driven from the REPL.
    #[default]
    Sim,
    /// gilrs gamepad button.
    Gamepad,
}

/// One controller table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerEntry {
    pub name: String,
    pub kind: ControllerKind,
    /// Bounded wait for one activate/deactivate call, in milliseconds.
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
}

impl ControllerEntry {
    pub fn descriptor(&self) -> ControllerDescriptor {
        ControllerDescriptor::new(
            &self.name,
            self.kind,
            Duration::from_millis(self.activation_timeout_ms),
        )
    }
}

/// Safety-input tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSection {
    #[serde(default)]
    pub device: InputChoice,
    /// Estop button name when `device = "gamepad"` (e.g. "east", "start").
    #[serde(default = "default_estop_button")]
    pub button: String,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

impl InputSection {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            debounce_window: Duration::from_millis(self.debounce_window_ms),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            device: InputChoice::default(),
            button: default_estop_button(),
            sample_interval_ms: default_sample_interval_ms(),
            debounce_window_ms: default_debounce_window_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

/// Recovery retry/backoff tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySection {
    #[serde(default = "default_recovery_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl RecoverySection {
    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            recovery_attempts: self.attempts,
            recovery_backoff_base: Duration::from_millis(self.backoff_base_ms),
            ..ArbiterConfig::default()
        }
    }
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            attempts: default_recovery_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Persisted supervisor configuration stored in `~/.strider/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportChoice,
    /// WebSocket URL of the rosbridge endpoint.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub recovery: RecoverySection,
    #[serde(default = "default_controllers")]
    pub controllers: Vec<ControllerEntry>,
}

impl Config {
    pub fn descriptors(&self) -> Vec<ControllerDescriptor> {
        self.controllers.iter().map(ControllerEntry::descriptor).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportChoice::default(),
            rosbridge_url: default_rosbridge_url(),
            input: InputSection::default(),
            recovery: RecoverySection::default(),
            controllers: default_controllers(),
        }
    }
}

fn default_activation_timeout_ms() -> u64 {
    500
}
fn default_estop_button() -> String {
    "east".to_string()
}
fn default_sample_interval_ms() -> u64 {
    10
}
fn default_debounce_window_ms() -> u64 {
    30
}
fn default_reconnect_backoff_ms() -> u64 {
    500
}
fn default_recovery_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}

fn default_controllers() -> Vec<ControllerEntry> {
    let commanding = |name: &str| ControllerEntry {
        name: name.to_string(),
        kind: ControllerKind::Commanding,
        activation_timeout_ms: 1000,
    };
    vec![
        ControllerEntry {
            name: "safe_hold".to_string(),
            kind: ControllerKind::Safe,
            activation_timeout_ms: default_activation_timeout_ms(),
        },
        commanding("normal"),
        commanding("three_legged"),
        commanding("parkour"),
    ]
}

/// Return the path to `~/.strider/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".strider").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `STRIDER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STRIDER_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `STRIDER_TRANSPORT` (`sim` \| `rosbridge`) | `transport` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STRIDER_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Ok(v) = std::env::var("STRIDER_TRANSPORT") {
        match v.as_str() {
            "sim" => cfg.transport = TransportChoice::Sim,
            "rosbridge" => cfg.transport = TransportChoice::Rosbridge,
            other => tracing::warn!(value = other, "ignoring unknown STRIDER_TRANSPORT"),
        }
    }
}

/// Save the config to disk, creating `~/.strider/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
