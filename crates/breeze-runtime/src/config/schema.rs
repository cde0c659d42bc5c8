//! Configuration schema definitions.
//!
//! ```toml
//! [connection]
//! url = "ws://127.0.0.1:3001"
//! access_token = "secret"
//! reconnect_delay_ms = 1000
//!
//! [bot]
//! operators = [123456]
//! diagnostic_replies = true
//! notify_operator_on_error = true
//!
//! [liveness]
//! min_report_interval_secs = 60
//!
//! [api]
//! timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! output = "stdout"
//! file_path = "logs/breeze.log"
//! rotation = "daily"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BreezeConfig {
    /// Gateway connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Bot behaviour.
    #[serde(default)]
    pub bot: BotConfig,

    /// Heartbeat-based liveness reporting.
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Outbound API calls.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Connection
// =============================================================================

/// WebSocket gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Gateway URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Access token appended as the `access_token` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Fixed delay between a lost connection and the next attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            access_token: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

// =============================================================================
// Bot
// =============================================================================

/// Bot behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    /// Operator user ids. They receive connect notices and crash reports.
    #[serde(default)]
    pub operators: Vec<i64>,

    /// Reply in chat when a handler fails on a message.
    #[serde(default = "default_true")]
    pub diagnostic_replies: bool,

    /// Send the first operator a private message when the worker catches
    /// a panic.
    #[serde(default = "default_true")]
    pub notify_operator_on_error: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            operators: Vec::new(),
            diagnostic_replies: true,
            notify_operator_on_error: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Liveness / API
// =============================================================================

/// Liveness reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessConfig {
    /// Minimum seconds between two status reports.
    #[serde(default = "default_min_report_interval_secs")]
    pub min_report_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            min_report_interval_secs: default_min_report_interval_secs(),
        }
    }
}

impl LivenessConfig {
    /// Report interval as a [`Duration`].
    pub fn min_report_interval(&self) -> Duration {
        Duration::from_secs(self.min_report_interval_secs)
    }
}

fn default_min_report_interval_secs() -> u64 {
    60
}

/// Outbound API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// How long `Bot::call` waits for a response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

// =============================================================================
// Logging
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line compact output.
    #[default]
    Compact,
    /// Default fmt output.
    Full,
    /// Multi-line human readable output.
    Pretty,
    /// Newline-delimited JSON (requires the `json-log` feature).
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Write to `file_path`.
    File,
}

/// File log rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Never,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Base level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file for [`LogOutput::File`].
    #[serde(default = "default_log_file")]
    pub file_path: Option<PathBuf>,

    /// File rotation.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `breeze_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: default_log_file(),
            rotation: LogRotation::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// The configured base level, if it names one.
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        self.level.parse().ok()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/breeze.log"))
}
