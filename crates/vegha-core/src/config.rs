//! Configuration loading and typed config structures for the streaming core.
//!
//! The configuration lives in `vegha-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, and provides a
//! loader that reads, overrides and validates the file. Every field has a
//! default, so a partial (or absent) file is fine.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 5000
//! simulator:
//!   binary: sumo
//!   scenario: scenarios/berlin/osm.sumocfg
//! playback:
//!   base_step_interval_ms: 100
//!   step_budget: 7200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`SimulatorConfig::binary`].
pub const ENV_SUMO_BINARY: &str = "VEGHA_SUMO_BINARY";
/// Environment variable overriding [`SimulatorConfig::scenario`].
pub const ENV_SCENARIO: &str = "VEGHA_SCENARIO";
/// Environment variable overriding [`HttpConfig::port`].
pub const ENV_PORT: &str = "VEGHA_PORT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value {value:?} in {variable}: {reason}")]
    Override {
        /// The environment variable name.
        variable: &'static str,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A value parsed but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// HTTP / `WebSocket` listener.
    #[serde(default)]
    pub server: HttpConfig,

    /// How to launch and reach the simulator.
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Step cadence and run length.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Snapshot fan-out.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StreamConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `VEGHA_SUMO_BINARY` overrides `simulator.binary`
    /// - `VEGHA_SCENARIO` overrides `simulator.scenario`
    /// - `VEGHA_PORT` overrides `server.port`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying environment
    /// overrides and validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_SUMO_BINARY) {
            self.simulator.binary = val;
        }
        if let Some(val) = lookup(ENV_SCENARIO) {
            self.simulator.scenario = PathBuf::from(val);
        }
        if let Some(val) = lookup(ENV_PORT) {
            self.server.port = val.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Override {
                    variable: ENV_PORT,
                    value: val.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Reject values the streaming loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playback.base_step_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "playback.base_step_interval_ms must be positive".to_owned(),
            ));
        }
        if self.playback.step_budget == 0 {
            return Err(ConfigError::Invalid(
                "playback.step_budget must be positive".to_owned(),
            ));
        }
        if self.broadcast.capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.capacity must be positive".to_owned(),
            ));
        }
        if self.simulator.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "simulator.connect_attempts must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Simulator launch configuration.
///
/// The scenario file is handed to the simulator untouched; nothing here
/// parses it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatorConfig {
    /// Simulator executable (`sumo` or `sumo-gui`), resolved via `PATH`.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Scenario configuration file (`.sumocfg`).
    #[serde(default = "default_scenario")]
    pub scenario: PathBuf,

    /// Fixed remote-control port. A free local port is picked when unset.
    #[serde(default)]
    pub remote_port: Option<u16>,

    /// Connection attempts before the simulator is declared unavailable.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Delay between connection attempts in milliseconds.
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,

    /// How long to wait for the simulator to exit after close.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,

    /// Extra command-line arguments appended to the launch.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl SimulatorConfig {
    /// Delay between connection attempts.
    pub const fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Grace period for the simulator process to exit after close.
    pub const fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            scenario: default_scenario(),
            remote_port: None,
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            close_grace_ms: default_close_grace_ms(),
            extra_args: Vec::new(),
        }
    }
}

/// Playback cadence, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlaybackConfig {
    /// Sleep between steps at speed 1x, in milliseconds.
    #[serde(default = "default_base_step_interval_ms")]
    pub base_step_interval_ms: u64,

    /// Maximum steps per run before it stops on its own.
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,
}

impl PlaybackConfig {
    /// Sleep between steps at speed 1x.
    pub const fn base_step_interval(&self) -> Duration {
        Duration::from_millis(self.base_step_interval_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_step_interval_ms: default_base_step_interval_ms(),
            step_budget: default_step_budget(),
        }
    }
}

/// Snapshot broadcast configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Snapshots buffered per viewer before a slow viewer skips ahead.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Logging configuration.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (`info`, `vegha_core=debug`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    5000
}

fn default_binary() -> String {
    "sumo".to_owned()
}

fn default_scenario() -> PathBuf {
    PathBuf::from("osm.sumocfg")
}

const fn default_connect_attempts() -> u32 {
    50
}

const fn default_connect_retry_delay_ms() -> u64 {
    200
}

const fn default_close_grace_ms() -> u64 {
    2000
}

const fn default_base_step_interval_ms() -> u64 {
    100
}

const fn default_step_budget() -> u64 {
    7200
}

const fn default_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.simulator.binary, "sumo");
        assert_eq!(config.playback.base_step_interval(), Duration::from_millis(100));
        assert_eq!(config.playback.step_budget, 7200);
        assert_eq!(config.broadcast.capacity, 64);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
server:
  host: 127.0.0.1
  port: 8088
simulator:
  binary: sumo-gui
  scenario: scenarios/berlin/osm.sumocfg
  remote_port: 8813
  connect_attempts: 10
  connect_retry_delay_ms: 500
  close_grace_ms: 100
  extra_args: [--step-length, '0.5']
playback:
  base_step_interval_ms: 250
  step_budget: 100
broadcast:
  capacity: 8
logging:
  level: debug
  json: true
";
        let mut config: StreamConfig = serde_yml::from_str(yaml).unwrap();
        config.apply_overrides(|_| None).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.simulator.binary, "sumo-gui");
        assert_eq!(
            config.simulator.scenario,
            PathBuf::from("scenarios/berlin/osm.sumocfg")
        );
        assert_eq!(config.simulator.remote_port, Some(8813));
        assert_eq!(config.simulator.connect_retry_delay(), Duration::from_millis(500));
        assert_eq!(config.simulator.extra_args, vec!["--step-length", "0.5"]);
        assert_eq!(config.playback.base_step_interval_ms, 250);
        assert_eq!(config.playback.step_budget, 100);
        assert_eq!(config.broadcast.capacity, 8);
        assert!(config.logging.json);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: StreamConfig = serde_yml::from_str("playback:\n  step_budget: 5\n").unwrap();
        assert_eq!(config.playback.step_budget, 5);
        assert_eq!(config.playback.base_step_interval_ms, 100);
        assert_eq!(config.server, HttpConfig::default());
    }

    #[test]
    fn env_overrides_replace_yaml_values() {
        let env: BTreeMap<&str, &str> = [
            (ENV_SUMO_BINARY, "/opt/sumo/bin/sumo"),
            (ENV_SCENARIO, "city.sumocfg"),
            (ENV_PORT, "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = StreamConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| (*v).to_owned()))
            .unwrap();

        assert_eq!(config.simulator.binary, "/opt/sumo/bin/sumo");
        assert_eq!(config.simulator.scenario, PathBuf::from("city.sumocfg"));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = StreamConfig::default();
        let result =
            config.apply_overrides(|name| (name == ENV_PORT).then(|| "not-a-port".to_owned()));
        assert!(matches!(
            result,
            Err(ConfigError::Override {
                variable: ENV_PORT,
                ..
            })
        ));
    }

    #[test]
    fn zero_interval_or_budget_is_invalid() {
        let mut config = StreamConfig::default();
        config.playback.base_step_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StreamConfig::default();
        config.playback.step_budget = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let result = StreamConfig::from_file(Path::new("/nonexistent/vegha-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
