//! Configuration: connection knobs and logging, loadable from TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load_or_default(path: &Path) -> Config {
        if !path.exists() {
            return Config::default();
        }
        match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                Config::default()
            }
        }
    }
}

/// Who initiated the TCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Active,
    Passive,
}

/// Whether the session runs over TLS; governs worker-thread naming only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketConnectionType {
    Ssl,
    NonSsl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connection_type: ConnectionType,
    pub socket_connection_type: SocketConnectionType,
    /// How long an IN_TRANSIT registry entry blocks its dependents before it
    /// is presumed lost.
    pub in_transit_expiry_ms: u64,
    /// Default deadline for `monitor`; absent means no deadline.
    pub monitor_timeout_secs: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Active,
            socket_connection_type: SocketConnectionType::NonSsl,
            in_transit_expiry_ms: 30_000,
            monitor_timeout_secs: None,
        }
    }
}

impl ConnectionConfig {
    pub fn monitor_timeout(&self) -> Option<Duration> {
        self.monitor_timeout_secs.map(Duration::from_secs)
    }

    pub fn worker_name(&self) -> String {
        let role = match self.connection_type {
            ConnectionType::Active => "active",
            ConnectionType::Passive => "passive",
        };
        match self.socket_connection_type {
            SocketConnectionType::Ssl => format!("ovsdb-{role}-ssl-worker"),
            SocketConnectionType::NonSsl => format!("ovsdb-{role}-worker"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_expectations() {
        let config = Config::default();
        assert_eq!(config.connection.in_transit_expiry_ms, 30_000);
        assert_eq!(config.connection.monitor_timeout_secs, None);
        assert_eq!(config.connection.connection_type, ConnectionType::Active);
        assert_eq!(config.connection.worker_name(), "ovsdb-active-worker");
    }

    #[test]
    fn worker_name_tracks_socket_type() {
        let mut connection = ConnectionConfig::default();
        connection.connection_type = ConnectionType::Passive;
        connection.socket_connection_type = SocketConnectionType::Ssl;
        assert_eq!(connection.worker_name(), "ovsdb-passive-ssl-worker");
        connection.socket_connection_type = SocketConnectionType::NonSsl;
        assert_eq!(connection.worker_name(), "ovsdb-passive-worker");

        // The socket type is kept on the active path too.
        connection.connection_type = ConnectionType::Active;
        connection.socket_connection_type = SocketConnectionType::Ssl;
        assert_eq!(connection.worker_name(), "ovsdb-active-ssl-worker");
        connection.socket_connection_type = SocketConnectionType::NonSsl;
        assert_eq!(connection.worker_name(), "ovsdb-active-worker");
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[connection]
connection_type = "passive"
socket_connection_type = "ssl"
in_transit_expiry_ms = 10000
monitor_timeout_secs = 5

[logging]
stdout = false
format = "json"
"#,
        )
        .expect("write config");

        let config = Config::load(&path).expect("load config");
        assert_eq!(config.connection.connection_type, ConnectionType::Passive);
        assert_eq!(config.connection.in_transit_expiry_ms, 10_000);
        assert_eq!(
            config.connection.monitor_timeout(),
            Some(Duration::from_secs(5))
        );
        assert!(!config.logging.stdout);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.connection.in_transit_expiry_ms, 30_000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "not = [valid").expect("write config");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
