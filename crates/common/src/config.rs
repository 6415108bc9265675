// Local configuration shared by the daemon and the CLI.
//
// Config file: `~/.gdslink/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::extractor::{
    ExtractorConfig, TruncationPolicy, DEFAULT_KEEP_TAIL, DEFAULT_MAX_BUFFER, DEFAULT_TOOL_TAG,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9009;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const MIN_POLL_INTERVAL_MS: u64 = 20;
const MAX_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;

/// Root directory for gdslink state: `~/.gdslink/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gdslink"))
}

/// Path to the config file: `~/.gdslink/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    /// Control server settings.
    pub server: ServerConfig,
    /// Stream relay settings.
    pub relay: RelayConfig,
}

impl Config {
    /// Load from `~/.gdslink/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|path| Self::load_from(&path).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface the control server binds to.
    pub host: String,
    pub port: u16,
    /// Selection poll period in milliseconds, clamped to [20, 5000].
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// `host:port` suitable for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Value of the `tool` field that marks a command.
    pub tool_tag: String,
    /// Pending-text size that triggers the buffer guard, in bytes.
    pub max_buffer: usize,
    /// Bytes kept by the `tail` truncation policy.
    pub keep_tail: usize,
    pub truncation: TruncationPolicy,
    /// Connect/read timeout for each forwarded command.
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tool_tag: DEFAULT_TOOL_TAG.to_string(),
            max_buffer: DEFAULT_MAX_BUFFER,
            keep_tail: DEFAULT_KEEP_TAIL,
            truncation: TruncationPolicy::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl RelayConfig {
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            tool_tag: self.tool_tag.clone(),
            max_buffer: self.max_buffer,
            keep_tail: self.keep_tail,
            truncation: self.truncation,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_wire_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.server.address(), "127.0.0.1:9009");
        assert_eq!(cfg.server.poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.relay.tool_tag, "klayout");
        assert_eq!(cfg.relay.max_buffer, 8192);
        assert_eq!(cfg.relay.keep_tail, 4096);
        assert_eq!(cfg.relay.truncation, TruncationPolicy::DropOpener);
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = Config {
            server: ServerConfig { host: "0.0.0.0".into(), port: 9100, poll_interval_ms: 50 },
            relay: RelayConfig {
                tool_tag: "layout".into(),
                truncation: TruncationPolicy::Tail,
                ..RelayConfig::default()
            },
        };
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
[server]
port = 9010
poll_interval_ms = 100

[relay]
tool_tag = "gds"
truncation = "tail"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 9010);
        assert_eq!(cfg.server.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.relay.tool_tag, "gds");
        assert_eq!(cfg.relay.truncation, TruncationPolicy::Tail);
        assert_eq!(cfg.relay.max_buffer, 8192);
    }

    #[test]
    fn poll_interval_is_clamped() {
        let fast = ServerConfig { poll_interval_ms: 1, ..ServerConfig::default() };
        assert_eq!(fast.poll_interval(), Duration::from_millis(20));
        let slow = ServerConfig { poll_interval_ms: 60_000, ..ServerConfig::default() };
        assert_eq!(slow.poll_interval(), Duration::from_millis(5_000));
    }

    #[test]
    fn relay_rejects_unknown_fields() {
        let error = toml::from_str::<Config>("[relay]\nmax_bufer = 10\n").expect_err("typo should fail");
        assert!(error.to_string().contains("unknown field `max_bufer`"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");
        Config::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn config_path_is_under_home() {
        if let Some(path) = config_path() {
            assert!(path.ends_with(".gdslink/config.toml"));
        }
    }
}
