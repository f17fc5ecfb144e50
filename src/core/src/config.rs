use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::paths::buddy_config_path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuddyConfig {
    pub version: u32,
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub debug: DebugConfig,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerConfig::default(),
            stream: StreamConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl BuddyConfig {
    pub fn load() -> Result<Self, String> {
        let path = buddy_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        buddy_config_path()
    }
}

/// Where the pipeline backend lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Connect timeout, and total timeout for non-streaming requests.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Streaming and reconciliation tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Wait before each re-fetch of the log after a turn ends.
    pub reconcile_delay_ms: u64,
    /// Re-fetches allowed while the log's last turn is still unterminated.
    pub reconcile_attempts: u32,
    /// Capacity of the update channel handed to observers.
    pub update_buffer: usize,
    /// Trace every decoded frame.
    pub log_frames: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconcile_delay_ms: 1_000,
            reconcile_attempts: 3,
            update_buffer: 256,
            log_frames: false,
        }
    }
}

impl StreamConfig {
    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub buddy_debug_env: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            buddy_debug_env: "BUDDY_DEBUG".to_string(),
        }
    }
}

impl DebugConfig {
    pub fn enabled(&self) -> bool {
        matches!(
            std::env::var(&self.buddy_debug_env).as_deref(),
            Ok("1" | "true" | "TRUE" | "yes" | "YES")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = BuddyConfig::parse("").unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.server.base_url, "http://localhost:8000");
        assert_eq!(config.stream.reconcile_delay(), Duration::from_secs(1));
        assert_eq!(config.stream.reconcile_attempts, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = BuddyConfig::parse(
            r#"
[server]
base_url = "http://studio.local:9000"

[stream]
reconcile_delay_ms = 250
log_frames = true
"#,
        )
        .unwrap();
        assert_eq!(config.server.base_url, "http://studio.local:9000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.stream.reconcile_delay_ms, 250);
        assert_eq!(config.stream.reconcile_attempts, 3);
        assert!(config.stream.log_frames);
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = BuddyConfig::parse("[stream\nreconcile_delay_ms = 1").unwrap_err();
        assert!(err.starts_with("parse config.toml"));
    }
}
