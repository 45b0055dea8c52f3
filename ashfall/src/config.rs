use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// One listen/connect endpoint from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,
}

fn default_max_clients() -> u32 {
    1000
}

/// Process configuration: where the authoritative game server lives and
/// where this chunk server listens.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub game_server: EndpointConfig,
    pub chunk_server: EndpointConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_endpoints() {
        let text = r#"{
            "game_server": {"host": "127.0.0.1", "port": 27016, "max_clients": 100},
            "chunk_server": {"host": "0.0.0.0", "port": 27017}
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert_eq!(config.game_server.port, 27016);
        assert_eq!(config.chunk_server.host, "0.0.0.0");
        assert_eq!(config.chunk_server.max_clients, 1000);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
