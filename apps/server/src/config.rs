//! Server configuration.
//!
//! Loaded from an optional YAML file, then environment variables, then CLI
//! flags, in that precedence order (file → env → CLI).

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the WebSocket server to.
    /// Override: `RESONATE_BIND_ADDR`
    pub bind_addr: IpAddr,

    /// Port to bind the WebSocket server to.
    /// Override: `RESONATE_BIND_PORT`
    pub bind_port: u16,

    /// Human-readable server name advertised in `source/hello`.
    pub server_name: String,

    /// Group ids created at startup, before any client joins.
    pub default_groups: Vec<String>,

    /// Per-client outbound backlog bound (§7 Capacity errors): once a
    /// client's queue exceeds this many frames, it is evicted.
    pub max_client_backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            bind_port: 5900,
            server_name: "Resonate Server".into(),
            default_groups: vec!["living-room".into()],
            max_client_backlog: 256,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RESONATE_BIND_ADDR") {
            if let Ok(addr) = val.parse() {
                self.bind_addr = addr;
            }
        }
        if let Ok(val) = std::env::var("RESONATE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("RESONATE_SERVER_NAME") {
            self.server_name = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_all_interfaces_on_5900() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_port, 5900);
        assert_eq!(config.bind_addr, IpAddr::from([0, 0, 0, 0]));
    }

    #[test]
    fn loading_without_a_file_falls_back_to_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.default_groups, vec!["living-room".to_string()]);
    }
}
