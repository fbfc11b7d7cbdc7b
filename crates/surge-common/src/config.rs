//! Configuration for the SurgeKV server and client binaries
//!
//! Both binaries are primarily flag-driven; the server additionally accepts a
//! TOML file plus `SURGE_*` environment overrides, highest priority last:
//! defaults < file < flags < environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Server process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub listen_addr: String,
    /// TCP port for the transactional RPC surface.
    pub port: u16,
    /// Maximum concurrent client connections.
    pub max_connections: usize,
    /// Seconds between statistics reports.
    pub stats_interval_secs: u64,
    /// Default tracing filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            stats_interval_secs: 1,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, or defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Apply `SURGE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SURGE_LISTEN_ADDR") {
            self.listen_addr = val;
        }
        if let Ok(val) = std::env::var("SURGE_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = std::env::var("SURGE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                self.max_connections = n;
            }
        }
        if let Ok(val) = std::env::var("SURGE_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".into()));
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be non-zero".into()));
        }
        if self.stats_interval_secs == 0 {
            return Err(Error::Config("stats_interval_secs must be non-zero".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Client driver configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Servers keys are sharded across. Must be identical, in the same
    /// order, on every client of a deployment.
    pub hosts: Vec<String>,
    /// Zipfian skew parameter of the key distribution.
    pub theta: f64,
    /// Run duration.
    pub duration: Duration,
    /// Per-server dial timeout.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost:8080".to_string()],
            theta: 0.99,
            duration: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::Config("at least one host is required".into()));
        }
        if !(0.0..1.0).contains(&self.theta) {
            return Err(Error::Config(format!(
                "theta must be in [0, 1), got {}",
                self.theta
            )));
        }
        Ok(())
    }
}

/// Parse a `host:port,host:port` list as passed to `--hosts`.
pub fn parse_host_list(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}
