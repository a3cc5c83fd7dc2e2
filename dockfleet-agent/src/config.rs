//! Agent configuration
//!
//! Read from `$DOCKFLEET_AGENT_CONFIG`, or `<os config dir>/dockfleet-agent/config.toml`.
//! Missing file means defaults; missing keys take their default too.

use anyhow::{Context, Result};
use dockfleet_common::provision::DEFAULT_RPC_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Ip this host is reachable on; auto-detected when empty
    pub export_ip: String,
    /// Docker Engine API port advertised to the kernel
    pub api_port: u16,
    pub rpc_port: u16,
    /// How long an rpc peer may take to send its request
    pub rpc_read_timeout_ms: u64,
    pub heartbeat_secs: u64,
    pub publish_timeout_ms: u64,
    pub log_level: String,
    pub etcd: EtcdConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            export_ip: String::new(),
            api_port: 2375,
            rpc_port: DEFAULT_RPC_PORT,
            rpc_read_timeout_ms: 10_000,
            heartbeat_secs: 3,
            publish_timeout_ms: 2_000,
            log_level: "info".to_string(),
            etcd: EtcdConfig::default(),
        }
    }
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".to_string()],
            dial_timeout_ms: 2_000,
        }
    }
}

impl AgentConfig {
    /// Load config from the env override or the OS-specific location
    pub async fn load() -> Result<(Self, PathBuf)> {
        let path = match std::env::var_os("DOCKFLEET_AGENT_CONFIG") {
            Some(p) => PathBuf::from(p),
            None => Self::config_file_path()?,
        };
        let config = Self::load_from(&path).await?;
        Ok((config, path))
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("dockfleet-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Configured ip, or the address of the default outbound interface.
    pub fn resolve_export_ip(&self) -> Result<String> {
        let configured = self.export_ip.trim();
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        let ip = local_ip_address::local_ip().context("cannot detect export ip, set export_ip")?;
        Ok(ip.to_string())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn rpc_read_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_read_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.etcd.dial_timeout_ms)
    }
}
