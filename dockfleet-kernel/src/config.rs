use dockfleet_common::directory::{DEFAULT_READ_TIMEOUT, DEFAULT_STALE_AFTER_SECS};
use dockfleet_common::provision::DEFAULT_RPC_PORT;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: SocketAddr,
    /// Used when RUST_LOG is not set
    pub log_level: String,
    pub directory: DirectoryConf,
    pub runtime: RuntimeConf,
    pub provision: ProvisionConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DirectoryConf {
    pub endpoints: Vec<String>,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub stale_after_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConf {
    pub dial_timeout_secs: u64,
    /// Port used by `/pool/{ip}/reconnect` when the caller gives none
    pub default_port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProvisionConf {
    pub timeout_ms: u64,
    pub default_rpc_port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".into(),
            directory: DirectoryConf::default(),
            runtime: RuntimeConf::default(),
            provision: ProvisionConf::default(),
        }
    }
}

impl Default for DirectoryConf {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".into()],
            dial_timeout_ms: 2_000,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

impl Default for RuntimeConf {
    fn default() -> Self {
        Self { dial_timeout_secs: 10, default_port: 2375 }
    }
}

impl Default for ProvisionConf {
    fn default() -> Self {
        Self { timeout_ms: 10_000, default_rpc_port: DEFAULT_RPC_PORT }
    }
}

impl DirectoryConf {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

impl ProvisionConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where the running configuration came from, reported once logging is up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(String),
    Missing(String),
    Invalid { path: String, error: String },
}

pub async fn load_config() -> (KernelConfig, ConfigOrigin) {
    let path = std::env::var("DOCKFLEET_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> (KernelConfig, ConfigOrigin) {
    if !Path::new(path).exists() {
        return (KernelConfig::default(), ConfigOrigin::Missing(path.to_string()));
    }

    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            return (
                KernelConfig::default(),
                ConfigOrigin::Invalid { path: path.to_string(), error: e.to_string() },
            )
        }
    };
    if txt.trim().is_empty() {
        return (KernelConfig::default(), ConfigOrigin::File(path.to_string()));
    }

    match serde_yaml::from_str(&txt) {
        Ok(cfg) => (cfg, ConfigOrigin::File(path.to_string())),
        Err(e) => (
            KernelConfig::default(),
            ConfigOrigin::Invalid { path: path.to_string(), error: e.to_string() },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_yaml_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "listen: 127.0.0.1:9090\ndirectory:\n  endpoints: [\"etcd-1:2379\", \"etcd-2:2379\"]\n").unwrap();

        let (cfg, origin) = load_config_from(path.to_str().unwrap()).await;
        assert!(matches!(origin, ConfigOrigin::File(_)));
        assert_eq!(cfg.listen.port(), 9090);
        assert_eq!(cfg.directory.endpoints.len(), 2);
        assert_eq!(cfg.directory.read_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.provision.default_rpc_port, 19876);
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let (cfg, origin) = load_config_from("/nonexistent/kernel.yaml").await;
        assert_eq!(cfg, KernelConfig::default());
        assert!(matches!(origin, ConfigOrigin::Missing(_)));
    }

    #[tokio::test]
    async fn invalid_yaml_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "listen: [not, an, addr]\n").unwrap();

        let (cfg, origin) = load_config_from(path.to_str().unwrap()).await;
        assert_eq!(cfg, KernelConfig::default());
        assert!(matches!(origin, ConfigOrigin::Invalid { .. }));
    }
}
