//! Container request validation and translation into runtime create bodies.

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use dockfleet_common::GB;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const CPU_PERIOD: i64 = 100_000;
pub const LOCALTIME_BIND: &str = "/etc/localtime:/etc/localtime:ro";

/// Decimal accepted either as JSON text or as a JSON number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecimalInput {
    Number(f64),
    Text(String),
}

impl Default for DecimalInput {
    fn default() -> Self {
        DecimalInput::Text(String::new())
    }
}

impl DecimalInput {
    fn parse(&self) -> Option<f64> {
        let value = match self {
            DecimalInput::Number(n) => *n,
            DecimalInput::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Container creation request as sent by callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerRequest {
    pub container_name: String,
    pub source_dirs: Vec<String>,
    pub container_ports: Vec<String>,
    pub host_ports: Vec<String>,
    pub image_name: String,
    pub max_cpu: DecimalInput,
    pub max_mem: DecimalInput,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("containerName is empty")]
    MissingName,
    #[error("containerPorts count ({container}) does not match hostPorts count ({host})")]
    PortCountMismatch { container: usize, host: usize },
    #[error("imageName is empty")]
    MissingImage,
    #[error("maxCpu is not a number")]
    CpuNotNumeric,
    #[error("maxCpu must be greater than 0")]
    CpuNotPositive,
    #[error("maxMem is not a number")]
    MemNotNumeric,
    #[error("maxMem must be greater than 0")]
    MemNotPositive,
}

/// A request that passed validation; decimals are already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub container_name: String,
    pub source_dirs: Vec<String>,
    pub container_ports: Vec<String>,
    pub host_ports: Vec<String>,
    pub image_name: String,
    pub max_cpu: f64,
    pub max_mem_gb: f64,
}

impl ContainerRequest {
    /// Checks run in a fixed order; the first failure is reported.
    pub fn validate(&self) -> Result<ContainerSpec, ValidationError> {
        if self.container_name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.container_ports.len() != self.host_ports.len() {
            return Err(ValidationError::PortCountMismatch {
                container: self.container_ports.len(),
                host: self.host_ports.len(),
            });
        }
        if self.image_name.is_empty() {
            return Err(ValidationError::MissingImage);
        }

        let max_cpu = self.max_cpu.parse().ok_or(ValidationError::CpuNotNumeric)?;
        if max_cpu <= 0.0 {
            return Err(ValidationError::CpuNotPositive);
        }
        let max_mem_gb = self.max_mem.parse().ok_or(ValidationError::MemNotNumeric)?;
        if max_mem_gb <= 0.0 {
            return Err(ValidationError::MemNotPositive);
        }

        Ok(ContainerSpec {
            container_name: self.container_name.clone(),
            source_dirs: self.source_dirs.clone(),
            container_ports: self.container_ports.clone(),
            host_ports: self.host_ports.clone(),
            image_name: self.image_name.clone(),
            max_cpu,
            max_mem_gb,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid container port {0:?}")]
    ContainerPort(String),
    #[error("invalid host port {0:?}")]
    HostPort(String),
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

fn exposed_key(raw: &str) -> Result<String, TranslateError> {
    parse_port(raw)
        .map(|p| format!("{p}/tcp"))
        .ok_or_else(|| TranslateError::ContainerPort(raw.to_string()))
}

impl ContainerSpec {
    /// Image and exposed ports, without the host part.
    pub fn container_config(&self) -> Result<ContainerCreateBody, TranslateError> {
        let mut exposed = HashMap::new();
        for port in &self.container_ports {
            exposed.insert(exposed_key(port)?, HashMap::new());
        }

        Ok(ContainerCreateBody {
            image: Some(self.image_name.clone()),
            exposed_ports: (!exposed.is_empty()).then_some(exposed),
            ..Default::default()
        })
    }

    /// Port bindings, bind mounts and resource limits.
    pub fn host_config(&self) -> Result<HostConfig, TranslateError> {
        let mut bindings = HashMap::new();
        for (container_port, host_port) in self.container_ports.iter().zip(&self.host_ports) {
            let host_port = host_port.trim();
            // an empty host port lets the engine pick one
            if !host_port.is_empty() && parse_port(host_port).is_none() {
                return Err(TranslateError::HostPort(host_port.to_string()));
            }
            bindings.insert(
                exposed_key(container_port)?,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }

        let mut binds: Vec<String> = self.source_dirs.iter().map(|dir| format!("{dir}:{dir}")).collect();
        binds.push(LOCALTIME_BIND.to_string());

        Ok(HostConfig {
            port_bindings: (!bindings.is_empty()).then_some(bindings),
            binds: Some(binds),
            cpu_period: Some(CPU_PERIOD),
            cpu_quota: Some(self.cpu_quota()),
            memory: Some(self.memory_bytes()),
            ..Default::default()
        })
    }

    pub fn cpu_quota(&self) -> i64 {
        (self.max_cpu * CPU_PERIOD as f64).round() as i64
    }

    pub fn memory_bytes(&self) -> i64 {
        (self.max_mem_gb * GB as f64).round() as i64
    }
}

/// Where a create request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    ConfigInit,
    HostConfigInit,
    CreateCall,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreateStage::ConfigInit => "container config init",
            CreateStage::HostConfigInit => "host config init",
            CreateStage::CreateCall => "create container",
        })
    }
}
