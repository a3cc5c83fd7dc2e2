//! Entry-point script provisioning RPC
//!
//! The kernel asks a host's agent to write `start.sh` into a container's
//! working directory before the container is created. One request, one
//! response, over a transient TCP connection; see `wire` for framing.
//!
//! The agent answers with an error-message string rather than a structured
//! error. Only an exactly empty string means success.

mod client;
pub mod wire;

pub use client::Provisioner;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RPC_PORT: u16 = 19876;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub working_dir: String,
    /// One shell line each, in order
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    #[serde(default)]
    pub error_message: String,
}

impl ScriptResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { error_message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("cannot connect to agent {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rpc exchange with {addr} failed: {source}")]
    Wire {
        addr: String,
        #[source]
        source: wire::WireError,
    },
    #[error("agent {addr} did not answer within {timeout:?}")]
    Timeout { addr: String, timeout: std::time::Duration },
    #[error("agent {addr} could not write entry point script: {message}")]
    Remote { addr: String, message: String },
}
