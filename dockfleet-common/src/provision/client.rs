use super::wire::{read_frame, write_frame};
use super::{ProvisionError, ScriptRequest, ScriptResponse};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Kernel side of the provisioning RPC. Holds no connection; every call
/// dials, exchanges one request and drops the stream.
#[derive(Debug, Clone)]
pub struct Provisioner {
    timeout: Duration,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new(DEFAULT_PROVISION_TIMEOUT)
    }
}

impl Provisioner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn provision(
        &self,
        ip: &str,
        rpc_port: u16,
        working_dir: &str,
        commands: &[String],
    ) -> Result<(), ProvisionError> {
        let addr = format!("{ip}:{rpc_port}");
        let request = ScriptRequest {
            working_dir: working_dir.to_string(),
            commands: commands.to_vec(),
        };

        // the stream lives inside the future, so a timeout drops and closes it too
        let response = match tokio::time::timeout(self.timeout, exchange(&addr, &request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(op = "provision", addr = %addr, timeout = ?self.timeout, "agent did not answer");
                return Err(ProvisionError::Timeout { addr, timeout: self.timeout });
            }
        };

        if response.is_success() {
            debug!(op = "provision", addr = %addr, working_dir = %working_dir, "entry point script written");
            Ok(())
        } else {
            Err(ProvisionError::Remote { addr, message: response.error_message })
        }
    }
}

async fn exchange(addr: &str, request: &ScriptRequest) -> Result<ScriptResponse, ProvisionError> {
    let mut stream = TcpStream::connect(addr).await.map_err(|source| ProvisionError::Connect {
        addr: addr.to_string(),
        source,
    })?;

    let wire_err = |source| ProvisionError::Wire { addr: addr.to_string(), source };
    write_frame(&mut stream, request).await.map_err(wire_err)?;
    let response: ScriptResponse = read_frame(&mut stream).await.map_err(wire_err)?;

    let _ = stream.shutdown().await;
    Ok(response)
}
