//! Provisioning RPC server
//!
//! One task per inbound connection. Each connection carries a single
//! `ScriptRequest` frame and gets a single `ScriptResponse` frame back; an
//! empty `errorMessage` means the script was written. A peer that does not
//! deliver its request within the read timeout is dropped.

use crate::script;
use anyhow::{Context, Result};
use dockfleet_common::provision::wire::{read_frame, write_frame, WireError};
use dockfleet_common::provision::{ScriptRequest, ScriptResponse};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))
}

/// Accept loop; returns only if the listener itself fails.
pub async fn serve(listener: TcpListener, read_timeout: Duration) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!(addr = %local, "provisioning rpc listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, read_timeout).await {
                warn!(peer = %peer, error = %e, "provisioning connection dropped");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, read_timeout: Duration) -> Result<(), WireError> {
    let request: ScriptRequest = match tokio::time::timeout(read_timeout, read_frame(&mut stream)).await {
        Ok(request) => request?,
        Err(_) => {
            let msg = format!("no request within {read_timeout:?}");
            return Err(WireError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, msg)));
        }
    };
    debug!(working_dir = %request.working_dir, commands = request.commands.len(), "script request");

    let response = handle_request(&request).await;
    write_frame(&mut stream, &response).await
}

pub async fn handle_request(request: &ScriptRequest) -> ScriptResponse {
    match script::write_entry_point(Path::new(&request.working_dir), &request.commands).await {
        Ok(_) => ScriptResponse::ok(),
        Err(e) => {
            error!(op = "script.write", working_dir = %request.working_dir, error = %e, "entry point not written");
            ScriptResponse::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockfleet_common::provision::{ProvisionError, Provisioner};
    use std::time::Duration;

    async fn start_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, Duration::from_millis(200)));
        port
    }

    #[tokio::test]
    async fn provisioned_script_lands_on_disk() {
        let port = start_server().await;
        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().to_string_lossy().into_owned();

        Provisioner::new(Duration::from_secs(5))
            .provision("127.0.0.1", port, &working_dir, &["cd /srv".to_string(), "./app".to_string()])
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("start.sh")).unwrap();
        assert_eq!(content, "#!/bin/bash\ncd /srv\n./app");
    }

    #[tokio::test]
    async fn write_failure_comes_back_as_remote_error() {
        let port = start_server().await;
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").to_string_lossy().into_owned();

        let err = Provisioner::new(Duration::from_secs(5))
            .provision("127.0.0.1", port, &missing, &["true".to_string()])
            .await
            .unwrap_err();
        match err {
            ProvisionError::Remote { message, .. } => assert!(message.contains("start.sh")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_keeps_accepting_after_garbage() {
        use tokio::io::AsyncWriteExt;

        let port = start_server().await;
        let mut junk = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        junk.write_all(&[0, 0, 0, 3, b'x', b'y', b'z']).await.unwrap();
        drop(junk);

        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().to_string_lossy().into_owned();
        Provisioner::new(Duration::from_secs(5))
            .provision("127.0.0.1", port, &working_dir, &[])
            .await
            .unwrap();
        assert!(dir.path().join("start.sh").exists());
    }

    #[tokio::test]
    async fn silent_peer_is_disconnected() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let port = start_server().await;
        let mut idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut half = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        // length prefix only, body never follows
        half.write_all(&[0, 0, 0, 40]).await.unwrap();

        for stream in [&mut idle, &mut half] {
            let mut buf = [0u8; 8];
            let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .expect("server kept the connection open");
            assert_eq!(read.unwrap_or(0), 0);
        }
    }

    #[tokio::test]
    async fn handle_request_reports_empty_message_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let req = ScriptRequest {
            working_dir: dir.path().to_string_lossy().into_owned(),
            commands: vec!["echo ok".into()],
        };
        assert!(handle_request(&req).await.is_success());
    }
}
