//! Subprocess gRPC plugin transport
//!
//! The host launches the plugin binary as a child process with the shared
//! magic cookie in its environment. The child announces itself with a single
//! handshake line on stdout:
//!
//! ```text
//! CORE-VERSION|PROTOCOL-VERSION|NETWORK|ADDRESS|PROTOCOL
//! ```
//!
//! e.g. `1|1|tcp|127.0.0.1:43231|grpc`. The host validates the protocol
//! version and connects a gRPC channel to the advertised address. One `Value`
//! RPC is made per normalized token; the host owns the child's lifetime and
//! kills it on shutdown.

use crate::errors::{ConfigManagerError, Result};
use crate::plugin::proto::token_store_client::TokenStoreClient;
use crate::plugin::proto::TokenValueRequest;
use crate::plugin::TokenStore;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Magic cookie shared between host and plugin
pub const HANDSHAKE_COOKIE_KEY: &str = "CONFIGMANAGER_PLUGIN";
pub const HANDSHAKE_COOKIE_VALUE: &str = "hello";

/// Protocol version the host speaks
pub const PROTOCOL_VERSION: u32 = 1;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A per-prefix plugin running as a gRPC subprocess
pub struct GrpcPlugin {
    client: TokenStoreClient<Channel>,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for GrpcPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcPlugin").finish_non_exhaustive()
    }
}

impl GrpcPlugin {
    /// Launch the plugin binary at `path`, handshake, and connect
    pub async fn spawn(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .env(HANDSHAKE_COOKIE_KEY, HANDSHAKE_COOKIE_VALUE)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConfigManagerError::plugin_transport_with_source(
                    format!("failed to spawn plugin {}", path.display()),
                    Box::new(e),
                )
            })?;

        let endpoint = match Self::handshake(&mut child).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                let _ = child.start_kill();
                return Err(err);
            }
        };

        debug!(plugin = %path.display(), endpoint = %endpoint, "plugin handshake complete");

        let channel = match Self::connect(&endpoint).await {
            Ok(channel) => channel,
            Err(err) => {
                let _ = child.start_kill();
                return Err(err);
            }
        };

        Ok(Self { client: TokenStoreClient::new(channel), child: Mutex::new(Some(child)) })
    }

    /// Read and validate the handshake line, returning the endpoint URI
    async fn handshake(child: &mut Child) -> Result<String> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConfigManagerError::plugin_transport("plugin stdout not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let line = timeout(HANDSHAKE_TIMEOUT, lines.next_line())
            .await
            .map_err(|_| {
                ConfigManagerError::plugin_transport("timed out waiting for plugin handshake")
            })?
            .map_err(|e| {
                ConfigManagerError::plugin_transport_with_source(
                    "failed reading plugin handshake",
                    Box::new(e),
                )
            })?
            .ok_or_else(|| {
                ConfigManagerError::plugin_transport("plugin exited before handshake")
            })?;

        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() < 5 {
            return Err(ConfigManagerError::plugin_transport(format!(
                "malformed plugin handshake line: {:?}",
                line
            )));
        }

        if parts[1] != PROTOCOL_VERSION.to_string() {
            return Err(ConfigManagerError::plugin_transport(format!(
                "unsupported plugin protocol version: {}",
                parts[1]
            )));
        }
        if parts[4] != "grpc" {
            return Err(ConfigManagerError::plugin_transport(format!(
                "unsupported plugin protocol: {}",
                parts[4]
            )));
        }
        match parts[2] {
            "tcp" => Ok(format!("http://{}", parts[3])),
            network => Err(ConfigManagerError::plugin_transport(format!(
                "unsupported plugin network: {}",
                network
            ))),
        }
    }

    async fn connect(endpoint: &str) -> Result<Channel> {
        Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| {
                ConfigManagerError::plugin_transport_with_source(
                    format!("invalid plugin endpoint {}", endpoint),
                    Box::new(e),
                )
            })?
            .connect()
            .await
            .map_err(|e| {
                ConfigManagerError::plugin_transport_with_source(
                    format!("failed to connect to plugin at {}", endpoint),
                    Box::new(e),
                )
            })
    }

    fn take_child(&self) -> Option<Child> {
        match self.child.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl TokenStore for GrpcPlugin {
    async fn value(
        &self,
        store_key: &str,
        metadata: &[u8],
        cancel: &CancellationToken,
    ) -> Result<String> {
        // tonic clients are cheap to clone and safe for concurrent RPC
        let mut client = self.client.clone();
        let request =
            TokenValueRequest { token: store_key.to_string(), metadata: metadata.to_vec() };

        tokio::select! {
            _ = cancel.cancelled() => Err(ConfigManagerError::Cancelled),
            response = client.value(request) => match response {
                Ok(response) => Ok(response.into_inner().value),
                Err(status) => Err(ConfigManagerError::retrieve_failed(format!(
                    "plugin Value call failed: {}",
                    status
                ))),
            },
        }
    }

    async fn close(&self) {
        if let Some(mut child) = self.take_child() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

impl Drop for GrpcPlugin {
    fn drop(&mut self) {
        // kill_on_drop on the Command covers the child if close() never ran
        if let Some(mut child) = self.take_child() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let err = GrpcPlugin::spawn(Path::new("/nonexistent/plugin-binary")).await.unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginTransport { .. }));
    }

    #[tokio::test]
    async fn test_handshake_rejects_bad_lines() {
        // a shell that prints garbage instead of a handshake
        let script = "#!/bin/sh\necho not-a-handshake\nsleep 1\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad-plugin");
        std::fs::write(&path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let err = GrpcPlugin::spawn(&path).await.unwrap_err();
        assert!(matches!(err, ConfigManagerError::PluginTransport { .. }));
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_protocol_version() {
        let script = "#!/bin/sh\necho '1|9|tcp|127.0.0.1:1|grpc'\nsleep 1\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versioned-plugin");
        std::fs::write(&path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let err = GrpcPlugin::spawn(&path).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("protocol version"), "unexpected error: {}", message);
    }
}
