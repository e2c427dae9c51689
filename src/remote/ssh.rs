//! SSH transport for [`RemoteExecutor`](super::RemoteExecutor)
//!
//! One connection and one session per command. Host keys are accepted without
//! verification; the nodes are freshly provisioned and have no known key.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use tracing::{debug, warn};

use super::{trim_output, RemoteExecutor};
use crate::error::{Error, Result};

pub const SSH_PORT: u16 = 22;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Public-key authenticated SSH executor
pub struct SshExecutor {
    user: String,
    key: Arc<KeyPair>,
    port: u16,
    config: Arc<client::Config>,
}

impl SshExecutor {
    /// Build an executor from a PEM/OpenSSH encoded private key
    pub fn new(user: impl Into<String>, private_key_pem: &str) -> Result<Self> {
        let key = russh_keys::decode_secret_key(private_key_pem, None)
            .map_err(|e| Error::CredentialError(e.to_string()))?;

        Ok(Self {
            user: user.into(),
            key: Arc::new(key),
            port: SSH_PORT,
            config: Arc::new(client::Config::default()),
        })
    }

    async fn connect(&self, host: IpAddr) -> Result<Handle<AcceptAnyHostKey>> {
        let addr = SocketAddr::new(host, self.port);
        let connection_error = |message: String| Error::ConnectionError { host, message };

        let mut session = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client::connect(self.config.clone(), addr, AcceptAnyHostKey),
        )
        .await
        .map_err(|_| connection_error(format!("connect timed out after {CONNECT_TIMEOUT:?}")))?
        .map_err(|e| connection_error(format!("failed to establish ssh connection: {e}")))?;

        let authenticated = session
            .authenticate_publickey(&self.user, self.key.clone())
            .await
            .map_err(|e| connection_error(format!("authentication failed: {e}")))?;
        if !authenticated {
            return Err(connection_error(format!(
                "public key rejected for user {}",
                self.user
            )));
        }

        Ok(session)
    }

    async fn exec(
        session: &Handle<AcceptAnyHostKey>,
        host: IpAddr,
        command: &str,
    ) -> Result<String> {
        let execution_error = |message: String| Error::ExecutionError { host, message };

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| execution_error(format!("failed to create new ssh session: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| execution_error(format!("failed to run ssh command: {e}")))?;

        let mut stdout = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        if let Err(e) = channel.close().await {
            debug!("Failed to close ssh channel on {}: {}", host, e);
        }

        match exit_status {
            Some(0) => {}
            Some(code) => {
                return Err(execution_error(format!(
                    "failed to run ssh command: exited with status {code}"
                )))
            }
            None => {
                return Err(execution_error(
                    "failed to run ssh command: session closed without exit status".to_string(),
                ))
            }
        }

        let output = String::from_utf8_lossy(&stdout);
        Ok(trim_output(&output).to_string())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: IpAddr, command: &str) -> Result<String> {
        let session = self.connect(host).await?;

        let result = Self::exec(&session, host, command).await;

        // Always tear the connection down; a close failure never masks the command result
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!("Failed to close ssh connection to {}: {}", host, e);
        }

        result
    }
}
