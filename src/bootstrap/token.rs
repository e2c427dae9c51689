//! Join token retrieval from the first node

use std::fmt;
use std::net::IpAddr;

use tracing::info;

use crate::error::{Error, Result};
use crate::remote::RemoteExecutor;

/// Location of the token RKE2 writes once the first server has initialized
pub const NODE_TOKEN_PATH: &str = "/var/lib/rancher/rke2/server/node-token";

/// Opaque credential letting peers join one instance's cluster
///
/// Held in memory for the duration of the instance bootstrap only.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinToken(String);

impl JoinToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JoinToken(<redacted>)")
    }
}

/// Read the join token from the first node
///
/// Not retried: the preceding readiness poll already saw the file, so a
/// failure here is a new condition and is surfaced immediately.
pub async fn retrieve_join_token(executor: &dyn RemoteExecutor, host: IpAddr) -> Result<JoinToken> {
    let output = executor
        .run(host, &format!("sudo cat {NODE_TOKEN_PATH}"))
        .await
        .map_err(|e| Error::TokenUnavailable {
            host,
            source: Box::new(e),
        })?;

    let token = output.trim();
    if token.is_empty() {
        return Err(Error::TokenUnavailable {
            host,
            source: Box::new(Error::ExecutionError {
                host,
                message: format!("{NODE_TOKEN_PATH} is empty"),
            }),
        });
    }

    info!("Retrieved join token from {}", host);
    Ok(JoinToken::new(token))
}
