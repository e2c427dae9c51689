//! Remote command execution and readiness polling
//!
//! Every remote action in the bootstrap is a single command run on a single
//! host. [`RemoteExecutor`] is the seam for that; [`SshExecutor`] is the real
//! transport and tests substitute scripted executors.

pub mod poller;
pub mod ssh;

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::Result;

pub use poller::{ReadinessPoller, ReadinessCheck, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
pub use ssh::SshExecutor;

/// Runs exactly one command on one host and returns its trimmed stdout
///
/// Implementations must not retry; retrying belongs to the poller.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, host: IpAddr, command: &str) -> Result<String>;
}

/// Strip trailing CR/LF characters from captured command output
pub fn trim_output(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_output_only_strips_line_endings() {
        assert_eq!(trim_output("ready\r\n\n"), "ready");
        assert_eq!(trim_output("  token  \n"), "  token  ");
        assert_eq!(trim_output(""), "");
    }
}
