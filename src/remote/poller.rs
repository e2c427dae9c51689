//! Bounded readiness polling over a [`RemoteExecutor`]
//!
//! Node bring-up has no push signal, so readiness is observed by running a
//! check command that prints a marker token. The check is retried at a fixed
//! interval until the trimmed output equals the expected token or the attempt
//! budget runs out.

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info};

use super::RemoteExecutor;
use crate::error::{Error, Result};

/// Delay between check attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Check attempts before giving up (30 x 10s = 5 minutes)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// A check command and the exact output that means "ready"
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub description: &'static str,
    pub command: String,
    pub expected: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct ReadinessPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReadinessPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll `host` until `check` reports ready
    ///
    /// Connection and execution errors count as "not ready yet". A credential
    /// error cannot heal between attempts and is returned immediately.
    pub async fn wait_until_ready(
        &self,
        executor: &dyn RemoteExecutor,
        host: IpAddr,
        check: &ReadinessCheck,
    ) -> Result<()> {
        info!(
            "Waiting for {} on {} (this may take several minutes)...",
            check.description, host
        );

        for attempt in 1..=self.max_attempts {
            match executor.run(host, &check.command).await {
                Ok(output) if output.trim() == check.expected => {
                    info!("{} confirmed on {} after {} attempt(s)", check.description, host, attempt);
                    return Ok(());
                }
                Ok(output) => {
                    debug!(
                        "{} not ready on {} ({}), attempt {}/{}",
                        check.description,
                        host,
                        output.trim(),
                        attempt,
                        self.max_attempts
                    );
                }
                Err(e @ Error::CredentialError(_)) => return Err(e),
                Err(e) => {
                    debug!(
                        "Check for {} on {} failed: {}, attempt {}/{}",
                        check.description, host, e, attempt, self.max_attempts
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(Error::TimeoutError {
            host,
            what: check.description.to_string(),
            attempts: self.max_attempts,
        })
    }
}
