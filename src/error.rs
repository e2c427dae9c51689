//! Error types for the HA bootstrap tooling

use std::net::IpAddr;

use thiserror::Error;

use crate::bootstrap::NodeStep;

/// Boxed cause used by variants that wrap heterogeneous failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// Precondition violated before any remote work (bad address, command count mismatch)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Private key material could not be decoded
    #[error("Invalid SSH private key: {0}")]
    CredentialError(String),

    /// Host unreachable, port closed or authentication rejected
    #[error("Failed to connect to {host}: {message}")]
    ConnectionError { host: IpAddr, message: String },

    /// Session failure or non-zero remote exit status
    #[error("Command failed on {host}: {message}")]
    ExecutionError { host: IpAddr, message: String },

    /// Readiness polling budget exhausted
    #[error("Timed out waiting for {what} on {host} after {attempts} attempts")]
    TimeoutError {
        host: IpAddr,
        what: String,
        attempts: u32,
    },

    /// Local file/workspace failure, or a remote fetch feeding a local write
    #[error("IO error: {context}")]
    IoError {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The join token could not be read back from the first node
    #[error("Join token unavailable from {host}")]
    TokenUnavailable {
        host: IpAddr,
        #[source]
        source: Box<Error>,
    },

    /// The generated install script could not be run or exited non-zero
    #[error("Failed to execute install script {script}: {message}")]
    ScriptFailed { script: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Terraform invocation failed
    #[error("Provisioning error: {0}")]
    ProvisionError(String),

    #[error("Cluster status check failed: {0}")]
    ClusterStatusError(String),

    /// A spawned worker panicked or was aborted
    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    /// A node bootstrap step failed
    #[error("Failed to {step} on {host}")]
    NodeStepFailed {
        host: IpAddr,
        step: NodeStep,
        #[source]
        source: Box<Error>,
    },

    /// One HA instance failed; the cause names the node and step
    #[error("HA instance {instance} setup failed")]
    InstanceFailed {
        instance: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a local IO failure with a description of what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::IoError {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Render the error and all of its causes as a single `: `-joined line
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
