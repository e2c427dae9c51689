//! HA cluster bootstrap
//!
//! Drives freshly provisioned triads of VMs through the RKE2 join protocol:
//! the first node initializes and mints a join token, the other two join with
//! it, the kubeconfig is pulled back and rewritten, and Rancher is installed.
//! The fleet coordinator runs one such sequence per instance concurrently.

pub mod failure;
pub mod fleet;
pub mod install_script;
pub mod instance;
pub mod kubeconfig;
pub mod node;
pub mod node_config;
pub mod token;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;

use crate::remote::{ReadinessPoller, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};

pub use failure::FirstFailure;
pub use fleet::{FleetCoordinator, FleetReport};
pub use install_script::{InstallRunner, ShellInstallRunner};
pub use instance::{ClusterBootstrapper, InstanceReport, InstanceSettings};
pub use node::NodeBootstrapper;
pub use node_config::NodeConfiguration;
pub use token::JoinToken;
pub use workspace::InstanceWorkspace;

/// Fixed wait for control-plane convergence after all nodes report active
pub const DEFAULT_CONVERGENCE_DELAY: Duration = Duration::from_secs(30);

/// The remote steps of a single node bring-up, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeStep {
    CreateConfigDir,
    WriteConfig,
    InstallSoftware,
    EnableService,
    StartService,
    AwaitReady,
}

impl NodeStep {
    /// Steps that each map to one remote command before polling starts
    pub const BRING_UP: [NodeStep; 5] = [
        NodeStep::CreateConfigDir,
        NodeStep::WriteConfig,
        NodeStep::InstallSoftware,
        NodeStep::EnableService,
        NodeStep::StartService,
    ];
}

impl fmt::Display for NodeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            NodeStep::CreateConfigDir => "create config directory",
            NodeStep::WriteConfig => "create config file",
            NodeStep::InstallSoftware => "install RKE2",
            NodeStep::EnableService => "enable RKE2 server",
            NodeStep::StartService => "start RKE2 server",
            NodeStep::AwaitReady => "wait for RKE2 to initialize",
        };
        f.write_str(action)
    }
}

/// Delays and retry budgets used by the bootstrap
#[derive(Clone, Copy, Debug)]
pub struct BootstrapTiming {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub convergence_delay: Duration,
}

impl Default for BootstrapTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_ATTEMPTS,
            convergence_delay: DEFAULT_CONVERGENCE_DELAY,
        }
    }
}

impl BootstrapTiming {
    /// No delays; used by tests
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            max_poll_attempts: DEFAULT_MAX_ATTEMPTS,
            convergence_delay: Duration::ZERO,
        }
    }

    pub fn poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(self.poll_interval, self.max_poll_attempts)
    }
}
