//! Single-node RKE2 bring-up
//!
//! Linear sequence, one remote command per step, then a readiness poll:
//! config dir -> config file -> install -> enable -> start -> poll.
//! Any failure stops the node and names the step; nothing is rolled back
//! since the nodes are fresh and the steps are not safe to replay blindly.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::node_config::{NodeConfiguration, RKE2_CONFIG_DIR};
use super::NodeStep;
use crate::error::{Error, Result};
use crate::remote::{ReadinessPoller, RemoteExecutor};

pub const RKE2_INSTALL_URL: &str = "https://get.rke2.io";

#[derive(Clone)]
pub struct NodeBootstrapper {
    executor: Arc<dyn RemoteExecutor>,
    poller: ReadinessPoller,
    rke2_version: Arc<str>,
}

impl NodeBootstrapper {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        poller: ReadinessPoller,
        rke2_version: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            executor,
            poller,
            rke2_version: rke2_version.into(),
        }
    }

    /// Remote command for one bring-up step
    pub fn command_for(&self, step: NodeStep, config: &NodeConfiguration) -> String {
        match step {
            NodeStep::CreateConfigDir => format!("sudo mkdir -p {RKE2_CONFIG_DIR}"),
            NodeStep::WriteConfig => config.write_command(),
            NodeStep::InstallSoftware => format!(
                "sudo sh -c 'curl -sfL {RKE2_INSTALL_URL} | INSTALL_RKE2_VERSION={} INSTALL_RKE2_TYPE=server sh -'",
                self.rke2_version
            ),
            NodeStep::EnableService => "sudo systemctl enable rke2-server.service".to_string(),
            NodeStep::StartService => "sudo systemctl start rke2-server.service &".to_string(),
            NodeStep::AwaitReady => config.readiness_check().command,
        }
    }

    /// Bring up RKE2 on `host` and wait until the variant's readiness marker holds
    #[instrument(skip(self, config), fields(first_node = config.is_first_node()))]
    pub async fn bootstrap(&self, host: IpAddr, config: &NodeConfiguration) -> Result<()> {
        for step in NodeStep::BRING_UP {
            let command = self.command_for(step, config);
            debug!("Running step '{}' on {}", step, host);
            self.executor
                .run(host, &command)
                .await
                .map_err(|e| step_failed(host, step, e))?;
        }

        let check = config.readiness_check();
        self.poller
            .wait_until_ready(self.executor.as_ref(), host, &check)
            .await
            .map_err(|e| step_failed(host, NodeStep::AwaitReady, e))?;

        info!("RKE2 initialized successfully on {}", host);
        Ok(())
    }
}

fn step_failed(host: IpAddr, step: NodeStep, source: Error) -> Error {
    Error::NodeStepFailed {
        host,
        step,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::FakeExecutor;
    use crate::bootstrap::JoinToken;
    use crate::topology::{InstanceTopology, NodeAddress};
    use std::time::Duration;

    fn topology() -> InstanceTopology {
        let node = |n: u8| NodeAddress {
            public: IpAddr::from([52, 0, 0, n]),
            private: IpAddr::from([172, 31, 0, n]),
        };
        InstanceTopology {
            instance: 1,
            nodes: [node(1), node(2), node(3)],
            load_balancer_dns: "lb".to_string(),
            rancher_url: "ha1.example.com".to_string(),
        }
    }

    fn bootstrapper(exec: Arc<FakeExecutor>, attempts: u32) -> NodeBootstrapper {
        NodeBootstrapper::new(
            exec,
            ReadinessPoller::new(Duration::ZERO, attempts),
            "v1.30.4+rke2r1",
        )
    }

    #[tokio::test]
    async fn test_first_node_runs_steps_in_order() {
        let exec = Arc::new(FakeExecutor::new(|_, cmd| {
            Ok(if cmd.contains("node-token") { "ready" } else { "" }.to_string())
        }));
        let host = topology().first_node().public;
        let config = NodeConfiguration::first_node(&topology());

        bootstrapper(exec.clone(), 3)
            .bootstrap(host, &config)
            .await
            .unwrap();

        let commands = exec.commands_for(host);
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[0], "sudo mkdir -p /etc/rancher/rke2");
        assert!(commands[1].contains("cat > /etc/rancher/rke2/config.yaml"));
        assert!(commands[2].contains("INSTALL_RKE2_VERSION=v1.30.4+rke2r1 INSTALL_RKE2_TYPE=server"));
        assert_eq!(commands[3], "sudo systemctl enable rke2-server.service");
        assert_eq!(commands[4], "sudo systemctl start rke2-server.service &");
        assert!(commands[5].contains("test -f /var/lib/rancher/rke2/server/node-token"));
    }

    #[tokio::test]
    async fn test_joining_node_polls_service_state() {
        let exec = Arc::new(FakeExecutor::new(|_, cmd| {
            Ok(if cmd.contains("is-active") { "active" } else { "" }.to_string())
        }));
        let host = topology().nodes[1].public;
        let config = NodeConfiguration::joining_node(&topology(), &JoinToken::new("K10tok"));

        bootstrapper(exec.clone(), 3)
            .bootstrap(host, &config)
            .await
            .unwrap();

        let commands = exec.commands_for(host);
        assert!(commands[1].contains("server: https://172.31.0.1:9345"));
        assert!(commands[1].contains("token: K10tok"));
        assert!(commands[5].contains("systemctl is-active"));
    }

    #[tokio::test]
    async fn test_failure_short_circuits_and_names_step() {
        let exec = Arc::new(FakeExecutor::new(|host, cmd| {
            if cmd.contains("get.rke2.io") {
                Err(Error::ExecutionError {
                    host,
                    message: "exit status 22".to_string(),
                })
            } else {
                Ok(String::new())
            }
        }));
        let host = topology().first_node().public;
        let config = NodeConfiguration::first_node(&topology());

        let err = bootstrapper(exec.clone(), 3)
            .bootstrap(host, &config)
            .await
            .unwrap_err();

        match &err {
            Error::NodeStepFailed { host: h, step, .. } => {
                assert_eq!(*h, host);
                assert_eq!(*step, NodeStep::InstallSoftware);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Failed to install RKE2 on 52.0.0.1");
        // enable/start/poll never ran
        assert_eq!(exec.call_count(), 3);
    }

    #[tokio::test]
    async fn test_poll_timeout_is_await_ready_failure() {
        let exec = Arc::new(FakeExecutor::new(|_, cmd| {
            Ok(if cmd.contains("node-token") { "not-ready" } else { "" }.to_string())
        }));
        let host = topology().first_node().public;
        let config = NodeConfiguration::first_node(&topology());

        let err = bootstrapper(exec.clone(), 4)
            .bootstrap(host, &config)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NodeStepFailed {
                step: NodeStep::AwaitReady,
                ..
            }
        ));
        assert_eq!(exec.call_count(), 5 + 4);
    }
}
