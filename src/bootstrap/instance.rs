//! End-to-end bootstrap of one HA instance
//!
//! Ordering within an instance is strict: first node, then token, then both
//! joining nodes. The joining nodes run in parallel and each runs to
//! completion even when its sibling fails.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::failure::FirstFailure;
use super::install_script::{inject_hostname, write_install_script, InstallRunner};
use super::kubeconfig::fetch_and_save_kubeconfig;
use super::node::NodeBootstrapper;
use super::node_config::NodeConfiguration;
use super::token::retrieve_join_token;
use super::workspace::InstanceWorkspace;
use super::BootstrapTiming;
use crate::error::{Error, Result};
use crate::remote::RemoteExecutor;
use crate::topology::resolve_outputs;

/// Settings shared by every instance of a run
#[derive(Clone, Debug)]
pub struct InstanceSettings {
    /// Directory under which `high-availability-<n>/` workspaces live
    pub workspace_root: PathBuf,
    /// RKE2 release to install on every node
    pub rke2_version: String,
    pub timing: BootstrapTiming,
}

/// Outcome of a successfully bootstrapped instance
#[derive(Clone, Debug, Serialize)]
pub struct InstanceReport {
    pub instance: usize,
    pub first_node: IpAddr,
    pub load_balancer_dns: String,
    pub rancher_url: String,
    /// `None` when the kubeconfig could not be fetched
    pub kubeconfig: Option<PathBuf>,
}

pub struct ClusterBootstrapper {
    executor: Arc<dyn RemoteExecutor>,
    installer: Arc<dyn InstallRunner>,
    settings: InstanceSettings,
}

impl ClusterBootstrapper {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        installer: Arc<dyn InstallRunner>,
        settings: InstanceSettings,
    ) -> Self {
        Self {
            executor,
            installer,
            settings,
        }
    }

    pub fn workspace(&self, instance: usize) -> InstanceWorkspace {
        InstanceWorkspace::new(&self.settings.workspace_root, instance)
    }

    fn node_bootstrapper(&self) -> NodeBootstrapper {
        NodeBootstrapper::new(
            Arc::clone(&self.executor),
            self.settings.timing.poller(),
            self.settings.rke2_version.as_str(),
        )
    }

    /// Bootstrap instance `instance` (1-based) from the flat provisioning outputs
    #[instrument(skip(self, outputs, helm_command))]
    pub async fn bootstrap(
        &self,
        instance: usize,
        outputs: &HashMap<String, String>,
        helm_command: &str,
    ) -> Result<InstanceReport> {
        // 1. Topology; any malformed address stops the instance before remote work
        let topology = resolve_outputs(outputs, instance).validate(instance)?;
        let first = *topology.first_node();

        // 2-3. Workspace and install script
        let workspace = self.workspace(instance);
        workspace.ensure().await?;
        let helm_command = inject_hostname(helm_command, &topology.rancher_url);
        let script = write_install_script(&workspace, &helm_command).await?;

        // 4. First node initializes the cluster
        info!("Setting up first server node with IP {}", first.public);
        let nodes = self.node_bootstrapper();
        nodes
            .bootstrap(first.public, &NodeConfiguration::first_node(&topology))
            .await?;

        // 5. Token, read separately so a read failure is distinguishable from init failure
        let token = retrieve_join_token(self.executor.as_ref(), first.public).await?;

        // 6. Joining nodes in parallel; every node runs to completion
        let joining = NodeConfiguration::joining_node(&topology, &token);
        let handles: Vec<_> = topology
            .joining_nodes()
            .map(|(node_num, addr)| {
                let nodes = nodes.clone();
                let config = joining.clone();
                let host = addr.public;
                info!("Setting up server node {} with IP {}", node_num, host);
                tokio::spawn(async move { (node_num, nodes.bootstrap(host, &config).await) })
            })
            .collect();

        let failure = FirstFailure::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((node_num, Err(e))) => {
                    warn!("Server node {} failed: {}", node_num, e.chain());
                    failure.record(e);
                }
                Err(e) => {
                    failure.record(Error::WorkerFailed(format!("joining node task: {e}")));
                }
            }
        }
        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        // 7. Convergence
        info!("Waiting for cluster to fully initialize...");
        tokio::time::sleep(self.settings.timing.convergence_delay).await;

        // 8. Kubeconfig; failure degrades to a warning
        let kubeconfig =
            match fetch_and_save_kubeconfig(self.executor.as_ref(), first.public, &workspace).await
            {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to save kubeconfig: {}", e.chain());
                    None
                }
            };

        // 9. Rancher install
        self.installer
            .run(&script, workspace.dir(), &workspace.kubeconfig_path())
            .await?;

        info!("HA {} setup complete", instance);
        info!("HA {} LB: {}", instance, topology.load_balancer_dns);
        info!("HA {} Rancher URL: {}", instance, topology.rancher_url);

        Ok(InstanceReport {
            instance,
            first_node: first.public,
            load_balancer_dns: topology.load_balancer_dns.clone(),
            rancher_url: topology.rancher_url.clone(),
            kubeconfig,
        })
    }
}
