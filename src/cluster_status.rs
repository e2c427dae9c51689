//! Post-bootstrap cluster health through the Kubernetes API

use std::path::Path;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub total: usize,
    pub ready: usize,
}

impl NodeSummary {
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

/// True when the node's `Ready` condition is `True`
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

pub fn summarize(nodes: &[Node]) -> NodeSummary {
    NodeSummary {
        total: nodes.len(),
        ready: nodes.iter().filter(|n| is_node_ready(n)).count(),
    }
}

/// Build a client from a saved kubeconfig and count its nodes
pub async fn check_instance(kubeconfig_path: &Path) -> Result<NodeSummary> {
    let kubeconfig = Kubeconfig::read_from(kubeconfig_path).map_err(|e| {
        Error::ClusterStatusError(format!(
            "failed to read {}: {e}",
            kubeconfig_path.display()
        ))
    })?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::ClusterStatusError(format!("invalid kubeconfig: {e}")))?;
    let client = Client::try_from(config)
        .map_err(|e| Error::ClusterStatusError(format!("failed to build client: {e}")))?;

    let nodes: Api<Node> = Api::all(client);
    let list = nodes
        .list(&ListParams::default())
        .await
        .map_err(|e| Error::ClusterStatusError(format!("failed to list nodes: {e}")))?;
    debug!("Listed {} node(s)", list.items.len());

    Ok(summarize(&list.items))
}
