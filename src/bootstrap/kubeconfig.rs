//! Kubeconfig retrieval and endpoint rewrite
//!
//! RKE2 writes its admin kubeconfig bound to the loopback API endpoint. Before
//! it is usable off-host the endpoint is swapped for the first node's public
//! address; nothing else in the file is touched.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tracing::info;

use super::workspace::InstanceWorkspace;
use crate::error::{Error, Result};
use crate::remote::RemoteExecutor;

pub const RKE2_KUBECONFIG_PATH: &str = "/etc/rancher/rke2/rke2.yaml";
pub const API_SERVER_PORT: u16 = 6443;
pub const LOOPBACK_ENDPOINT: &str = "https://127.0.0.1:6443";

/// `https://<ip>:6443`, bracketing IPv6 addresses
pub fn external_endpoint(ip: IpAddr) -> String {
    format!("https://{}", SocketAddr::new(ip, API_SERVER_PORT))
}

/// Replace every occurrence of the loopback endpoint with the external one
pub fn rewrite_kubeconfig(raw: &str, public_ip: IpAddr) -> String {
    raw.replace(LOOPBACK_ENDPOINT, &external_endpoint(public_ip))
}

/// Fetch the kubeconfig from `host`, rewrite it and save it in the workspace
pub async fn fetch_and_save_kubeconfig(
    executor: &dyn RemoteExecutor,
    host: IpAddr,
    workspace: &InstanceWorkspace,
) -> Result<PathBuf> {
    let raw = executor
        .run(host, &format!("sudo cat {RKE2_KUBECONFIG_PATH}"))
        .await
        .map_err(|e| Error::IoError {
            context: format!("failed to retrieve kubeconfig from {host}"),
            source: Box::new(e),
        })?;

    let rewritten = rewrite_kubeconfig(&raw, host);
    let path = workspace.kubeconfig_path();
    workspace.write(&path, &rewritten).await?;

    info!("Kubeconfig saved to {}", path.display());
    Ok(path)
}
