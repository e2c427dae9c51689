//! Teardown of provisioned infrastructure and local artifacts
//!
//! Infrastructure is destroyed first. Local state is only removed once the
//! destroy succeeded, so a failed destroy can be retried against the same
//! state files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::bootstrap::InstanceWorkspace;
use crate::error::Result;
use crate::provision::{Provisioner, TFVARS_FILE};

/// Files terraform leaves in the module directory, in removal order
pub const TERRAFORM_ARTIFACTS: [&str; 4] = [
    ".terraform.lock.hcl",
    "terraform.tfstate",
    "terraform.tfstate.backup",
    TFVARS_FILE,
];

pub const TERRAFORM_PLUGIN_DIR: &str = ".terraform";

/// What teardown actually removed
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub removed: Vec<PathBuf>,
    /// Removals that failed for a reason other than the path being absent
    pub warnings: Vec<String>,
}

impl TeardownReport {
    async fn remove_file(&mut self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => self.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => self.warn(path, e),
        }
    }

    async fn remove_dir(&mut self, path: &Path) {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => self.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => self.warn(path, e),
        }
    }

    fn warn(&mut self, path: &Path, e: std::io::Error) {
        let message = format!("Failed to remove {}: {}", path.display(), e);
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Remove one instance's generated files and then its directory
pub async fn cleanup_instance(workspace: &InstanceWorkspace, report: &mut TeardownReport) {
    for file in workspace.generated_files() {
        report.remove_file(&file).await;
    }
    report.remove_dir(workspace.dir()).await;
}

/// Remove terraform state, lock and variable files plus the plugin cache
pub async fn cleanup_terraform_files(module_dir: &Path, report: &mut TeardownReport) {
    for name in TERRAFORM_ARTIFACTS {
        report.remove_file(&module_dir.join(name)).await;
    }
    report.remove_dir(&module_dir.join(TERRAFORM_PLUGIN_DIR)).await;
}

/// Destroy the infrastructure, then clean up every local artifact
pub async fn teardown(
    provisioner: &dyn Provisioner,
    workspace_root: &Path,
    module_dir: &Path,
    total_has: usize,
) -> Result<TeardownReport> {
    provisioner.destroy().await?;
    info!("Infrastructure destroyed");

    let mut report = TeardownReport::default();
    for instance in 1..=total_has {
        cleanup_instance(&InstanceWorkspace::new(workspace_root, instance), &mut report).await;
    }
    cleanup_terraform_files(module_dir, &mut report).await;

    info!(
        "Teardown complete: removed {} path(s), {} warning(s)",
        report.removed.len(),
        report.warnings.len()
    );
    Ok(report)
}
