//! Per-instance local workspace directory
//!
//! `high-availability-<n>/` holds the generated install script and the
//! rewritten kubeconfig. Exactly one orchestrator owns each directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

pub const WORKSPACE_PREFIX: &str = "high-availability";
pub const INSTALL_SCRIPT_NAME: &str = "install.sh";
pub const KUBECONFIG_NAME: &str = "kube_config.yaml";
pub const LB_KUBECONFIG_NAME: &str = "kube_config_lb.yaml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceWorkspace {
    dir: PathBuf,
}

impl InstanceWorkspace {
    pub fn new(root: &Path, instance: usize) -> Self {
        Self {
            dir: root.join(format!("{WORKSPACE_PREFIX}-{instance}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn install_script_path(&self) -> PathBuf {
        self.dir.join(INSTALL_SCRIPT_NAME)
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        self.dir.join(KUBECONFIG_NAME)
    }

    pub fn lb_kubeconfig_path(&self) -> PathBuf {
        self.dir.join(LB_KUBECONFIG_NAME)
    }

    /// Generated files removed on teardown, in removal order
    pub fn generated_files(&self) -> [PathBuf; 3] {
        [
            self.install_script_path(),
            self.kubeconfig_path(),
            self.lb_kubeconfig_path(),
        ]
    }

    /// Create the directory if missing; idempotent
    pub async fn ensure(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(format!("failed to create directory {}", self.dir.display()), e))?;
        info!("Created directory {}", self.dir.display());
        Ok(())
    }

    /// Write `contents` to `path`, creating the directory first
    pub async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        self.ensure().await?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let ws = InstanceWorkspace::new(Path::new("/work"), 2);
        assert_eq!(ws.dir(), Path::new("/work/high-availability-2"));
        assert_eq!(
            ws.kubeconfig_path(),
            PathBuf::from("/work/high-availability-2/kube_config.yaml")
        );
        assert_eq!(
            ws.install_script_path(),
            PathBuf::from("/work/high-availability-2/install.sh")
        );
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let ws = InstanceWorkspace::new(root.path(), 1);
        ws.ensure().await.unwrap();
        ws.ensure().await.unwrap();
        assert!(ws.dir().is_dir());
    }

    #[tokio::test]
    async fn test_write_creates_directory_lazily() {
        let root = tempfile::tempdir().unwrap();
        let ws = InstanceWorkspace::new(root.path(), 3);
        ws.write(&ws.kubeconfig_path(), "apiVersion: v1").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(ws.kubeconfig_path()).unwrap(),
            "apiVersion: v1"
        );
    }
}
