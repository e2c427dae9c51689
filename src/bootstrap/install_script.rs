//! Rancher install script generation and execution

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::info;

use super::workspace::{InstanceWorkspace, KUBECONFIG_NAME};
use crate::error::{Error, Result};

const HOSTNAME_FLAG: &str = "--set hostname=";

/// Point the Helm command at the instance hostname
///
/// An existing `--set hostname=<value>` has its value replaced (first
/// occurrence only); otherwise the flag is appended on a continuation line.
pub fn inject_hostname(helm_command: &str, hostname: &str) -> String {
    match helm_command.find(HOSTNAME_FLAG) {
        Some(start) => {
            let value_start = start + HOSTNAME_FLAG.len();
            let value_len = helm_command[value_start..]
                .find(char::is_whitespace)
                .unwrap_or(helm_command.len() - value_start);
            let existing = &helm_command[start..value_start + value_len];
            helm_command.replacen(existing, &format!("{HOSTNAME_FLAG}{hostname}"), 1)
        }
        None => format!(
            "{} \\\n  {HOSTNAME_FLAG}{hostname}",
            helm_command.trim()
        ),
    }
}

/// Render the install script around `helm_command`
pub fn render_install_script(helm_command: &str) -> String {
    let helm_command = helm_command.trim_end();
    format!(
        r#"#!/bin/bash
# First make sure we're using the right kubeconfig
if [ ! -f "{KUBECONFIG_NAME}" ]; then
  echo "ERROR: {KUBECONFIG_NAME} not found. Make sure you're in the right directory."
  exit 1
fi

# Export KUBECONFIG to point to our kubeconfig file
export KUBECONFIG=$(pwd)/{KUBECONFIG_NAME}

# Verify kubectl can connect to the cluster
echo "Verifying connection to Kubernetes cluster..."
kubectl cluster-info
if [ $? -ne 0 ]; then
  echo "ERROR: Unable to connect to Kubernetes cluster. Check your kubeconfig."
  exit 1
fi

helm repo update

echo "Creating namespace..."
kubectl create namespace cattle-system

echo "Installing Rancher..."
{helm_command} || {{
  echo "ERROR: Rancher installation failed"
  exit 1
}}

echo "Rancher installation complete!"
"#
    )
}

/// Write the install script into the workspace and mark it executable
pub async fn write_install_script(
    workspace: &InstanceWorkspace,
    helm_command: &str,
) -> Result<PathBuf> {
    let path = workspace.install_script_path();
    workspace
        .write(&path, &render_install_script(helm_command))
        .await?;
    make_executable(&path).await?;
    Ok(path)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| Error::io(format!("failed to make {} executable", path.display()), e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Runs the generated install script against a saved kubeconfig
#[async_trait]
pub trait InstallRunner: Send + Sync {
    async fn run(&self, script: &Path, workdir: &Path, kubeconfig: &Path) -> Result<()>;
}

/// Executes the script as a local child process with inherited stdio
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellInstallRunner;

#[async_trait]
impl InstallRunner for ShellInstallRunner {
    async fn run(&self, script: &Path, workdir: &Path, kubeconfig: &Path) -> Result<()> {
        info!("Executing install script at {}", script.display());

        let script_name = script.display().to_string();
        let status = tokio::process::Command::new(script)
            .current_dir(workdir)
            .env("KUBECONFIG", kubeconfig)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Error::ScriptFailed {
                script: script_name.clone(),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::ScriptFailed {
                script: script_name,
                message: format!("exited with {status}"),
            });
        }

        info!("Install script executed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMD: &str = "helm install rancher rancher-latest/rancher \\\n  --namespace cattle-system \\\n  --set hostname=placeholder.example.com \\\n  --set bootstrapPassword=admin";

    #[test]
    fn test_inject_replaces_existing_hostname() {
        let injected = inject_hostname(CMD, "ha1.example.com");
        assert!(injected.contains("--set hostname=ha1.example.com \\\n"));
        assert!(!injected.contains("placeholder"));
        assert!(injected.ends_with("--set bootstrapPassword=admin"));
    }

    #[test]
    fn test_inject_hostname_at_end_of_command() {
        let injected = inject_hostname("helm install rancher --set hostname=old", "new.example.com");
        assert_eq!(injected, "helm install rancher --set hostname=new.example.com");
    }

    #[test]
    fn test_inject_appends_when_missing() {
        let injected = inject_hostname("helm install rancher rancher-latest/rancher  \n", "ha2.example.com");
        assert_eq!(
            injected,
            "helm install rancher rancher-latest/rancher \\\n  --set hostname=ha2.example.com"
        );
    }

    #[test]
    fn test_inject_only_first_occurrence() {
        let injected = inject_hostname(
            "helm --set hostname=a --set hostname=b",
            "c",
        );
        assert_eq!(injected, "helm --set hostname=c --set hostname=b");
    }

    #[test]
    fn test_script_layout() {
        let script = render_install_script("helm install rancher");
        assert!(script.starts_with("#!/bin/bash\n"));

        let guard = script.find("if [ ! -f \"kube_config.yaml\" ]").unwrap();
        let export = script.find("export KUBECONFIG=$(pwd)/kube_config.yaml").unwrap();
        let cluster_info = script.find("kubectl cluster-info").unwrap();
        let namespace = script.find("kubectl create namespace cattle-system").unwrap();
        let install = script.find("helm install rancher").unwrap();
        assert!(guard < export && export < cluster_info);
        assert!(cluster_info < namespace && namespace < install);
    }

    /// Run the written script under bash with `kubectl` and `helm` replaced by shell functions
    async fn run_with_stub_tools(helm_command: &str, stubs: &str) -> std::process::ExitStatus {
        let root = tempfile::tempdir().unwrap();
        let workspace = InstanceWorkspace::new(root.path(), 1);
        let script = write_install_script(&workspace, helm_command).await.unwrap();
        workspace
            .write(&workspace.kubeconfig_path(), "apiVersion: v1")
            .await
            .unwrap();
        let stub_file = root.path().join("stubs.sh");
        std::fs::write(&stub_file, stubs).unwrap();

        tokio::process::Command::new("bash")
            .arg(&script)
            .current_dir(workspace.dir())
            .env("BASH_ENV", &stub_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .unwrap()
    }

    const HEALTHY_TOOLS: &str = "kubectl() { return 0; }\nhelm() { return 0; }\n";

    #[tokio::test]
    async fn test_script_succeeds_when_install_succeeds() {
        let status = run_with_stub_tools("helm install rancher --set hostname=h", HEALTHY_TOOLS).await;
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_script_fails_when_install_command_fails() {
        let status = run_with_stub_tools("false", HEALTHY_TOOLS).await;
        assert_eq!(status.code(), Some(1));

        let failing_helm = "kubectl() { return 0; }\nhelm() { [ \"$1\" = install ] && return 3; return 0; }\n";
        let status = run_with_stub_tools("helm install rancher \\\n  --set hostname=h\n", failing_helm).await;
        assert_eq!(status.code(), Some(1));
    }

    #[tokio::test]
    async fn test_script_tolerates_existing_namespace() {
        let stubs = "kubectl() { [ \"$1\" = create ] && return 1; return 0; }\nhelm() { return 0; }\n";
        let status = run_with_stub_tools("helm install rancher", stubs).await;
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_script_fails_when_cluster_unreachable() {
        let stubs = "kubectl() { [ \"$1\" = cluster-info ] && return 1; return 0; }\nhelm() { return 0; }\n";
        let status = run_with_stub_tools("helm install rancher", stubs).await;
        assert_eq!(status.code(), Some(1));
    }

    #[test]
    fn test_install_failure_guard_follows_command() {
        let script = render_install_script("helm install rancher \\\n  --set hostname=h\n\n");
        assert!(script.contains("  --set hostname=h || {\n  echo \"ERROR: Rancher installation failed\"\n  exit 1\n}\n"));
        assert!(!script.contains("set -e"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_marks_executable() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let workspace = InstanceWorkspace::new(root.path(), 1);
        let path = write_install_script(&workspace, "helm install rancher")
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_shell_runner_missing_script_fails() {
        let root = tempfile::tempdir().unwrap();
        let workspace = InstanceWorkspace::new(root.path(), 1);
        workspace.ensure().await.unwrap();

        let err = ShellInstallRunner
            .run(
                &workspace.install_script_path(),
                workspace.dir(),
                &workspace.kubeconfig_path(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScriptFailed { .. }));
        assert!(err.to_string().contains("install.sh"));
    }
}
