//! Test doubles for the bootstrap collaborators

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;

use super::install_script::InstallRunner;
use crate::error::Result;
use crate::remote::RemoteExecutor;

type Handler = dyn Fn(IpAddr, &str) -> Result<String> + Send + Sync;

/// Executor answering every command through a closure and recording calls
pub struct FakeExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<(IpAddr, String)>>,
}

impl FakeExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(IpAddr, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(IpAddr, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands_for(&self, host: IpAddr) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| *h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn run(&self, host: IpAddr, command: &str) -> Result<String> {
        self.calls.lock().unwrap().push((host, command.to_string()));
        (self.handler)(host, command)
    }
}

/// Healthy executor whose matching commands block until `parties` callers arrive
///
/// Callers that are still alone after `patience` get an execution error, so a
/// caller running the gated commands one after another fails instead of hanging.
pub struct GatedExecutor {
    needle: &'static str,
    gate: Barrier,
    patience: Duration,
    inner: FakeExecutor,
}

impl GatedExecutor {
    pub fn new(needle: &'static str, parties: usize) -> Self {
        Self {
            needle,
            gate: Barrier::new(parties),
            patience: Duration::from_secs(5),
            inner: FakeExecutor::new(healthy_node),
        }
    }

    pub fn commands_for(&self, host: IpAddr) -> Vec<String> {
        self.inner.commands_for(host)
    }
}

#[async_trait]
impl RemoteExecutor for GatedExecutor {
    async fn run(&self, host: IpAddr, command: &str) -> Result<String> {
        if command.contains(self.needle)
            && tokio::time::timeout(self.patience, self.gate.wait())
                .await
                .is_err()
        {
            return Err(crate::error::Error::ExecutionError {
                host,
                message: format!("no peer reached '{}' in time", self.needle),
            });
        }
        self.inner.run(host, command).await
    }
}

/// Install runner that records invocations and optionally fails
#[derive(Default)]
pub struct RecordingInstaller {
    pub fail: bool,
    runs: Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
}

impl RecordingInstaller {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn runs(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstallRunner for RecordingInstaller {
    async fn run(&self, script: &Path, workdir: &Path, kubeconfig: &Path) -> Result<()> {
        self.runs.lock().unwrap().push((
            script.to_path_buf(),
            workdir.to_path_buf(),
            kubeconfig.to_path_buf(),
        ));
        if self.fail {
            return Err(crate::error::Error::ScriptFailed {
                script: script.display().to_string(),
                message: "exited with exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Healthy RKE2 node behaviour for every command the bootstrap issues
pub fn healthy_node(_host: IpAddr, command: &str) -> Result<String> {
    let output = if command.contains("test -f") {
        "ready"
    } else if command.contains("is-active") {
        "active"
    } else if command.contains("cat /var/lib/rancher/rke2/server/node-token") {
        "K10token::server:secret"
    } else if command.contains("cat /etc/rancher/rke2/rke2.yaml") {
        "apiVersion: v1\nclusters:\n- cluster:\n    server: https://127.0.0.1:6443\n  name: default"
    } else {
        ""
    };
    Ok(output.to_string())
}

/// Flat provisioning outputs for the given instance ordinals
pub fn flat_outputs(instances: &[usize]) -> std::collections::HashMap<String, String> {
    let mut outputs = std::collections::HashMap::new();
    for &n in instances {
        for s in 1..=3 {
            outputs.insert(format!("ha_{n}_server{s}_ip"), format!("52.0.{n}.{s}"));
            outputs.insert(format!("ha_{n}_server{s}_private_ip"), format!("172.31.{n}.{s}"));
        }
        outputs.insert(format!("ha_{n}_aws_lb"), format!("ha{n}-lb.elb.amazonaws.com"));
        outputs.insert(format!("ha_{n}_rancher_url"), format!("ha{n}.example.com"));
    }
    outputs
}
