//! Concurrent bootstrap of every HA instance
//!
//! Instances are independent: each runs in its own task and a failure in one
//! never cancels the others. All tasks are awaited before the first recorded
//! failure is returned.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use super::failure::FirstFailure;
use super::instance::{ClusterBootstrapper, InstanceReport};
use crate::config::validate_install_commands;
use crate::error::{Error, Result};

/// Summary of a fully successful fleet run
#[derive(Clone, Debug, Serialize)]
pub struct FleetReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per instance, ordered by ordinal
    pub instances: Vec<InstanceReport>,
}

pub struct FleetCoordinator {
    bootstrapper: Arc<ClusterBootstrapper>,
    total_instances: usize,
    install_commands: Vec<String>,
}

impl FleetCoordinator {
    pub fn new(
        bootstrapper: Arc<ClusterBootstrapper>,
        total_instances: usize,
        install_commands: Vec<String>,
    ) -> Self {
        Self {
            bootstrapper,
            total_instances,
            install_commands,
        }
    }

    /// Bootstrap instances `1..=total_instances` concurrently
    ///
    /// The command count is checked before any task starts. On failure the
    /// error is the first one observed, wrapped in `InstanceFailed`; every
    /// failure is logged.
    pub async fn run(&self, outputs: HashMap<String, String>) -> Result<FleetReport> {
        validate_install_commands(self.total_instances, &self.install_commands)?;
        if outputs.is_empty() {
            return Err(Error::ValidationError(
                "provisioning returned no outputs".to_string(),
            ));
        }

        let started_at = Utc::now();
        info!("Bootstrapping {} HA instance(s)", self.total_instances);

        let outputs = Arc::new(outputs);
        let handles: Vec<_> = self
            .install_commands
            .iter()
            .enumerate()
            .map(|(i, command)| {
                let instance = i + 1;
                let bootstrapper = Arc::clone(&self.bootstrapper);
                let outputs = Arc::clone(&outputs);
                let command = command.clone();
                tokio::spawn(async move {
                    let result = bootstrapper.bootstrap(instance, &outputs, &command).await;
                    (instance, result)
                })
            })
            .collect();

        let failure = FirstFailure::new();
        let mut instances = Vec::with_capacity(self.total_instances);
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((_, Ok(report))) => instances.push(report),
                Ok((instance, Err(e))) => {
                    let err = Error::InstanceFailed {
                        instance,
                        source: Box::new(e),
                    };
                    error!("{}", err.chain());
                    failure.record(err);
                }
                Err(e) => {
                    let err = Error::WorkerFailed(format!("instance task: {e}"));
                    error!("{}", err);
                    failure.record(err);
                }
            }
        }

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        instances.sort_by_key(|r| r.instance);
        info!("All {} HA instance(s) bootstrapped", instances.len());
        Ok(FleetReport {
            started_at,
            finished_at: Utc::now(),
            instances,
        })
    }
}
