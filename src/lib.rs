//! HA Rancher on RKE2: provision and bootstrap highly-available clusters
//!
//! Each HA instance is a triad of freshly provisioned VMs that is bootstrapped
//! into a three-server RKE2 control plane over SSH. The kubeconfig is pulled
//! back and rewritten for external access and Rancher is installed through a
//! generated Helm script. Instances are independent and run concurrently.

pub mod bootstrap;
pub mod cluster_status;
pub mod config;
pub mod error;
pub mod provision;
pub mod remote;
pub mod teardown;
pub mod telemetry;
pub mod topology;

pub use crate::error::{Error, Result};
