//! Infrastructure provisioning
//!
//! The bootstrap only needs three things from the provisioning engine: create
//! the infrastructure, read back the flat output map, and destroy it again.

pub mod terraform;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub use terraform::{RetryPolicy, Terraform, FLAT_OUTPUTS, TFVARS_FILE};

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create (or converge) the infrastructure
    async fn apply(&self) -> Result<()>;

    /// Flat string map of `ha_<n>_*` outputs
    async fn outputs(&self) -> Result<HashMap<String, String>>;

    /// Destroy everything `apply` created
    async fn destroy(&self) -> Result<()>;
}
