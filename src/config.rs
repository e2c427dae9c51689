//! Tool configuration loaded from `tool-config.yml`
//!
//! The file is read once at process start and passed down explicitly; nothing
//! below the CLI layer reads configuration on its own.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "tool-config.yml";
pub const DEFAULT_SSH_USER: &str = "ubuntu";

#[derive(Clone, Debug, Deserialize)]
pub struct ToolConfig {
    /// Number of HA instances to provision and bootstrap
    pub total_has: usize,
    pub rancher: RancherConfig,
    pub k8s: K8sConfig,
    pub aws: AwsConfig,
    pub tf_vars: TerraformVars,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RancherConfig {
    /// One Helm install command per instance, in instance order
    pub helm_commands: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct K8sConfig {
    /// RKE2 release passed as `INSTALL_RKE2_VERSION`
    pub version: String,
}

#[derive(Clone, Deserialize)]
pub struct AwsConfig {
    /// PEM-encoded private key matching `tf_vars.aws_pem_key_name`
    pub rsa_private_key: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("rsa_private_key", &"<redacted>")
            .field("ssh_user", &self.ssh_user)
            .finish()
    }
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

/// Variables handed to the Terraform module
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TerraformVars {
    pub aws_prefix: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub aws_vpc: String,
    pub aws_subnet_a: String,
    pub aws_subnet_b: String,
    pub aws_subnet_c: String,
    pub aws_ami: String,
    pub aws_subnet_id: String,
    pub aws_security_group_id: String,
    pub aws_pem_key_name: String,
    pub aws_route53_fqdn: String,
}

impl std::fmt::Debug for TerraformVars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerraformVars")
            .field("aws_prefix", &self.aws_prefix)
            .field("aws_vpc", &self.aws_vpc)
            .field("aws_ami", &self.aws_ami)
            .field("aws_route53_fqdn", &self.aws_route53_fqdn)
            .finish_non_exhaustive()
    }
}

impl TerraformVars {
    /// String-valued variables in the order they are written to `terraform.tfvars`
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("aws_prefix", self.aws_prefix.as_str()),
            ("aws_access_key", self.aws_access_key.as_str()),
            ("aws_secret_key", self.aws_secret_key.as_str()),
            ("aws_vpc", self.aws_vpc.as_str()),
            ("aws_subnet_a", self.aws_subnet_a.as_str()),
            ("aws_subnet_b", self.aws_subnet_b.as_str()),
            ("aws_subnet_c", self.aws_subnet_c.as_str()),
            ("aws_ami", self.aws_ami.as_str()),
            ("aws_subnet_id", self.aws_subnet_id.as_str()),
            ("aws_security_group_id", self.aws_security_group_id.as_str()),
            ("aws_pem_key_name", self.aws_pem_key_name.as_str()),
            ("aws_route53_fqdn", self.aws_route53_fqdn.as_str()),
        ]
    }
}

impl ToolConfig {
    /// Read and validate the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read config {}", path.display()), e))?;
        let config = Self::from_yaml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::ConfigError(format!("failed to parse config: {e}")))
    }

    /// Check the preconditions that must hold before any instance work begins
    pub fn validate(&self) -> Result<()> {
        if self.total_has < 1 {
            return Err(Error::ValidationError(
                "total_has must be at least 1".to_string(),
            ));
        }
        validate_install_commands(self.total_has, &self.rancher.helm_commands)?;
        if self.k8s.version.trim().is_empty() {
            return Err(Error::ValidationError(
                "k8s.version must not be empty".to_string(),
            ));
        }
        if self.aws.rsa_private_key.trim().is_empty() {
            return Err(Error::ValidationError(
                "aws.rsa_private_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The install command list must have exactly one entry per instance
pub fn validate_install_commands(total_instances: usize, commands: &[String]) -> Result<()> {
    if commands.len() != total_instances {
        return Err(Error::ValidationError(format!(
            "Number of Helm commands ({}) does not match the number of HA instances ({}). \
             Please ensure you have exactly {} Helm commands in your configuration.",
            commands.len(),
            total_instances,
            total_instances
        )));
    }
    Ok(())
}
