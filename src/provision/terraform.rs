//! Terraform CLI adapter
//!
//! Runs `terraform` in the module directory. Variables are passed through a
//! generated `terraform.tfvars`, which terraform loads automatically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::Provisioner;
use crate::config::TerraformVars;
use crate::error::{Error, Result};

pub const TFVARS_FILE: &str = "terraform.tfvars";

/// Name of the module output holding the flat `ha_<n>_*` map
pub const FLAT_OUTPUTS: &str = "flat_outputs";

/// stderr fragments of failures worth another attempt
const TRANSIENT_ERRORS: &[&str] = &[
    "connection reset by peer",
    "TLS handshake timeout",
    "timeout while waiting for plugin to start",
    "unexpected EOF",
    "Failed to download provider",
    "Error installing provider",
    "429 Too Many Requests",
    "i/o timeout",
];

/// Returns true when `stderr` matches a known transient terraform failure
pub fn is_transient(stderr: &str) -> bool {
    TRANSIENT_ERRORS.iter().any(|p| stderr.contains(p))
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Quote a value as an HCL string literal
fn hcl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // interpolation sequences are escaped by doubling the sigil
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render the contents of `terraform.tfvars`
pub fn render_tfvars(vars: &TerraformVars, total_has: usize) -> String {
    let mut out = format!("total_has = {total_has}\n");
    for (key, value) in vars.entries() {
        out.push_str(&format!("{key} = {}\n", hcl_string(value)));
    }
    out
}

/// Parse the JSON emitted by `terraform output -json flat_outputs`
pub fn parse_flat_outputs(raw: &str) -> Result<HashMap<String, String>> {
    let outputs: HashMap<String, String> = serde_json::from_str(raw.trim())?;
    Ok(outputs)
}

struct CommandFailure {
    stderr: String,
    error: Error,
}

pub struct Terraform {
    module_dir: PathBuf,
    vars: TerraformVars,
    total_has: usize,
    binary: PathBuf,
    retry: RetryPolicy,
}

impl Terraform {
    pub fn new(module_dir: impl Into<PathBuf>, vars: TerraformVars, total_has: usize) -> Self {
        Self {
            module_dir: module_dir.into(),
            vars,
            total_has,
            binary: PathBuf::from("terraform"),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn tfvars_path(&self) -> PathBuf {
        self.module_dir.join(TFVARS_FILE)
    }

    /// Write `terraform.tfvars` into the module directory
    pub async fn write_tfvars(&self) -> Result<()> {
        let path = self.tfvars_path();
        tokio::fs::write(&path, render_tfvars(&self.vars, self.total_has))
            .await
            .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn run_once(&self, args: &[&str]) -> std::result::Result<String, CommandFailure> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .current_dir(&self.module_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CommandFailure {
                stderr: String::new(),
                error: Error::ProvisionError(format!(
                    "failed to run {} {}: {e}",
                    self.binary.display(),
                    args.join(" ")
                )),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let error = Error::ProvisionError(format!(
                "terraform {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            ));
            return Err(CommandFailure { stderr, error });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a terraform command, retrying known transient failures
    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_once(args).await {
                Ok(stdout) => return Ok(stdout),
                Err(failure) => {
                    if attempt >= self.retry.max_attempts || !is_transient(&failure.stderr) {
                        return Err(failure.error);
                    }
                    warn!(
                        "terraform {} failed with a transient error, attempt {}/{}",
                        args.first().copied().unwrap_or_default(),
                        attempt,
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Provisioner for Terraform {
    #[instrument(skip(self), fields(module = %self.module_dir.display()))]
    async fn apply(&self) -> Result<()> {
        self.write_tfvars().await?;
        info!("Running terraform init");
        self.run(&["init", "-input=false", "-no-color"]).await?;
        info!("Running terraform apply for {} HA instance(s)", self.total_has);
        self.run(&["apply", "-input=false", "-no-color", "-auto-approve"])
            .await?;
        Ok(())
    }

    async fn outputs(&self) -> Result<HashMap<String, String>> {
        let raw = self
            .run(&["output", "-no-color", "-json", FLAT_OUTPUTS])
            .await?;
        parse_flat_outputs(&raw).map_err(|e| {
            debug!("Raw output: {}", raw);
            Error::ProvisionError(format!("failed to parse terraform outputs: {e}"))
        })
    }

    #[instrument(skip(self), fields(module = %self.module_dir.display()))]
    async fn destroy(&self) -> Result<()> {
        self.write_tfvars().await?;
        info!("Running terraform destroy");
        self.run(&["destroy", "-input=false", "-no-color", "-auto-approve"])
            .await?;
        Ok(())
    }
}
