use std::path::PathBuf;

use thiserror::Error;

use crate::vault::SecretPurpose;

/// Failures while provisioning and deploying the tracking worker.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("deployment tool '{tool}' not found on PATH")]
    ToolNotFound { tool: String },

    #[error("deployment descriptor missing: {}", .path.display())]
    DescriptorMissing { path: PathBuf },

    #[error("deployment descriptor not found: {}", .path.display())]
    DescriptorNotFound { path: PathBuf },

    #[error(
        "failed to provision database '{name}'\n--- create ---\n{create_output}\n--- info ---\n{info_output}"
    )]
    DatabaseProvisioningFailed {
        name: String,
        create_output: String,
        info_output: String,
    },

    #[error("failed to apply schema:\n{output}")]
    SchemaApplyFailed { output: String },

    #[error("failed to install secret '{name}':\n{output}")]
    SecretInstallFailed { name: String, output: String },

    #[error("deploy failed:\n{output}")]
    DeployFailed { output: String },

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provisioning cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while reading or writing the local tracking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("account must not be empty")]
    MissingAccount,

    #[error("could not determine the user configuration directory")]
    NoConfigDir,

    #[error("invalid worker url '{url}': {reason}")]
    InvalidWorkerUrl { url: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Failures talking to the secret store.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secret store not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("no {purpose} stored for account '{account}'")]
    SecretNotFound {
        account: String,
        purpose: SecretPurpose,
    },

    #[error("secret store request failed: {0}")]
    Client(String),
}
