//! Provisioning of the email tracking worker and persistence of its
//! per-account settings and credentials.

pub mod config;
mod database;
pub mod descriptor;
pub mod error;
mod files;
pub mod keys;
pub mod names;
pub mod runner;
pub mod vault;
pub mod workflow;

pub use config::{Config, ConfigStore};
pub use error::{ConfigError, ProvisionError, VaultError};
pub use runner::{CancellationToken, CommandRunner, SystemRunner};
pub use vault::{HashicorpVault, MemoryVault, SecretPurpose, SecretVault};
pub use workflow::{deploy_worker, DeployOptions};
