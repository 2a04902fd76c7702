//! Provisioning of the tracking worker and its database.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::database::RemoteDatabase;
use crate::descriptor::{write_descriptor, DESCRIPTOR_FILE};
use crate::error::ProvisionError;
use crate::names::{default_name, sanitize, MAX_NAME_LENGTH};
use crate::runner::{CancellationToken, CommandRequest, CommandRunner};

pub const DEFAULT_TOOL: &str = "wrangler";
pub const SCHEMA_FILE: &str = "schema.sql";
pub const TRACKING_KEY_SECRET: &str = "TRACKING_KEY";
pub const ADMIN_KEY_SECRET: &str = "ADMIN_KEY";

#[derive(Clone, Debug)]
pub struct DeployOptions {
    /// Holds the descriptor and, optionally, the schema file.
    pub dir: PathBuf,
    /// Seeds the default worker name.
    pub account: String,
    pub worker_name: String,
    pub database_name: String,
    pub tracking_key: String,
    pub admin_key: String,
    /// Deployment tool, looked up on the search path.
    pub tool: String,
}

impl DeployOptions {
    pub fn new(dir: impl Into<PathBuf>, account: impl Into<String>) -> DeployOptions {
        DeployOptions {
            dir: dir.into(),
            account: account.into(),
            worker_name: String::new(),
            database_name: String::new(),
            tracking_key: String::new(),
            admin_key: String::new(),
            tool: DEFAULT_TOOL.to_string(),
        }
    }

    /// Requested worker name, or one derived from the account.
    pub fn resolved_worker_name(&self) -> String {
        match sanitize(&self.worker_name) {
            name if name.is_empty() => default_name(&self.account),
            name => name,
        }
    }

    /// Requested database name, or `<worker>-db`.
    pub fn resolved_database_name(&self, worker_name: &str) -> String {
        match sanitize(&self.database_name) {
            name if name.is_empty() => {
                // sanitized names are ASCII, slicing by byte is safe
                let worker_name = sanitize(worker_name);
                let base = &worker_name[..worker_name.len().min(MAX_NAME_LENGTH - 3)];
                sanitize(&format!("{base}-db"))
            }
            name => name,
        }
    }
}

/// Makes sure the database exists, points the descriptor at it, seeds the
/// schema, installs both secrets and deploys the worker. Returns the database
/// identifier.
///
/// Safe to re-run after a partial failure; nothing is rolled back.
pub fn deploy_worker<R: CommandRunner>(
    runner: &R,
    options: &DeployOptions,
    cancel: &CancellationToken,
) -> Result<String, ProvisionError> {
    let tool = runner
        .resolve(&options.tool)
        .ok_or_else(|| ProvisionError::ToolNotFound {
            tool: options.tool.clone(),
        })?;
    debug!("Using deployment tool at: {}", tool.display());

    let descriptor = options.dir.join(DESCRIPTOR_FILE);
    if !descriptor.is_file() {
        return Err(ProvisionError::DescriptorMissing { path: descriptor });
    }

    let worker_name = options.resolved_worker_name();
    let database_name = options.resolved_database_name(&worker_name);
    info!(
        "Provisioning worker '{}' with database '{}'",
        worker_name, database_name
    );

    let database = RemoteDatabase::new(runner, &tool, &options.dir, &database_name);
    let database_id = database.ensure(cancel)?;

    write_descriptor(&options.dir, &worker_name, &database_name, &database_id)?;

    let schema = options.dir.join(SCHEMA_FILE);
    if schema.is_file() {
        database.apply_schema(Path::new(SCHEMA_FILE), cancel)?;
    } else {
        debug!("No {} in '{}', skipping schema", SCHEMA_FILE, options.dir.display());
    }

    install_secret(runner, &tool, options, TRACKING_KEY_SECRET, &options.tracking_key, cancel)?;
    install_secret(runner, &tool, options, ADMIN_KEY_SECRET, &options.admin_key, cancel)?;

    deploy(runner, &tool, options, cancel)?;

    info!(
        "Deployed worker '{}' bound to database '{}' ({})",
        worker_name, database_name, database_id
    );

    Ok(database_id)
}

// The value only ever travels over stdin, never on the command line.
fn install_secret<R: CommandRunner>(
    runner: &R,
    tool: &Path,
    options: &DeployOptions,
    name: &str,
    value: &str,
    cancel: &CancellationToken,
) -> Result<(), ProvisionError> {
    if cancel.is_cancelled() {
        return Err(ProvisionError::Cancelled);
    }

    info!("Installing secret '{}'", name);

    let request =
        CommandRequest::new(tool, ["secret", "put", name], &options.dir).with_stdin(value);
    let output = runner.run(&request, cancel)?;
    if !output.success {
        return Err(ProvisionError::SecretInstallFailed {
            name: name.to_string(),
            output: output.combined,
        });
    }

    Ok(())
}

fn deploy<R: CommandRunner>(
    runner: &R,
    tool: &Path,
    options: &DeployOptions,
    cancel: &CancellationToken,
) -> Result<(), ProvisionError> {
    if cancel.is_cancelled() {
        return Err(ProvisionError::Cancelled);
    }

    info!("Deploying worker from '{}'", options.dir.display());

    let output = runner.run(&CommandRequest::new(tool, ["deploy"], &options.dir), cancel)?;
    if !output.success {
        return Err(ProvisionError::DeployFailed {
            output: output.combined,
        });
    }

    Ok(())
}
