// Copyright (c) 2024 PostFinance AG
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::descriptor::parse_field;
use crate::error::ProvisionError;
use crate::runner::{CancellationToken, CommandRequest, CommandRunner};

lazy_static! {
    static ref UUID: Regex =
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .expect("valid uuid pattern");
}

/// Remote database handle, bound to one deployment tool and working directory.
pub(crate) struct RemoteDatabase<'a, R: CommandRunner> {
    runner: &'a R,
    tool: &'a Path,
    dir: &'a Path,
    name: &'a str,
}

impl<'a, R: CommandRunner> RemoteDatabase<'a, R> {
    pub(crate) fn new(runner: &'a R, tool: &'a Path, dir: &'a Path, name: &'a str) -> Self {
        RemoteDatabase {
            runner,
            tool,
            dir,
            name,
        }
    }

    /// Creates the database or, when creation fails, looks up the existing
    /// one. Returns its identifier.
    pub(crate) fn ensure(&self, cancel: &CancellationToken) -> Result<String, ProvisionError> {
        info!("Ensuring database '{}' exists", self.name);

        let created = self.d1(["create", self.name], cancel)?;
        if created.success {
            let id = parse_field(&created.combined, "database_id");
            if !id.is_empty() {
                info!("Created database '{}' ({})", self.name, id);
                return Ok(id);
            }
            warn!(
                "Database '{}' created but no identifier found in output, looking it up",
                self.name
            );
        } else {
            warn!(
                "Could not create database '{}', assuming it already exists",
                self.name
            );
            debug!("create output: {}", created.combined);
        }

        let described = self.d1(["info", self.name], cancel)?;
        if described.success {
            if let Some(id) = identifier_from_info(&described.combined) {
                info!("Found existing database '{}' ({})", self.name, id);
                return Ok(id);
            }
        }

        Err(ProvisionError::DatabaseProvisioningFailed {
            name: self.name.to_string(),
            create_output: created.combined,
            info_output: described.combined,
        })
    }

    /// Runs `schema` against the database.
    pub(crate) fn apply_schema(
        &self,
        schema: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        info!(
            "Applying schema '{}' to database '{}'",
            schema.display(),
            self.name
        );

        let file_arg = format!("--file={}", schema.display());
        let output = self.d1(["execute", self.name, file_arg.as_str()], cancel)?;
        if !output.success {
            return Err(ProvisionError::SchemaApplyFailed {
                output: output.combined,
            });
        }

        Ok(())
    }

    fn d1<const N: usize>(
        &self,
        args: [&str; N],
        cancel: &CancellationToken,
    ) -> Result<crate::runner::CommandOutput, ProvisionError> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        let request = CommandRequest::new(
            PathBuf::from(self.tool),
            std::iter::once("d1").chain(args),
            self.dir,
        );
        self.runner.run(&request, cancel)
    }
}

fn identifier_from_info(output: &str) -> Option<String> {
    ["database_id", "uuid"]
        .into_iter()
        .map(|key| parse_field(output, key))
        .find(|id| !id.is_empty())
        .or_else(|| UUID.find(output).map(|m| m.as_str().to_string()))
}
