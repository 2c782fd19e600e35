/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Implementations of the CLI commands.

pub mod admin;
pub mod duration;
pub mod jobs;
pub mod migrate;

use anyhow::{Context, Result};
use claimq::config::{ConfigLoader, QueueConfig};
use claimq::queue::{
    default_policy_for, DatumExportTask, DatumImportJob, JobKind, NodeInstruction, QueuePolicy,
    UserEventTask,
};
use claimq::{Database, DAL};
use std::path::Path;
use tracing::debug;

/// Names of the job kinds shipped with claimq.
pub const BUILTIN_KINDS: [&str; 4] = [
    NodeInstruction::NAME,
    DatumExportTask::NAME,
    DatumImportJob::NAME,
    UserEventTask::NAME,
];

/// Settings shared by all commands.
pub struct CommandEnv {
    database_url: Option<String>,
    config: QueueConfig,
}

impl CommandEnv {
    /// Resolves the configuration file and the database URL.
    ///
    /// A URL given on the command line or in `DATABASE_URL` wins over the
    /// configuration file.
    pub fn load(database_url: Option<String>, config_file: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::new()
            .load_or_default(config_file)
            .context("Failed to load configuration")?;
        let database_url = database_url.or_else(|| config.database.url.clone());

        Ok(Self {
            database_url,
            config,
        })
    }

    /// Opens the configured database.
    pub fn connect(&self) -> Result<Database> {
        let url = self.database_url.as_deref().context(
            "Database URL is required. Set --database-url, DATABASE_URL or [database] url in the configuration file",
        )?;
        debug!("Connecting to {}", url);
        Database::try_new(url, self.config.database.pool_size)
            .context("Failed to connect to database")
    }

    pub fn dal(&self) -> Result<DAL> {
        Ok(DAL::new(self.connect()?))
    }

    /// The effective policy of a kind: built-in defaults (if the kind is a
    /// built-in one) with configuration overrides applied.
    pub fn policy(&self, kind: &str) -> QueuePolicy {
        self.config
            .policy_for_name(kind, default_policy_for(kind).unwrap_or_default())
    }

    /// The kinds a command operates on: the given ones, or all built-in kinds.
    pub fn kinds_or_builtin(kinds: &[String]) -> Vec<String> {
        if kinds.is_empty() {
            BUILTIN_KINDS.iter().map(|k| k.to_string()).collect()
        } else {
            kinds.to_vec()
        }
    }
}
