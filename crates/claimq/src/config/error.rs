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

//! Errors raised while locating, reading and checking `claimq.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// No explicit path, no `CLAIMQ_CONFIG`, and nothing at the search paths.
    #[error("No claimq configuration file found")]
    ConfigNotFound,

    #[error("Cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed claimq.toml: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// A `${VAR}` reference could not be resolved.
    #[error("{0}")]
    EnvSubstitutionError(String),

    #[error("Configuration must be TOML, got a .{extension} file")]
    UnsupportedFormat { extension: String },

    #[error("database.pool_size {size} is outside 1..=100")]
    InvalidPoolSize { size: u32 },

    #[error("runner.{field} {reason}")]
    InvalidRunner { field: &'static str, reason: String },

    /// An override in a `[kinds.<name>]` section is out of range.
    #[error("kinds.{kind}.{field} {reason}")]
    InvalidKind {
        kind: String,
        field: &'static str,
        reason: String,
    },
}
