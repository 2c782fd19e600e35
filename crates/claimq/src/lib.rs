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

//! # claimq
//!
//! A claim-based persistent job queue backed by PostgreSQL or SQLite.
//!
//! Work items are stored in a shared table; any number of worker processes
//! compete for them through an atomic claim, so each job is processed by at
//! most one worker at a time without any lock manager beyond the database.
//!
//! ## Overview
//!
//! - [`queue::JobQueue`]: the generic engine, one per [`queue::JobKind`].
//!   Submission (with [`queue::SubmitHook`]s), compare-and-set
//!   acknowledgement, queries, and the processor and retention ticks.
//! - [`dal`]: the job store, implemented for both backends.
//! - [`auth::AuthorizedQueue`]: explicit caller checks around the public APIs.
//! - [`runner::QueueRunner`]: optional in-process trigger for the ticks.
//! - [`config`]: TOML configuration with environment substitution.
//!
//! ## Lifecycle
//!
//! ```text
//! Queued -> Claimed [-> Executing] -> Completed | Declined
//!    ^          |           |
//!    +----------+-----------+   (retry policy, stale recovery)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use claimq::{Database, DAL};
//! use claimq::queue::{JobQueue, NodeInstruction, InstructionPayload};
//!
//! let database = Database::try_new("sqlite://claimq.db", 1)?;
//! database.run_migrations().await?;
//!
//! let queue = JobQueue::<NodeInstruction>::new(DAL::new(database));
//! let key = queue
//!     .submit(42, InstructionPayload::new("Ping"))
//!     .await?
//!     .expect("no hooks registered");
//!
//! let report = queue.run_processor_tick(&handler).await?;
//! ```
//!
//! ## Backends
//!
//! The `sqlite` feature is on by default; enable `postgres` for PostgreSQL.
//! The backend is chosen at runtime from the connection URL.

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("claimq needs at least one of the `postgres` or `sqlite` features");

pub mod auth;
pub mod config;
pub mod dal;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod queue;
pub mod runner;

pub use dal::DAL;
pub use database::{BackendType, Database, DatabaseError};
pub use error::QueueError;
pub use models::{
    Job, JobFilter, JobKey, JobRecord, JobResult, JobSort, JobState, NewJob, Page, StateGraph,
};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a `tracing` subscriber writing to stderr.
///
/// `directive` (e.g. `"claimq=debug"`) takes precedence over `RUST_LOG`;
/// without either, `info` is used. Does nothing if a global subscriber is
/// already installed.
pub fn init_logging(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
