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

//! Data Access Layer with runtime backend selection
//!
//! Every operation of the job store is implemented for both PostgreSQL and
//! SQLite. Most operations are expressed once with Diesel's query builder and
//! expanded per backend by [`with_connection!`]; the claim statement differs
//! between backends and is written out for each.
//!
//! # Example
//!
//! ```rust,ignore
//! use claimq::dal::DAL;
//! use claimq::database::Database;
//!
//! let db = Database::try_new("postgres://localhost/claimq", 10)?;
//! let dal = DAL::new(db);
//!
//! // Operations automatically use the correct backend
//! let next = dal.jobs("node_instruction").claim_one().await?;
//! ```

use crate::database::{BackendType, Database};

/// Evaluates one of two expressions depending on the backend.
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite,
        }
    };
}

/// Runs a Diesel closure on a pooled connection of whichever backend the DAL
/// uses.
///
/// The body is expanded once per backend, so it is type-checked against both
/// `PgConnection` and `SqliteConnection`. It evaluates to the closure's
/// `Result<T, diesel::result::Error>`; pool failures return early with
/// [`QueueError::ConnectionPool`](crate::error::QueueError::ConnectionPool).
macro_rules! with_connection {
    ($dal:expr, |$conn:ident| $body:expr) => {
        dispatch_backend!(
            $dal.backend(),
            {
                let pooled = $dal.database().get_postgres_connection().await?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::QueueError::ConnectionPool(e.to_string()))?
            },
            {
                let pooled = $dal.database().get_sqlite_connection().await?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::QueueError::ConnectionPool(e.to_string()))?
            }
        )
    };
}

pub mod job;
pub mod models;

pub use job::JobDAL;

/// The unified Data Access Layer struct.
///
/// # Thread Safety
///
/// `DAL` is `Clone` and can be shared between threads. Each clone references
/// the same underlying connection pool.
#[derive(Clone, Debug)]
pub struct DAL {
    /// The database instance with connection pool
    pub database: Database,
}

impl DAL {
    /// Creates a new DAL over a database handle.
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns the backend type for this DAL instance.
    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the job store for one job kind.
    pub fn jobs<'a>(&'a self, kind: &'a str) -> JobDAL<'a> {
        JobDAL::new(self, kind)
    }
}
