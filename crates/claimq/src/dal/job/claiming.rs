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

//! Atomic claiming of queued jobs.
//!
//! Claiming selects the oldest `Queued` job of a kind and moves it to
//! `Claimed` in a single statement, so concurrent workers (in this process or
//! others) never receive the same job.
//!
//! - **PostgreSQL**: the candidate row is locked with
//!   `FOR UPDATE SKIP LOCKED`, so competing claimers move on to the next row
//!   instead of waiting.
//! - **SQLite**: the statement runs in an `IMMEDIATE` transaction, which takes
//!   the database write lock before reading.
//!
//! Ties on `created_at` are broken by owner id and then job id, giving a
//! total order.

use diesel::prelude::*;
use diesel::sql_types::{Text, Timestamp};
use tracing::debug;

use super::JobDAL;
use crate::dal::models::{now_timestamp, JobRow};
use crate::error::QueueError;
use crate::models::JobRecord;

#[cfg(feature = "postgres")]
const POSTGRES_CLAIM_SQL: &str = r#"
    UPDATE queued_jobs
    SET state = 'Claimed',
        attempt = attempt + 1,
        modified_at = $2
    WHERE id = (
        SELECT id FROM queued_jobs
        WHERE kind = $1 AND state = 'Queued'
        ORDER BY created_at ASC, owner_id ASC, id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    AND state = 'Queued'
    RETURNING id, kind, owner_id, state, payload, attempt,
              result_success, result_message, result_params,
              created_at, modified_at
"#;

#[cfg(feature = "sqlite")]
const SQLITE_CLAIM_SQL: &str = r#"
    UPDATE queued_jobs
    SET state = 'Claimed',
        attempt = attempt + 1,
        modified_at = ?
    WHERE id = (
        SELECT id FROM queued_jobs
        WHERE kind = ? AND state = 'Queued'
        ORDER BY created_at ASC, owner_id ASC, id ASC
        LIMIT 1
    )
    RETURNING id, kind, owner_id, state, payload, attempt,
              result_success, result_message, result_params,
              created_at, modified_at
"#;

impl<'a> JobDAL<'a> {
    /// Atomically claims the oldest queued job of this kind.
    ///
    /// The claimed job is returned as the claim statement left it: state
    /// `Claimed`, attempt incremented and `modified` stamped. Returns
    /// `Ok(None)` when nothing is queued.
    pub async fn claim_one(&self) -> Result<Option<JobRecord>, QueueError> {
        let row = dispatch_backend!(
            self.backend(),
            self.claim_one_postgres().await?,
            self.claim_one_sqlite().await?
        );

        match row {
            Some(row) => {
                let job = JobRecord::try_from(row)?;
                debug!(
                    "Claimed {} job {} (attempt {})",
                    self.kind, job.key, job.attempt
                );
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    #[cfg(feature = "postgres")]
    async fn claim_one_postgres(&self) -> Result<Option<JobRow>, QueueError> {
        let conn = self.database().get_postgres_connection().await?;
        let kind = self.kind.to_string();
        let now = now_timestamp();

        let claimed: Vec<JobRow> = conn
            .interact(move |conn| {
                diesel::sql_query(POSTGRES_CLAIM_SQL)
                    .bind::<Text, _>(kind)
                    .bind::<Timestamp, _>(now)
                    .load::<JobRow>(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(claimed.into_iter().next())
    }

    #[cfg(feature = "sqlite")]
    async fn claim_one_sqlite(&self) -> Result<Option<JobRow>, QueueError> {
        let conn = self.database().get_sqlite_connection().await?;
        let kind = self.kind.to_string();
        let now = now_timestamp();

        let claimed: Vec<JobRow> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::sql_query(SQLITE_CLAIM_SQL)
                        .bind::<Timestamp, _>(now)
                        .bind::<Text, _>(kind)
                        .load::<JobRow>(conn)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(claimed.into_iter().next())
    }
}
