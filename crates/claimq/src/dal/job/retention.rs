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

//! Retention: purging finished jobs and recovering stuck ones.
//!
//! Age is measured from `modified_at`. Terminal jobs are purged when strictly
//! older than the cutoff; in-flight jobs are stale from the cutoff on
//! (inclusive), so a job modified at `T` with a timeout of `d` is stale at
//! exactly `T + d`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::{debug, info};

use super::JobDAL;
use crate::dal::models::{now_timestamp, to_db_timestamp, JobRow, StateChange};
use crate::database::schema::queued_jobs;
use crate::error::QueueError;
use crate::models::{JobRecord, JobResult, JobState};

fn terminal_names() -> Vec<String> {
    JobState::TERMINAL
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

impl<'a> JobDAL<'a> {
    /// Deletes `Completed` and `Declined` jobs last modified before `cutoff`.
    ///
    /// Returns the number of jobs deleted.
    pub async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let kind = self.kind.to_string();
        let cutoff = to_db_timestamp(cutoff);
        let terminal = terminal_names();

        let deleted = with_connection!(self, |conn| {
            diesel::delete(
                queued_jobs::table
                    .filter(queued_jobs::kind.eq(kind))
                    .filter(queued_jobs::state.eq_any(terminal))
                    .filter(queued_jobs::modified_at.lt(cutoff)),
            )
            .execute(conn)
        })?;

        if deleted > 0 {
            info!("Purged {} finished {} jobs", deleted, self.kind);
        }
        Ok(deleted as u64)
    }

    /// Counts the jobs [`purge_terminal_older_than`](Self::purge_terminal_older_than)
    /// would delete.
    pub async fn count_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let kind = self.kind.to_string();
        let cutoff = to_db_timestamp(cutoff);
        let terminal = terminal_names();

        let count: i64 = with_connection!(self, |conn| {
            queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .filter(queued_jobs::state.eq_any(terminal))
                .filter(queued_jobs::modified_at.lt(cutoff))
                .count()
                .get_result(conn)
        })?;

        Ok(count.max(0) as u64)
    }

    /// Lists jobs in `state` whose last modification is at or before `cutoff`.
    pub async fn find_stale_older_than(
        &self,
        state: JobState,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let kind = self.kind.to_string();
        let cutoff = to_db_timestamp(cutoff);
        let state_name = state.as_str().to_string();

        let rows: Vec<JobRow> = with_connection!(self, |conn| {
            queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .filter(queued_jobs::state.eq(state_name))
                .filter(queued_jobs::modified_at.le(cutoff))
                .order((queued_jobs::modified_at.asc(), queued_jobs::id.asc()))
                .select(JobRow::as_select())
                .load(conn)
        })?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    /// Moves every job in the in-flight state `from` whose last modification
    /// is at or before `cutoff` to `to`, in one statement.
    ///
    /// `to` must be `Queued` (requeue) or `Declined`. A requeue clears the
    /// result columns. Returns the number of jobs moved.
    pub async fn force_state(
        &self,
        from: JobState,
        cutoff: DateTime<Utc>,
        to: JobState,
        result: Option<&JobResult>,
    ) -> Result<u64, QueueError> {
        if !from.is_in_flight() || !matches!(to, JobState::Queued | JobState::Declined) {
            return Err(QueueError::InvalidTransition { from, to });
        }

        let change = StateChange::new(to, now_timestamp(), result)?;
        let kind = self.kind.to_string();
        let cutoff = to_db_timestamp(cutoff);
        let from_name = from.as_str().to_string();

        let moved = with_connection!(self, |conn| {
            diesel::update(
                queued_jobs::table
                    .filter(queued_jobs::kind.eq(kind))
                    .filter(queued_jobs::state.eq(from_name))
                    .filter(queued_jobs::modified_at.le(cutoff)),
            )
            .set(&change)
            .execute(conn)
        })?;

        if moved > 0 {
            debug!("Moved {} stale {} jobs {} -> {}", moved, self.kind, from, to);
        }
        Ok(moved as u64)
    }
}
