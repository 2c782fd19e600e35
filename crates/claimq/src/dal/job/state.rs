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

//! State transitions of claimed jobs.
//!
//! Every transition stamps `modified_at`. Requeueing clears the result
//! columns and terminal transitions always write them. Transitions made on
//! behalf of a claimant can be fenced on the attempt number the claim
//! returned, so a claimant whose job was recovered and claimed again cannot
//! finish the newer attempt.

use diesel::prelude::*;
use tracing::debug;

use super::JobDAL;
use crate::dal::models::{now_timestamp, StateChange};
use crate::database::schema::queued_jobs;
use crate::error::QueueError;
use crate::models::{JobKey, JobResult, JobState};

fn attempt_column(attempt: u32) -> i32 {
    i32::try_from(attempt).unwrap_or(i32::MAX)
}

fn in_flight_names() -> Vec<String> {
    JobState::IN_FLIGHT
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

impl<'a> JobDAL<'a> {
    /// Moves an in-flight job to `new_state`.
    ///
    /// Only `Executing`, `Completed` and `Declined` are valid targets; a job
    /// re-enters `Queued` through [`release_for_retry`](Self::release_for_retry)
    /// and `Claimed` only through [`claim_one`](Self::claim_one). Fails with
    /// `NotFound` for a missing key and `InvalidTransition` when the job is not
    /// in flight.
    pub async fn update_state(
        &self,
        key: JobKey,
        new_state: JobState,
        result: Option<&JobResult>,
    ) -> Result<(), QueueError> {
        self.transition(key, None, new_state, result).await
    }

    /// Like [`update_state`](Self::update_state), but only while the job is
    /// still on the claim that returned `attempt`.
    ///
    /// Fails with `InvalidTransition` when the job has since been requeued
    /// and claimed again, even though it is in flight.
    pub async fn update_claimed_state(
        &self,
        key: JobKey,
        attempt: u32,
        new_state: JobState,
        result: Option<&JobResult>,
    ) -> Result<(), QueueError> {
        self.transition(key, Some(attempt), new_state, result).await
    }

    async fn transition(
        &self,
        key: JobKey,
        attempt: Option<u32>,
        new_state: JobState,
        result: Option<&JobResult>,
    ) -> Result<(), QueueError> {
        if matches!(new_state, JobState::Queued | JobState::Claimed) {
            let from = self.current_state(key).await?;
            return Err(QueueError::InvalidTransition {
                from,
                to: new_state,
            });
        }

        let change = StateChange::new(new_state, now_timestamp(), result)?;
        let kind = self.kind.to_string();
        let id = key.id.to_string();
        let owner_id = key.owner_id;
        let in_flight = in_flight_names();
        let fence = attempt.map(attempt_column);

        let updated = with_connection!(self, |conn| {
            let target = queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .filter(queued_jobs::owner_id.eq(owner_id))
                .filter(queued_jobs::id.eq(id))
                .filter(queued_jobs::state.eq_any(in_flight));
            match fence {
                Some(attempt) => diesel::update(target.filter(queued_jobs::attempt.eq(attempt)))
                    .set(&change)
                    .execute(conn),
                None => diesel::update(target).set(&change).execute(conn),
            }
        })?;

        if updated == 0 {
            let from = self.current_state(key).await?;
            if let Some(attempt) = attempt {
                debug!(
                    "{} job {} is no longer on attempt {}, {} -> {} refused",
                    self.kind, key, attempt, from, new_state
                );
            }
            return Err(QueueError::InvalidTransition {
                from,
                to: new_state,
            });
        }

        debug!("{} job {} -> {}", self.kind, key, new_state);
        Ok(())
    }

    /// Moves a job from `expected` to `new_state` only if it is still in
    /// `expected`.
    ///
    /// Returns `Ok(false)` when the job has moved on, so concurrent
    /// acknowledgements of the same job resolve to exactly one winner. The
    /// claim edge `Queued -> Claimed` is refused; it belongs to
    /// [`claim_one`](Self::claim_one).
    pub async fn compare_and_update_state(
        &self,
        key: JobKey,
        expected: JobState,
        new_state: JobState,
        result: Option<&JobResult>,
    ) -> Result<bool, QueueError> {
        if new_state == JobState::Claimed {
            return Err(QueueError::InvalidTransition {
                from: expected,
                to: new_state,
            });
        }

        let change = StateChange::new(new_state, now_timestamp(), result)?;
        let kind = self.kind.to_string();
        let id = key.id.to_string();
        let owner_id = key.owner_id;
        let expected_name = expected.as_str().to_string();

        let updated = with_connection!(self, |conn| {
            diesel::update(
                queued_jobs::table
                    .filter(queued_jobs::kind.eq(kind))
                    .filter(queued_jobs::owner_id.eq(owner_id))
                    .filter(queued_jobs::id.eq(id))
                    .filter(queued_jobs::state.eq(expected_name)),
            )
            .set(&change)
            .execute(conn)
        })?;

        if updated == 0 {
            if !self.exists(key).await? {
                return Err(QueueError::NotFound(key));
            }
            debug!(
                "{} job {} no longer {}, compare-and-set skipped",
                self.kind, key, expected
            );
            return Ok(false);
        }

        debug!("{} job {} {} -> {}", self.kind, key, expected, new_state);
        Ok(true)
    }

    /// Returns an in-flight job to `Queued` for another attempt.
    ///
    /// Only the claim that returned `attempt` may release the job. The
    /// attempt counter is kept and the next claim increments it. The result
    /// columns are cleared. Returns `Ok(false)` when the job is no longer in
    /// flight on that attempt.
    pub async fn release_for_retry(&self, key: JobKey, attempt: u32) -> Result<bool, QueueError> {
        let change = StateChange::new(JobState::Queued, now_timestamp(), None)?;
        let kind = self.kind.to_string();
        let id = key.id.to_string();
        let owner_id = key.owner_id;
        let in_flight = in_flight_names();
        let attempt = attempt_column(attempt);

        let updated = with_connection!(self, |conn| {
            diesel::update(
                queued_jobs::table
                    .filter(queued_jobs::kind.eq(kind))
                    .filter(queued_jobs::owner_id.eq(owner_id))
                    .filter(queued_jobs::id.eq(id))
                    .filter(queued_jobs::state.eq_any(in_flight))
                    .filter(queued_jobs::attempt.eq(attempt)),
            )
            .set(&change)
            .execute(conn)
        })?;

        if updated == 0 && !self.exists(key).await? {
            return Err(QueueError::NotFound(key));
        }

        if updated > 0 {
            debug!("{} job {} released for retry", self.kind, key);
        }
        Ok(updated > 0)
    }
}
