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

//! Row types mapping `queued_jobs` to and from domain jobs.
//!
//! Column types are the same on both backends, so one set of row structs
//! serves PostgreSQL and SQLite.

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use diesel::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::database::schema::queued_jobs;
use crate::error::QueueError;
use crate::models::{JobKey, JobRecord, JobResult, JobState};

/// A stored job as read from the database.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = queued_jobs)]
pub struct JobRow {
    pub id: String,
    pub kind: String,
    pub owner_id: i64,
    pub state: String,
    pub payload: String,
    pub attempt: i32,
    pub result_success: Option<bool>,
    pub result_message: Option<String>,
    pub result_params: Option<String>,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
}

/// A job about to be inserted.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = queued_jobs)]
pub struct NewJobRow {
    pub id: String,
    pub kind: String,
    pub owner_id: i64,
    pub state: String,
    pub payload: String,
    pub attempt: i32,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
}

/// The columns a state transition writes.
///
/// The outer `Option` of a result column selects whether the column is set,
/// the inner one is the value.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = queued_jobs)]
pub struct StateChange {
    pub state: String,
    pub modified_at: NaiveDateTime,
    pub result_success: Option<Option<bool>>,
    pub result_message: Option<Option<String>>,
    pub result_params: Option<Option<String>>,
}

impl StateChange {
    /// Builds the change moving a job to `state` at `now`.
    ///
    /// Moving to `Queued` clears the result columns, so a requeued job never
    /// carries the outcome of an earlier attempt. A terminal state always
    /// writes a result: `Completed` without one records a bare success and
    /// `Declined` without one records a failure. Other targets touch the
    /// result columns only when a result is supplied.
    pub fn new(
        state: JobState,
        now: NaiveDateTime,
        result: Option<&JobResult>,
    ) -> Result<Self, serde_json::Error> {
        let defaulted;
        let result = match (state, result) {
            (JobState::Queued, _) => {
                return Ok(Self {
                    state: state.as_str().to_string(),
                    modified_at: now,
                    result_success: Some(None),
                    result_message: Some(None),
                    result_params: Some(None),
                })
            }
            (JobState::Completed, None) => {
                defaulted = JobResult::success();
                Some(&defaulted)
            }
            (JobState::Declined, None) => {
                defaulted = JobResult::failure("declined");
                Some(&defaulted)
            }
            (_, result) => result,
        };

        let (result_success, result_message, result_params) = match result {
            Some(result) => {
                let params = if result.parameters.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&result.parameters)?)
                };
                (
                    Some(Some(result.success)),
                    Some(result.message.clone()),
                    Some(params),
                )
            }
            None => (None, None, None),
        };

        Ok(Self {
            state: state.as_str().to_string(),
            modified_at: now,
            result_success,
            result_message,
            result_params,
        })
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| QueueError::InvalidRecord(format!("job id '{}': {}", row.id, e)))?;
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|e| QueueError::InvalidRecord(e.to_string()))?;
        let payload: Value = serde_json::from_str(&row.payload)
            .map_err(|e| QueueError::InvalidRecord(format!("payload of job {}: {}", row.id, e)))?;

        let result = match row.result_success {
            Some(success) => {
                let parameters: BTreeMap<String, Value> = match row.result_params.as_deref() {
                    Some(params) => serde_json::from_str(params).map_err(|e| {
                        QueueError::InvalidRecord(format!("result of job {}: {}", row.id, e))
                    })?,
                    None => BTreeMap::new(),
                };
                Some(JobResult {
                    success,
                    message: row.result_message,
                    parameters,
                })
            }
            None => None,
        };

        Ok(JobRecord {
            key: JobKey::new(row.owner_id, id),
            state,
            created: from_db_timestamp(row.created_at),
            modified: from_db_timestamp(row.modified_at),
            attempt: u32::try_from(row.attempt).unwrap_or(0),
            payload,
            result,
        })
    }
}

/// The current time at the precision both backends store.
pub fn now_timestamp() -> NaiveDateTime {
    to_db_timestamp(Utc::now())
}

/// Converts a UTC instant to a stored timestamp, truncated to microseconds.
pub fn to_db_timestamp(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc().trunc_subsecs(6)
}

pub fn from_db_timestamp(at: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at)
}
