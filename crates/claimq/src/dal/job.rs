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

//! Job store operations scoped to one job kind.
//!
//! This module is split into focused submodules:
//! - `claiming`: atomic claim of the oldest queued job
//! - `state`: state transitions, compare-and-set and retry release
//! - `retention`: purge of terminal jobs and stale-job recovery

mod claiming;
mod retention;
mod state;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;
use uuid::Uuid;

use super::models::{from_db_timestamp, now_timestamp, to_db_timestamp, JobRow, NewJobRow};
use super::DAL;
use crate::database::schema::queued_jobs;
use crate::database::{BackendType, Database};
use crate::error::QueueError;
use crate::models::{Job, JobFilter, JobKey, JobRecord, JobSort, JobState, NewJob, Page};

/// Narrows a `queued_jobs` query by a [`JobFilter`].
macro_rules! apply_filter {
    ($query:ident, $filter:expr) => {{
        let filter: &JobFilter = &$filter;
        if !filter.owner_ids.is_empty() {
            $query = $query.filter(queued_jobs::owner_id.eq_any(filter.owner_ids.clone()));
        }
        if !filter.states.is_empty() {
            let states: Vec<String> = filter.states.iter().map(|s| s.as_str().to_string()).collect();
            $query = $query.filter(queued_jobs::state.eq_any(states));
        }
        if let Some(after) = filter.created_after {
            $query = $query.filter(queued_jobs::created_at.ge(to_db_timestamp(after)));
        }
        if let Some(before) = filter.created_before {
            $query = $query.filter(queued_jobs::created_at.lt(to_db_timestamp(before)));
        }
    }};
}

/// Data access for the jobs of one kind.
#[derive(Clone)]
pub struct JobDAL<'a> {
    dal: &'a DAL,
    kind: &'a str,
}

impl<'a> JobDAL<'a> {
    pub fn new(dal: &'a DAL, kind: &'a str) -> Self {
        Self { dal, kind }
    }

    /// The job kind this store is scoped to.
    pub fn kind(&self) -> &str {
        self.kind
    }

    fn backend(&self) -> BackendType {
        self.dal.backend()
    }

    fn database(&self) -> &Database {
        self.dal.database()
    }

    /// Inserts a new job in state `Queued` with attempt 0.
    ///
    /// A generated id is used unless the caller supplies one. Inserting a key
    /// that already exists fails with [`QueueError::Conflict`].
    pub async fn insert(&self, new_job: NewJob) -> Result<JobRecord, QueueError> {
        let now = now_timestamp();
        let key = JobKey::new(new_job.owner_id, new_job.id.unwrap_or_else(Uuid::new_v4));

        let row = NewJobRow {
            id: key.id.to_string(),
            kind: self.kind.to_string(),
            owner_id: key.owner_id,
            state: JobState::Queued.as_str().to_string(),
            payload: serde_json::to_string(&new_job.payload)?,
            attempt: 0,
            created_at: now,
            modified_at: now,
        };

        let inserted = with_connection!(self, |conn| {
            diesel::insert_into(queued_jobs::table)
                .values(&row)
                .execute(conn)
        });

        match inserted {
            Ok(_) => {}
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(QueueError::Conflict(key));
            }
            Err(e) => return Err(e.into()),
        }

        debug!("Inserted {} job {}", self.kind, key);

        Ok(Job {
            key,
            state: JobState::Queued,
            created: from_db_timestamp(now),
            modified: from_db_timestamp(now),
            attempt: 0,
            payload: new_job.payload,
            result: None,
        })
    }

    /// Fetches one job by key.
    pub async fn get(&self, key: JobKey) -> Result<JobRecord, QueueError> {
        self.find(key)
            .await?
            .ok_or(QueueError::NotFound(key))
    }

    /// Fetches one job by key, returning `None` when it does not exist.
    pub async fn find(&self, key: JobKey) -> Result<Option<JobRecord>, QueueError> {
        let kind = self.kind.to_string();
        let id = key.id.to_string();
        let owner_id = key.owner_id;

        let row: Option<JobRow> = with_connection!(self, |conn| {
            queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .filter(queued_jobs::owner_id.eq(owner_id))
                .filter(queued_jobs::id.eq(id))
                .select(JobRow::as_select())
                .first(conn)
                .optional()
        })?;

        row.map(JobRecord::try_from).transpose()
    }

    /// Lists jobs matching a filter, ordered and paged.
    pub async fn find_filtered(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let kind = self.kind.to_string();
        let filter = filter.clone();
        let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);

        let rows: Vec<JobRow> = with_connection!(self, |conn| {
            let mut query = queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .select(JobRow::as_select())
                .into_boxed();
            apply_filter!(query, filter);

            query = match sort {
                JobSort::CreatedAsc => query.order((
                    queued_jobs::created_at.asc(),
                    queued_jobs::owner_id.asc(),
                    queued_jobs::id.asc(),
                )),
                JobSort::CreatedDesc => query.order((
                    queued_jobs::created_at.desc(),
                    queued_jobs::owner_id.desc(),
                    queued_jobs::id.desc(),
                )),
                JobSort::ModifiedDesc => query.order((
                    queued_jobs::modified_at.desc(),
                    queued_jobs::id.asc(),
                )),
            };

            query.offset(offset).limit(limit).load(conn)
        })?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    /// Counts jobs matching a filter.
    pub async fn count_filtered(&self, filter: &JobFilter) -> Result<u64, QueueError> {
        let kind = self.kind.to_string();
        let filter = filter.clone();

        let count: i64 = with_connection!(self, |conn| {
            let mut query = queued_jobs::table
                .filter(queued_jobs::kind.eq(kind))
                .select(diesel::dsl::count_star())
                .into_boxed();
            apply_filter!(query, filter);
            query.first(conn)
        })?;

        Ok(count.max(0) as u64)
    }

    /// Whether a job with this key exists.
    async fn exists(&self, key: JobKey) -> Result<bool, QueueError> {
        Ok(self.find(key).await?.is_some())
    }

    /// Reads the current state of a job, failing with `NotFound` when it
    /// does not exist.
    async fn current_state(&self, key: JobKey) -> Result<JobState, QueueError> {
        Ok(self.get(key).await?.state)
    }
}
