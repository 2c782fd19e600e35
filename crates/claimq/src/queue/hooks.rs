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

//! Submission hooks.
//!
//! Hooks bracket [`JobQueue::submit_job`](super::JobQueue::submit_job):
//! `will_submit` runs before the job is persisted and may rewrite or veto it,
//! `did_submit` runs after it was persisted and can only observe it.
//! A queue works without any hooks.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::kind::JobKind;
use crate::dal::JobDAL;
use crate::dispatcher::PollingDistributor;
use crate::error::QueueError;
use crate::models::{Job, JobFilter, JobState, NewJob, Page};

/// Interception points around job submission.
#[async_trait]
pub trait SubmitHook<K: JobKind>: Send + Sync {
    /// Called before the job is persisted.
    ///
    /// Returning `Ok(None)` vetoes the submission: nothing is stored and the
    /// submitter receives `Ok(None)`. An error fails the submission.
    async fn will_submit(
        &self,
        _store: &JobDAL<'_>,
        job: NewJob<K::Payload>,
    ) -> Result<Option<NewJob<K::Payload>>, QueueError> {
        Ok(Some(job))
    }

    /// Called after the job was persisted.
    ///
    /// Errors are logged and otherwise ignored; the submission stands.
    async fn did_submit(&self, _job: &Job<K::Payload>) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Vetoes a submission whose payload is identical to one the same owner
/// already has waiting in `Queued`.
///
/// The check is best-effort. It reads the owner's queued jobs and the insert
/// follows in a separate statement, so submissions racing from different
/// handles can each pass the check and both be stored. Duplicates that slip
/// through are ordinary jobs; later submissions are still vetoed while any
/// of them is queued. Kinds that must never hold two identical queued jobs
/// need a uniqueness constraint in the store instead.
pub struct DeduplicateQueued<K> {
    _kind: PhantomData<fn() -> K>,
}

impl<K> DeduplicateQueued<K> {
    const SCAN_PAGE: u64 = 100;

    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<K> Default for DeduplicateQueued<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: JobKind> SubmitHook<K> for DeduplicateQueued<K> {
    async fn will_submit(
        &self,
        store: &JobDAL<'_>,
        job: NewJob<K::Payload>,
    ) -> Result<Option<NewJob<K::Payload>>, QueueError> {
        let payload = serde_json::to_value(&job.payload)?;
        let filter = JobFilter::for_owner(job.owner_id).with_state(JobState::Queued);

        let mut page = Page::first(Self::SCAN_PAGE);
        loop {
            let queued = store
                .find_filtered(&filter, Default::default(), page)
                .await?;

            if let Some(existing) = queued.iter().find(|queued| queued.payload == payload) {
                debug!(
                    "Suppressing duplicate {} job for owner {}: {} is already queued",
                    K::NAME,
                    job.owner_id,
                    existing.key
                );
                return Ok(None);
            }

            if (queued.len() as u64) < page.limit {
                return Ok(Some(job));
            }
            page.offset += page.limit;
        }
    }
}

/// Wakes local workers waiting on a [`PollingDistributor`] once a job is
/// stored, so they claim it without waiting out their poll interval.
pub struct NotifyOnSubmit {
    distributor: Arc<PollingDistributor>,
}

impl NotifyOnSubmit {
    pub fn new(distributor: Arc<PollingDistributor>) -> Self {
        Self { distributor }
    }
}

#[async_trait]
impl<K: JobKind> SubmitHook<K> for NotifyOnSubmit {
    async fn did_submit(&self, job: &Job<K::Payload>) -> Result<(), QueueError> {
        debug!("Waking workers for {} job {}", K::NAME, job.key);
        self.distributor.wake();
        Ok(())
    }
}
