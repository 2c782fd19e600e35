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

//! The typed job queue engine.
//!
//! A [`JobQueue<K>`] is the single generic engine behind every job kind. It
//! layers the kind's [`QueuePolicy`] (state graph, retry, recovery and
//! retention) over the job store, and exposes the submission,
//! acknowledgement, query and tick APIs.
//!
//! # Example
//!
//! ```rust,ignore
//! use claimq::queue::{JobQueue, NodeInstruction, InstructionPayload};
//!
//! let queue = JobQueue::<NodeInstruction>::new(dal);
//! let key = queue
//!     .submit(42, InstructionPayload::new("SetControlParameter"))
//!     .await?;
//!
//! // On a worker, once per tick:
//! let report = queue.run_processor_tick(&handler).await?;
//! ```

mod hooks;
mod kind;
mod processor;
mod retention;

pub use hooks::{DeduplicateQueued, NotifyOnSubmit, SubmitHook};
pub use kind::{
    cutoff, default_policy_for, DatumExportPayload, DatumExportTask, DatumImportJob, DatumImportPayload,
    InstructionPayload, JobKind, NodeInstruction, QueuePolicy, StaleRecovery, UserEventPayload,
    UserEventTask,
};
pub use processor::{HandlerContext, HandlerError, JobHandler, JobOutcome, TickReport};
pub use retention::RetentionReport;

use chrono::{DateTime, Utc};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dal::{JobDAL, DAL};
use crate::error::QueueError;
use crate::models::{
    Job, JobFilter, JobKey, JobRecord, JobResult, JobSort, JobState, NewJob, Page, TransitionKind,
};

/// A claim-based persistent queue for one job kind.
///
/// Cloning is cheap; clones share the connection pool and hooks.
pub struct JobQueue<K: JobKind> {
    dal: DAL,
    policy: QueuePolicy,
    hooks: Vec<Arc<dyn SubmitHook<K>>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: JobKind> Clone for JobQueue<K> {
    fn clone(&self) -> Self {
        Self {
            dal: self.dal.clone(),
            policy: self.policy.clone(),
            hooks: self.hooks.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: JobKind> fmt::Debug for JobQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("kind", &K::NAME)
            .field("policy", &self.policy)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl<K: JobKind> JobQueue<K> {
    /// Creates a queue using the kind's default policy.
    pub fn new(dal: DAL) -> Self {
        Self::with_policy(dal, K::default_policy())
    }

    pub fn with_policy(dal: DAL, policy: QueuePolicy) -> Self {
        Self {
            dal,
            policy,
            hooks: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Registers a submission hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl SubmitHook<K> + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn kind(&self) -> &'static str {
        K::NAME
    }

    pub(crate) fn store(&self) -> JobDAL<'_> {
        self.dal.jobs(K::NAME)
    }

    /// Submits a payload for an owner, returning the new job's key.
    ///
    /// Returns `Ok(None)` when a hook vetoed the submission.
    pub async fn submit(
        &self,
        owner_id: i64,
        payload: K::Payload,
    ) -> Result<Option<JobKey>, QueueError> {
        Ok(self
            .submit_job(NewJob::new(owner_id, payload))
            .await?
            .map(|job| job.key))
    }

    /// Submits a job through the registered hooks and stores it as `Queued`.
    pub async fn submit_job(
        &self,
        job: NewJob<K::Payload>,
    ) -> Result<Option<Job<K::Payload>>, QueueError> {
        let store = self.store();

        let mut job = job;
        for hook in &self.hooks {
            match hook.will_submit(&store, job).await? {
                Some(rewritten) => job = rewritten,
                None => {
                    metrics::counter!("claimq_jobs_vetoed_total", "kind" => K::NAME).increment(1);
                    debug!("{} submission vetoed by hook", K::NAME);
                    return Ok(None);
                }
            }
        }

        let record = store.insert(job.to_record()?).await?;
        let key = record.key;
        let submitted = Job {
            key,
            state: record.state,
            created: record.created,
            modified: record.modified,
            attempt: record.attempt,
            payload: job.payload,
            result: None,
        };

        metrics::counter!("claimq_jobs_submitted_total", "kind" => K::NAME).increment(1);
        info!("Submitted {} job {}", K::NAME, key);

        for hook in &self.hooks {
            if let Err(e) = hook.did_submit(&submitted).await {
                warn!("Post-submit hook failed for {} job {}: {}", K::NAME, key, e);
            }
        }

        Ok(Some(submitted))
    }

    /// Fetches a job by key.
    pub async fn get(&self, key: JobKey) -> Result<Job<K::Payload>, QueueError> {
        Ok(self.store().get(key).await?.decode()?)
    }

    /// Fetches a job by key without decoding its payload.
    pub async fn get_record(&self, key: JobKey) -> Result<JobRecord, QueueError> {
        self.store().get(key).await
    }

    /// Lists jobs matching a filter.
    pub async fn find(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<Vec<Job<K::Payload>>, QueueError> {
        self.store()
            .find_filtered(filter, sort, page)
            .await?
            .into_iter()
            .map(|record| record.decode().map_err(QueueError::from))
            .collect()
    }

    pub async fn count(&self, filter: &JobFilter) -> Result<u64, QueueError> {
        self.store().count_filtered(filter).await
    }

    /// Claims the oldest queued job.
    ///
    /// A claimed job whose payload no longer decodes is declined and its
    /// decode error returned.
    pub async fn claim_one(&self) -> Result<Option<Job<K::Payload>>, QueueError> {
        let Some(record) = self.store().claim_one().await? else {
            return Ok(None);
        };
        metrics::counter!("claimq_jobs_claimed_total", "kind" => K::NAME).increment(1);

        let key = record.key;
        match record.decode() {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                self.decline_undecodable(key, &e).await?;
                Err(e.into())
            }
        }
    }

    /// Marks a claimed job as actually running.
    ///
    /// Does nothing for kinds using the three-state graph.
    pub async fn begin_executing(&self, key: JobKey) -> Result<(), QueueError> {
        if !self.policy.state_graph.allows_state(JobState::Executing) {
            return Ok(());
        }
        self.store()
            .update_state(key, JobState::Executing, None)
            .await
    }

    /// Finishes an in-flight job as `Completed` with the given result.
    pub async fn complete(&self, key: JobKey, result: JobResult) -> Result<(), QueueError> {
        self.finish(key, None, JobState::Completed, result).await
    }

    /// Finishes an in-flight job as `Declined`.
    pub async fn decline(&self, key: JobKey, result: JobResult) -> Result<(), QueueError> {
        self.finish(key, None, JobState::Declined, result).await
    }

    /// Records a terminal outcome, only while the job is still on `attempt`
    /// when one is given.
    pub(crate) async fn finish(
        &self,
        key: JobKey,
        attempt: Option<u32>,
        state: JobState,
        result: JobResult,
    ) -> Result<(), QueueError> {
        let store = self.store();
        match attempt {
            Some(attempt) => {
                store
                    .update_claimed_state(key, attempt, state, Some(&result))
                    .await?
            }
            None => store.update_state(key, state, Some(&result)).await?,
        }

        let outcome = match state {
            JobState::Declined => "declined",
            _ if result.success => "success",
            _ => "failure",
        };
        metrics::counter!("claimq_jobs_finished_total", "kind" => K::NAME, "outcome" => outcome)
            .increment(1);
        Ok(())
    }

    /// Moves a job from `expected` to `new_state` if it is still in
    /// `expected`, for external, possibly duplicated, progress reports.
    ///
    /// Returns `Ok(false)` when the job has already moved on. Only forward
    /// edges of the kind's state graph are accepted.
    pub async fn acknowledge(
        &self,
        key: JobKey,
        expected: JobState,
        new_state: JobState,
        result: Option<JobResult>,
    ) -> Result<bool, QueueError> {
        match self.policy.state_graph.transition(expected, new_state) {
            Some(TransitionKind::Progress) => {}
            _ => {
                return Err(QueueError::InvalidTransition {
                    from: expected,
                    to: new_state,
                })
            }
        }

        let applied = self
            .store()
            .compare_and_update_state(key, expected, new_state, result.as_ref())
            .await?;

        if applied && new_state.is_terminal() {
            let outcome = match (new_state, &result) {
                (JobState::Declined, _) => "declined",
                (_, Some(r)) if !r.success => "failure",
                _ => "success",
            };
            metrics::counter!("claimq_jobs_finished_total", "kind" => K::NAME, "outcome" => outcome)
                .increment(1);
        }
        Ok(applied)
    }

    /// Deletes finished jobs last modified before `cutoff`.
    pub async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let purged = self.store().purge_terminal_older_than(cutoff).await?;
        metrics::counter!("claimq_jobs_purged_total", "kind" => K::NAME).increment(purged);
        Ok(purged)
    }

    async fn decline_undecodable(
        &self,
        key: JobKey,
        error: &serde_json::Error,
    ) -> Result<(), QueueError> {
        warn!(
            "Declining {} job {}: payload could not be decoded: {}",
            K::NAME,
            key,
            error
        );
        let result = JobResult::failure(format!("payload could not be decoded: {}", error));
        self.decline(key, result).await
    }
}
