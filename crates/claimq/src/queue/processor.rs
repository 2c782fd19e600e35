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

//! The bounded processor tick.
//!
//! One tick claims up to `max_claims_per_tick` jobs, one at a time, runs the
//! kind's handler on each and records the outcome. A failing, panicking or
//! timed-out handler only affects its own job; the tick moves on to the
//! next. A storage error ends the tick: jobs it already claimed stay
//! `Claimed` until stale recovery picks them up.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::kind::JobKind;
use super::JobQueue;
use crate::dal::DAL;
use crate::error::QueueError;
use crate::models::{Job, JobKey, JobResult, JobState, StateGraph};

/// Processes claimed jobs of one kind.
#[async_trait]
pub trait JobHandler<K: JobKind>: Send + Sync {
    async fn handle(
        &self,
        job: &Job<K::Payload>,
        ctx: &HandlerContext,
    ) -> Result<JobOutcome, HandlerError>;
}

/// What a handler decided about a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The job ran; the result records whether it succeeded.
    Complete(JobResult),
    /// The job was refused and will not run.
    Decline(JobResult),
}

impl JobOutcome {
    pub fn success() -> Self {
        JobOutcome::Complete(JobResult::success())
    }

    pub fn declined(message: impl Into<String>) -> Self {
        JobOutcome::Decline(JobResult::failure(message))
    }
}

/// A failed handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Per-job context handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    dal: DAL,
    kind: &'static str,
    graph: StateGraph,
    key: JobKey,
    attempt: u32,
    max_attempts: u32,
}

impl HandlerContext {
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// Which attempt this is, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether a failure now would be final.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Moves the job from `Claimed` to `Executing` when real work starts, so
    /// stale recovery can tell a job that is running from one that never
    /// started. Does nothing under the three-state graph.
    pub async fn begin_executing(&self) -> Result<(), QueueError> {
        if !self.graph.allows_state(JobState::Executing) {
            return Ok(());
        }
        self.dal
            .jobs(self.kind)
            .update_claimed_state(self.key, self.attempt, JobState::Executing, None)
            .await
    }
}

/// Counts of what one processor tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    /// Completed with `success = true`.
    pub completed: usize,
    /// Completed with `success = false`, no attempts left.
    pub failed: usize,
    pub declined: usize,
    /// Released back to `Queued` for another attempt.
    pub retried: usize,
}

impl<K: JobKind> JobQueue<K> {
    /// Runs one processor tick with `handler`.
    ///
    /// Stops early once no job is queued. Returns `Err` only for storage
    /// errors; final handler failures are recorded on the jobs.
    pub async fn run_processor_tick<H>(&self, handler: &H) -> Result<TickReport, QueueError>
    where
        H: JobHandler<K> + ?Sized,
    {
        let mut report = TickReport::default();
        let store = self.store();

        for _ in 0..self.policy.max_claims_per_tick {
            let Some(record) = store.claim_one().await? else {
                debug!("No queued {} jobs", K::NAME);
                break;
            };
            report.claimed += 1;
            metrics::counter!("claimq_jobs_claimed_total", "kind" => K::NAME).increment(1);

            let key = record.key;
            let attempt = record.attempt;
            let job: Job<K::Payload> = match record.decode() {
                Ok(job) => job,
                Err(e) => {
                    if self.settle(self.decline_undecodable(key, &e).await)? {
                        report.declined += 1;
                    }
                    continue;
                }
            };

            let ctx = HandlerContext {
                dal: self.dal.clone(),
                kind: K::NAME,
                graph: self.policy.state_graph,
                key,
                attempt,
                max_attempts: self.policy.max_attempts,
            };

            match self.invoke(handler, &job, &ctx).await {
                Ok(JobOutcome::Complete(result)) => {
                    let success = result.success;
                    let finished = self
                        .finish(key, Some(attempt), JobState::Completed, result)
                        .await;
                    if self.settle(finished)? {
                        if success {
                            report.completed += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                }
                Ok(JobOutcome::Decline(result)) => {
                    let finished = self
                        .finish(key, Some(attempt), JobState::Declined, result)
                        .await;
                    if self.settle(finished)? {
                        report.declined += 1;
                    }
                }
                Err(err) => {
                    let result = JobResult::failure(err.to_string());
                    if attempt < self.policy.max_attempts {
                        warn!(
                            "{} job {} failed on attempt {}/{}, releasing for retry: {}",
                            K::NAME,
                            key,
                            attempt,
                            self.policy.max_attempts,
                            err
                        );
                        if store.release_for_retry(key, attempt).await? {
                            report.retried += 1;
                        } else {
                            warn!(
                                "{} job {} was moved by another actor before it could be released",
                                K::NAME,
                                key
                            );
                        }
                    } else {
                        warn!("{} job {} failed: {}", K::NAME, key, err);
                        let finished = self
                            .finish(key, Some(attempt), JobState::Completed, result)
                            .await;
                        if self.settle(finished)? {
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(
                "{} tick: claimed {}, completed {}, failed {}, declined {}, retried {}",
                K::NAME,
                report.claimed,
                report.completed,
                report.failed,
                report.declined,
                report.retried
            );
        }
        Ok(report)
    }

    /// Runs the handler, turning panics and deadline expiry into handler
    /// errors.
    async fn invoke<H>(
        &self,
        handler: &H,
        job: &Job<K::Payload>,
        ctx: &HandlerContext,
    ) -> Result<JobOutcome, HandlerError>
    where
        H: JobHandler<K> + ?Sized,
    {
        let run = AssertUnwindSafe(handler.handle(job, ctx)).catch_unwind();

        let caught = match self.policy.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(caught) => caught,
                Err(_) => return Err(HandlerError::TimedOut(limit)),
            },
            None => run.await,
        };

        caught.unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
    }

    /// Treats a lost race on the final transition as a skipped job.
    ///
    /// The job may have been moved by an external acknowledgement or by stale
    /// recovery while the handler ran; that is not a reason to abort the tick.
    fn settle(&self, outcome: Result<(), QueueError>) -> Result<bool, QueueError> {
        match outcome {
            Ok(()) => Ok(true),
            Err(QueueError::InvalidTransition { from, to }) => {
                warn!(
                    "{} job was moved by another actor ({} -> {} refused)",
                    K::NAME,
                    from,
                    to
                );
                Ok(false)
            }
            Err(QueueError::NotFound(key)) => {
                warn!("{} job {} disappeared while processing", K::NAME, key);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
