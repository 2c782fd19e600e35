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

//! The retention tick: purging finished jobs and recovering stale ones.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::kind::{cutoff, JobKind, StaleRecovery};
use super::JobQueue;
use crate::error::QueueError;
use crate::models::JobResult;

/// Counts of what one retention tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub purged: u64,
    pub requeued: u64,
    pub declined: u64,
}

impl<K: JobKind> JobQueue<K> {
    /// Runs one retention tick at the current time.
    pub async fn run_retention_tick(&self) -> Result<RetentionReport, QueueError> {
        self.run_retention_tick_at(Utc::now()).await
    }

    /// Runs one retention tick as if the current time were `now`.
    ///
    /// Purges finished jobs older than the retention age, then recovers jobs
    /// that have been in flight longer than the stale timeout.
    pub async fn run_retention_tick_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, QueueError> {
        let purged = self
            .purge_terminal_older_than(cutoff(now, self.policy.retention_age))
            .await?;
        let recovered = self.recover_stale_at(now).await?;

        Ok(RetentionReport {
            purged,
            ..recovered
        })
    }

    /// Applies the kind's stale recovery to every in-flight job whose last
    /// transition is at least `stale_timeout` before `now`.
    pub async fn recover_stale_at(&self, now: DateTime<Utc>) -> Result<RetentionReport, QueueError> {
        let stale_cutoff = cutoff(now, self.policy.stale_timeout);
        let action = self.policy.stale_recovery;
        let result = match action {
            StaleRecovery::Requeue => None,
            StaleRecovery::Decline => Some(JobResult::failure(format!(
                "no progress within {:?}",
                self.policy.stale_timeout
            ))),
        };

        let store = self.store();
        let mut recovered = 0;
        for state in self.policy.state_graph.in_flight_states() {
            recovered += store
                .force_state(*state, stale_cutoff, action.target_state(), result.as_ref())
                .await?;
        }

        if recovered == 0 {
            return Ok(RetentionReport::default());
        }

        metrics::counter!(
            "claimq_jobs_recovered_total",
            "kind" => K::NAME,
            "action" => action.as_str()
        )
        .increment(recovered);

        match action {
            StaleRecovery::Requeue => {
                info!("Requeued {} stale {} jobs", recovered, K::NAME);
                Ok(RetentionReport {
                    requeued: recovered,
                    ..Default::default()
                })
            }
            StaleRecovery::Decline => {
                warn!("Declined {} stale {} jobs", recovered, K::NAME);
                Ok(RetentionReport {
                    declined: recovered,
                    ..Default::default()
                })
            }
        }
    }
}
