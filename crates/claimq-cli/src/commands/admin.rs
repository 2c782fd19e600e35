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

//! Implementation of the `admin purge` and `admin recover-stale` commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use claimq::queue::{self, StaleRecovery};
use claimq::JobResult;
use tracing::info;

use super::duration::parse_duration;
use super::CommandEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecoveryAction {
    Requeue,
    Decline,
}

impl From<RecoveryAction> for StaleRecovery {
    fn from(action: RecoveryAction) -> Self {
        match action {
            RecoveryAction::Requeue => StaleRecovery::Requeue,
            RecoveryAction::Decline => StaleRecovery::Decline,
        }
    }
}

/// The instant `older_than` before `now`. Ages reaching past the earliest
/// representable time select everything up to that time.
fn cutoff_before(now: DateTime<Utc>, older_than: &str) -> Result<DateTime<Utc>> {
    let age = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;
    Ok(queue::cutoff(now, age))
}

/// Run the purge command.
///
/// # Arguments
///
/// * `kinds` - Job kinds to purge; empty means all built-in kinds
/// * `older_than` - Duration string (e.g., "30d", "24h")
/// * `dry_run` - If true, only report what would be deleted
pub async fn purge(env: &CommandEnv, kinds: &[String], older_than: &str, dry_run: bool) -> Result<()> {
    let cutoff = cutoff_before(Utc::now(), older_than)?;

    info!(
        "Purging finished jobs older than {} (cutoff: {})",
        older_than, cutoff
    );

    let dal = env.dal()?;

    for kind in CommandEnv::kinds_or_builtin(kinds) {
        let store = dal.jobs(&kind);

        if dry_run {
            let count = store
                .count_terminal_older_than(cutoff)
                .await
                .with_context(|| format!("Failed to count {} jobs", kind))?;
            info!("[DRY RUN] Would delete {} {} job(s)", count, kind);
        } else {
            let deleted = store
                .purge_terminal_older_than(cutoff)
                .await
                .with_context(|| format!("Failed to purge {} jobs", kind))?;
            info!("Deleted {} {} job(s)", deleted, kind);
        }
    }

    Ok(())
}

/// Run the recover-stale command.
///
/// Without `older_than` or `action`, each kind's configured stale timeout
/// and recovery action are used.
pub async fn recover_stale(
    env: &CommandEnv,
    kinds: &[String],
    older_than: Option<&str>,
    action: Option<RecoveryAction>,
    dry_run: bool,
) -> Result<()> {
    let override_age = older_than
        .map(|s| parse_duration(s).with_context(|| format!("Invalid duration: '{}'", s)))
        .transpose()?;

    let dal = env.dal()?;
    let now = Utc::now();

    for kind in CommandEnv::kinds_or_builtin(kinds) {
        let policy = env.policy(&kind);
        let age = override_age.unwrap_or(policy.stale_timeout);
        let recovery: StaleRecovery = action.map(Into::into).unwrap_or(policy.stale_recovery);
        let cutoff = queue::cutoff(now, age);
        let store = dal.jobs(&kind);

        let result = match recovery {
            StaleRecovery::Requeue => None,
            StaleRecovery::Decline => Some(JobResult::failure(format!(
                "declined by operator: no progress within {:?}",
                age
            ))),
        };

        for state in policy.state_graph.in_flight_states() {
            if dry_run {
                let stale = store
                    .find_stale_older_than(*state, cutoff)
                    .await
                    .with_context(|| format!("Failed to find stale {} jobs", kind))?;
                for job in &stale {
                    info!(
                        "[DRY RUN] Would {} {} job {} ({} since {})",
                        recovery.as_str(),
                        kind,
                        job.key,
                        job.state,
                        job.modified
                    );
                }
            } else {
                let moved = store
                    .force_state(*state, cutoff, recovery.target_state(), result.as_ref())
                    .await
                    .with_context(|| format!("Failed to recover stale {} jobs", kind))?;
                if moved > 0 {
                    info!(
                        "Recovered {} {} job(s) stuck in {} ({})",
                        moved,
                        kind,
                        state,
                        recovery.as_str()
                    );
                }
            }
        }
    }

    Ok(())
}
