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

//! Implementation of the `jobs list` and `jobs ack` commands.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use claimq::models::TransitionKind;
use claimq::{JobFilter, JobKey, JobRecord, JobResult, JobSort, JobState, Page};
use tracing::info;
use uuid::Uuid;

use super::CommandEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
    ModifiedDesc,
}

impl From<SortOrder> for JobSort {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::CreatedAsc => JobSort::CreatedAsc,
            SortOrder::CreatedDesc => JobSort::CreatedDesc,
            SortOrder::ModifiedDesc => JobSort::ModifiedDesc,
        }
    }
}

pub struct ListQuery {
    pub kind: String,
    pub owners: Vec<i64>,
    pub states: Vec<JobState>,
    pub sort: SortOrder,
    pub limit: u64,
    pub offset: u64,
    pub json: bool,
}

pub async fn list(env: &CommandEnv, query: &ListQuery) -> Result<()> {
    let dal = env.dal()?;
    let store = dal.jobs(&query.kind);

    let filter = JobFilter {
        owner_ids: query.owners.clone(),
        states: query.states.clone(),
        ..Default::default()
    };
    let page = Page {
        offset: query.offset,
        limit: query.limit,
    };

    let total = store
        .count_filtered(&filter)
        .await
        .context("Failed to count jobs")?;
    let jobs = store
        .find_filtered(&filter, query.sort.into(), page)
        .await
        .context("Failed to list jobs")?;

    for job in &jobs {
        if query.json {
            println!("{}", serde_json::to_string(job)?);
        } else {
            println!("{}", format_job(job));
        }
    }

    info!(
        "Showing {} of {} {} job(s)",
        jobs.len(),
        total,
        query.kind
    );
    Ok(())
}

fn format_job(job: &JobRecord) -> String {
    let outcome = match &job.result {
        Some(result) => format!(
            "{}{}",
            if result.success { "ok" } else { "failed" },
            result
                .message
                .as_deref()
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        ),
        None => "-".to_string(),
    };

    format!(
        "{}  {:<9}  attempt {}  created {}  modified {}  {}",
        job.key,
        job.state.as_str(),
        job.attempt,
        job.created.format("%Y-%m-%d %H:%M:%S"),
        job.modified.format("%Y-%m-%d %H:%M:%S"),
        outcome
    )
}

pub struct Ack {
    pub kind: String,
    pub owner: i64,
    pub id: Uuid,
    pub expected: JobState,
    pub new_state: JobState,
    pub failure: bool,
    pub message: Option<String>,
}

pub async fn ack(env: &CommandEnv, ack: &Ack) -> Result<()> {
    let graph = env.policy(&ack.kind).state_graph;
    if graph.transition(ack.expected, ack.new_state) != Some(TransitionKind::Progress) {
        return Err(anyhow!(
            "{} -> {} is not an acknowledgement the {:?} graph allows",
            ack.expected,
            ack.new_state,
            graph
        ));
    }

    let result = ack_result(ack);
    let key = JobKey::new(ack.owner, ack.id);
    let dal = env.dal()?;

    let applied = dal
        .jobs(&ack.kind)
        .compare_and_update_state(key, ack.expected, ack.new_state, result.as_ref())
        .await
        .with_context(|| format!("Failed to acknowledge job {}", key))?;

    if applied {
        info!("Job {} moved {} -> {}", key, ack.expected, ack.new_state);
    } else {
        info!(
            "Job {} is no longer {}, nothing changed",
            key, ack.expected
        );
    }
    Ok(())
}

/// Results are only recorded with terminal states.
fn ack_result(ack: &Ack) -> Option<JobResult> {
    if !ack.new_state.is_terminal() {
        return None;
    }

    let result = if ack.failure {
        JobResult::failure(ack.message.clone().unwrap_or_else(|| "failed".to_string()))
    } else {
        JobResult::success()
    };

    Some(match (&ack.message, ack.failure) {
        (Some(message), false) => result.with_message(message.clone()),
        _ => result,
    })
}
