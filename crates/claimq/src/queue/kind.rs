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

//! Job kinds and their queue policies.
//!
//! Each kind of work is a zero-sized type implementing [`JobKind`]. Its
//! payload type is fixed at compile time, and its [`QueuePolicy`] decides
//! which state graph jobs follow and how failures, stale jobs and old
//! results are treated.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{JobState, StateGraph};

/// A kind of work processed through a [`JobQueue`](super::JobQueue).
pub trait JobKind: Send + Sync + 'static {
    /// Kind-specific job data, stored as JSON.
    type Payload: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static;

    /// Name stored in the `kind` column. Must be unique per kind.
    const NAME: &'static str;

    fn default_policy() -> QueuePolicy {
        QueuePolicy::default()
    }
}

/// What stale recovery does with a job stuck in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleRecovery {
    /// Put the job back in the queue to be claimed again.
    #[default]
    Requeue,
    /// Fail closed: the job is declined and never reprocessed.
    Decline,
}

impl StaleRecovery {
    pub fn target_state(&self) -> JobState {
        match self {
            StaleRecovery::Requeue => JobState::Queued,
            StaleRecovery::Decline => JobState::Declined,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StaleRecovery::Requeue => "requeue",
            StaleRecovery::Decline => "decline",
        }
    }
}

impl FromStr for StaleRecovery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requeue" => Ok(StaleRecovery::Requeue),
            "decline" => Ok(StaleRecovery::Decline),
            other => Err(format!(
                "unknown stale recovery action '{}', expected requeue or decline",
                other
            )),
        }
    }
}

/// Per-kind queue configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePolicy {
    pub state_graph: StateGraph,
    /// Total attempts a job gets. `1` means a failed job is never retried.
    pub max_attempts: u32,
    pub stale_recovery: StaleRecovery,
    /// How long a job may sit in flight without a transition before it is
    /// considered abandoned.
    pub stale_timeout: Duration,
    /// How long finished jobs are kept.
    pub retention_age: Duration,
    pub max_claims_per_tick: usize,
    /// Deadline for one handler invocation. `None` lets handlers run
    /// unbounded. No built-in kind sets one; the handler decides whether
    /// its work can be cut off at an arbitrary await point.
    pub handler_timeout: Option<Duration>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            state_graph: StateGraph::FourState,
            max_attempts: 1,
            stale_recovery: StaleRecovery::Requeue,
            stale_timeout: Duration::from_secs(60 * 60),
            retention_age: Duration::from_secs(24 * 60 * 60),
            max_claims_per_tick: 10,
            handler_timeout: None,
        }
    }
}

impl QueuePolicy {
    pub fn with_state_graph(mut self, graph: StateGraph) -> Self {
        self.state_graph = graph;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_stale_recovery(mut self, recovery: StaleRecovery) -> Self {
        self.stale_recovery = recovery;
        self
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_retention_age(mut self, age: Duration) -> Self {
        self.retention_age = age;
        self
    }

    pub fn with_max_claims_per_tick(mut self, claims: usize) -> Self {
        self.max_claims_per_tick = claims;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

/// The default policy of a built-in kind, looked up by name.
pub fn default_policy_for(name: &str) -> Option<QueuePolicy> {
    let builtins: [(&str, fn() -> QueuePolicy); 4] = [
        (NodeInstruction::NAME, NodeInstruction::default_policy),
        (DatumExportTask::NAME, DatumExportTask::default_policy),
        (DatumImportJob::NAME, DatumImportJob::default_policy),
        (UserEventTask::NAME, UserEventTask::default_policy),
    ];

    builtins
        .iter()
        .find(|(kind, _)| *kind == name)
        .map(|(_, policy)| policy())
}

/// Subtracts an age from `now`, saturating at the earliest representable
/// instant.
pub fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// An instruction to be delivered to a remote node.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeInstruction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionPayload {
    /// Instruction topic understood by the node, e.g. `SetControlParameter`.
    pub topic: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl InstructionPayload {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

impl JobKind for NodeInstruction {
    type Payload = InstructionPayload;
    const NAME: &'static str = "node_instruction";

    /// Nodes report `Executing` themselves; an instruction nobody
    /// acknowledged is not re-sent.
    fn default_policy() -> QueuePolicy {
        QueuePolicy::default()
            .with_stale_recovery(StaleRecovery::Decline)
            .with_stale_timeout(Duration::from_secs(4 * 60 * 60))
            .with_retention_age(Duration::from_secs(7 * 24 * 60 * 60))
    }
}

/// A scheduled export of datum for one export configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatumExportTask;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumExportPayload {
    pub config_id: i64,
    /// Start of the period being exported.
    pub export_date: DateTime<Utc>,
    #[serde(default)]
    pub node_ids: Vec<i64>,
}

impl JobKind for DatumExportTask {
    type Payload = DatumExportPayload;
    const NAME: &'static str = "datum_export_task";

    fn default_policy() -> QueuePolicy {
        QueuePolicy::default()
            .with_state_graph(StateGraph::ThreeState)
            .with_max_attempts(3)
            .with_stale_timeout(Duration::from_secs(2 * 60 * 60))
    }
}

/// A user-submitted import of datum from an uploaded resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatumImportJob;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumImportPayload {
    pub name: String,
    /// Location of the uploaded input data.
    pub resource: String,
    pub batch_size: u32,
    #[serde(default)]
    pub time_zone_id: Option<String>,
}

impl JobKind for DatumImportJob {
    type Payload = DatumImportPayload;
    const NAME: &'static str = "datum_import_job";

    /// Imports are not idempotent, so an abandoned one is declined.
    fn default_policy() -> QueuePolicy {
        QueuePolicy::default()
            .with_stale_recovery(StaleRecovery::Decline)
            .with_retention_age(Duration::from_secs(2 * 24 * 60 * 60))
    }
}

/// Delivery of a user event to its registered hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserEventTask;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEventPayload {
    pub hook_id: i64,
    pub topic: String,
    #[serde(default)]
    pub data: Value,
}

impl JobKind for UserEventTask {
    type Payload = UserEventPayload;
    const NAME: &'static str = "user_event_task";

    fn default_policy() -> QueuePolicy {
        QueuePolicy::default()
            .with_state_graph(StateGraph::ThreeState)
            .with_max_attempts(5)
            .with_max_claims_per_tick(50)
            .with_stale_timeout(Duration::from_secs(15 * 60))
            .with_retention_age(Duration::from_secs(6 * 60 * 60))
    }
}
