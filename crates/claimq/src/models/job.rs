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

//! Jobs, keys, results and the query types used to look them up.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::state::JobState;

/// Owner-scoped identifier of a job.
///
/// The owner (a user or node id) is part of every key so that jobs can always
/// be queried per owner. A key is assigned at submission and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub owner_id: i64,
    pub id: Uuid,
}

impl JobKey {
    pub fn new(owner_id: i64, id: Uuid) -> Self {
        Self { owner_id, id }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.id)
    }
}

impl FromStr for JobKey {
    type Err = String;

    /// Parses the `owner/uuid` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, id) = s
            .split_once('/')
            .ok_or_else(|| format!("job key '{}' is not of the form owner/uuid", s))?;
        let owner_id = owner
            .parse::<i64>()
            .map_err(|e| format!("invalid owner id '{}': {}", owner, e))?;
        let id = Uuid::parse_str(id).map_err(|e| format!("invalid job id '{}': {}", id, e))?;
        Ok(Self { owner_id, id })
    }
}

/// Outcome data recorded when a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A persisted unit of work.
///
/// `P` is the job kind's payload type. The store itself works with
/// [`JobRecord`], whose payload is untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P = Value> {
    pub key: JobKey,
    pub state: JobState,
    /// Set once at insert.
    pub created: DateTime<Utc>,
    /// Stamped by every state transition.
    pub modified: DateTime<Utc>,
    /// Number of times the job has been claimed.
    pub attempt: u32,
    pub payload: P,
    pub result: Option<JobResult>,
}

/// A job as the store sees it.
pub type JobRecord = Job<Value>;

impl JobRecord {
    /// Decodes the JSON payload into a job kind's payload type.
    pub fn decode<P: DeserializeOwned>(self) -> Result<Job<P>, serde_json::Error> {
        let payload = serde_json::from_value(self.payload)?;
        Ok(Job {
            key: self.key,
            state: self.state,
            created: self.created,
            modified: self.modified,
            attempt: self.attempt,
            payload,
            result: self.result,
        })
    }
}

/// A job about to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob<P = Value> {
    pub owner_id: i64,
    /// Caller-chosen entity id. Normally `None`, letting the store generate one.
    pub id: Option<Uuid>,
    pub payload: P,
}

impl<P> NewJob<P> {
    pub fn new(owner_id: i64, payload: P) -> Self {
        Self {
            owner_id,
            id: None,
            payload,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

impl<P: Serialize> NewJob<P> {
    /// Encodes the payload to JSON for the store.
    pub fn to_record(&self) -> Result<NewJob<Value>, serde_json::Error> {
        Ok(NewJob {
            owner_id: self.owner_id,
            id: self.id,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

/// Owner-scoped criteria for read-side queries.
///
/// Empty `owner_ids` or `states` means "any". `created_after` is inclusive and
/// `created_before` exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub owner_ids: Vec<i64>,
    pub states: Vec<JobState>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn for_owner(owner_id: i64) -> Self {
        Self {
            owner_ids: vec![owner_id],
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.states.push(state);
        self
    }

    pub fn created_between(mut self, after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self.created_before = Some(before);
        self
    }
}

/// Ordering of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobSort {
    #[default]
    CreatedAsc,
    CreatedDesc,
    ModifiedDesc,
}

/// Offset/limit paging of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(100)
    }
}
