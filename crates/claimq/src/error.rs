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

//! Error types for queue operations.
//!
//! A compare-and-set mismatch is deliberately absent: it is reported as a
//! `false` return, not an error.

use thiserror::Error;

use crate::database::DatabaseError;
use crate::models::{JobKey, JobState};

/// Errors surfaced by the job store and the typed queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No job with this key exists for the job kind.
    #[error("Job {0} not found")]
    NotFound(JobKey),

    /// A job with this key already exists.
    #[error("Job {0} already exists")]
    Conflict(JobKey),

    /// The requested transition is not an edge of the job kind's state graph,
    /// or may not be taken through this operation.
    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    /// The caller may not act on jobs of this owner.
    #[error("Caller {caller} is not authorized for owner {owner_id}")]
    Unauthorized { caller: String, owner_id: i64 },

    /// A connection could not be obtained or the pooled call failed.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// The database rejected or failed a statement.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A payload or result could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be turned back into a job.
    #[error("Invalid stored job: {0}")]
    InvalidRecord(String),
}

impl QueueError {
    /// Whether this error means the store itself is unavailable or failing.
    ///
    /// Storage errors abort a processor tick; claims already made stay
    /// `Claimed` and are picked up by stale recovery.
    pub fn is_storage(&self) -> bool {
        matches!(self, QueueError::ConnectionPool(_) | QueueError::Database(_))
    }
}

impl From<DatabaseError> for QueueError {
    fn from(err: DatabaseError) -> Self {
        QueueError::ConnectionPool(err.to_string())
    }
}
