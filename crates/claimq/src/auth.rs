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

//! Explicit caller authorization for the queue's public APIs.
//!
//! Every call through [`AuthorizedQueue`] names its [`Caller`]. System
//! callers may act on any owner; users and nodes only on jobs they own.
//! Checks are pure: they run before any storage access.

use std::fmt;

use crate::error::QueueError;
use crate::models::{Job, JobFilter, JobKey, JobResult, JobSort, JobState, Page};
use crate::queue::{JobKind, JobQueue};

/// The identity a queue operation is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    /// Internal services, schedulers and operators.
    System,
    User(i64),
    Node(i64),
}

impl Caller {
    /// The single owner this caller is confined to, if any.
    pub fn owner_id(&self) -> Option<i64> {
        match self {
            Caller::System => None,
            Caller::User(id) | Caller::Node(id) => Some(*id),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::System => write!(f, "system"),
            Caller::User(id) => write!(f, "user:{}", id),
            Caller::Node(id) => write!(f, "node:{}", id),
        }
    }
}

/// Checks that `caller` may act on jobs of `owner_id`.
pub fn authorize(caller: &Caller, owner_id: i64) -> Result<(), QueueError> {
    match caller.owner_id() {
        None => Ok(()),
        Some(own) if own == owner_id => Ok(()),
        Some(_) => Err(QueueError::Unauthorized {
            caller: caller.to_string(),
            owner_id,
        }),
    }
}

/// Narrows a query filter to what `caller` may see.
///
/// A confined caller with no owner criteria gets its own owner filled in;
/// asking for any other owner is refused.
pub fn scope_filter(caller: &Caller, filter: &JobFilter) -> Result<JobFilter, QueueError> {
    let Some(own) = caller.owner_id() else {
        return Ok(filter.clone());
    };

    if let Some(other) = filter.owner_ids.iter().find(|id| **id != own) {
        return Err(QueueError::Unauthorized {
            caller: caller.to_string(),
            owner_id: *other,
        });
    }

    let mut scoped = filter.clone();
    scoped.owner_ids = vec![own];
    Ok(scoped)
}

/// A [`JobQueue`] whose submission, acknowledgement and query APIs require
/// an explicit caller.
pub struct AuthorizedQueue<K: JobKind> {
    queue: JobQueue<K>,
}

impl<K: JobKind> Clone for AuthorizedQueue<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<K: JobKind> fmt::Debug for AuthorizedQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedQueue")
            .field("queue", &self.queue)
            .finish()
    }
}

impl<K: JobKind> AuthorizedQueue<K> {
    pub fn new(queue: JobQueue<K>) -> Self {
        Self { queue }
    }

    /// The unguarded queue, for trusted in-process use such as ticks.
    pub fn inner(&self) -> &JobQueue<K> {
        &self.queue
    }

    pub async fn submit(
        &self,
        caller: &Caller,
        owner_id: i64,
        payload: K::Payload,
    ) -> Result<Option<JobKey>, QueueError> {
        authorize(caller, owner_id)?;
        self.queue.submit(owner_id, payload).await
    }

    pub async fn acknowledge(
        &self,
        caller: &Caller,
        key: JobKey,
        expected: JobState,
        new_state: JobState,
        result: Option<JobResult>,
    ) -> Result<bool, QueueError> {
        authorize(caller, key.owner_id)?;
        self.queue
            .acknowledge(key, expected, new_state, result)
            .await
    }

    pub async fn get(&self, caller: &Caller, key: JobKey) -> Result<Job<K::Payload>, QueueError> {
        authorize(caller, key.owner_id)?;
        self.queue.get(key).await
    }

    pub async fn find(
        &self,
        caller: &Caller,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<Vec<Job<K::Payload>>, QueueError> {
        let filter = scope_filter(caller, filter)?;
        self.queue.find(&filter, sort, page).await
    }

    pub async fn count(&self, caller: &Caller, filter: &JobFilter) -> Result<u64, QueueError> {
        let filter = scope_filter(caller, filter)?;
        self.queue.count(&filter).await
    }
}
