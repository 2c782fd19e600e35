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

//! Job lifecycle states and the transition graph every job kind follows.
//!
//! ```text
//!            claim              progress                progress
//! Queued ----------> Claimed ------------> Executing -------------> Completed | Declined
//!    ^                  |  \________________________________________^
//!    |   retry/recovery |                  |
//!    +------------------+------------------+
//! ```
//!
//! Job kinds that have no separate "running" phase use
//! [`StateGraph::ThreeState`], in which `Executing` never occurs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Persisted and waiting to be claimed.
    Queued,
    /// Exclusively held by one worker.
    Claimed,
    /// The handler has started real work.
    Executing,
    /// Processing finished; see the result for success.
    Completed,
    /// Processing was refused or abandoned.
    Declined,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Queued,
        JobState::Claimed,
        JobState::Executing,
        JobState::Completed,
        JobState::Declined,
    ];

    pub const TERMINAL: [JobState; 2] = [JobState::Completed, JobState::Declined];

    pub const IN_FLIGHT: [JobState; 2] = [JobState::Claimed, JobState::Executing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Claimed => "Claimed",
            JobState::Executing => "Executing",
            JobState::Completed => "Completed",
            JobState::Declined => "Declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Declined)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobState::Claimed | JobState::Executing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state '{0}'")]
pub struct UnknownJobState(pub String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    /// Parses a state name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownJobState(s.to_string()))
    }
}

/// Which code path an edge of the state graph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// `Queued -> Claimed`, only through the atomic claim.
    Claim,
    /// Forward progress of a claimed job, by the processor or an external
    /// compare-and-set caller.
    Progress,
    /// An in-flight job handed back to the queue, either after a failed
    /// attempt the retry policy allows or by stale recovery.
    Release,
}

/// Shape of the lifecycle a job kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateGraph {
    /// `Queued -> Claimed -> Completed | Declined`.
    ThreeState,
    /// `Queued -> Claimed -> Executing -> Completed | Declined`.
    #[default]
    FourState,
}

impl StateGraph {
    /// Returns the kind of the edge `from -> to`, or `None` when the graph has
    /// no such edge.
    pub fn transition(&self, from: JobState, to: JobState) -> Option<TransitionKind> {
        use JobState::*;

        if !self.allows_state(from) || !self.allows_state(to) {
            return None;
        }

        match (from, to) {
            (Queued, Claimed) => Some(TransitionKind::Claim),
            (Claimed, Executing) => Some(TransitionKind::Progress),
            (Claimed | Executing, Completed | Declined) => Some(TransitionKind::Progress),
            (Claimed | Executing, Queued) => Some(TransitionKind::Release),
            _ => None,
        }
    }

    /// Whether `state` can occur at all in this graph.
    pub fn allows_state(&self, state: JobState) -> bool {
        !(matches!(self, StateGraph::ThreeState) && state == JobState::Executing)
    }

    /// The in-flight states jobs of this graph can be stuck in.
    pub fn in_flight_states(&self) -> &'static [JobState] {
        match self {
            StateGraph::ThreeState => &[JobState::Claimed],
            StateGraph::FourState => &JobState::IN_FLIGHT,
        }
    }
}

impl FromStr for StateGraph {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "three_state" | "3" => Ok(StateGraph::ThreeState),
            "four_state" | "4" => Ok(StateGraph::FourState),
            other => Err(format!(
                "unknown state graph '{}', expected three_state or four_state",
                other
            )),
        }
    }
}
