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

//! File-based configuration.
//!
//! A TOML file configures the database, the in-process runner and per-kind
//! policy overrides:
//!
//! ```toml
//! [database]
//! url = "${DATABASE_URL:-sqlite://claimq.db}"
//! pool_size = 10
//!
//! [runner]
//! workers = 4
//! poll_interval_ms = 500
//!
//! [kinds.datum_export_task]
//! max_attempts = 5
//! stale_recovery = "decline"
//! ```
//!
//! Fields left out keep their defaults; kind sections only override what
//! they name on top of the kind's default policy.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{substitute_env_vars, ConfigLoader, CONFIG_ENV_VAR};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::StateGraph;
use crate::queue::{JobKind, QueuePolicy, StaleRecovery};
use crate::runner::RunnerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub database: DatabaseSection,
    pub runner: RunnerSection,
    /// Policy overrides keyed by job kind name.
    pub kinds: BTreeMap<String, KindSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub pool_size: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSection {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub poll_jitter_ms: u64,
    pub retention_interval_secs: u64,
    pub enable_retention: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        let defaults = RunnerConfig::default();
        Self {
            workers: defaults.workers(),
            poll_interval_ms: defaults.poll_interval().as_millis() as u64,
            poll_jitter_ms: defaults.poll_jitter().as_millis() as u64,
            retention_interval_secs: defaults.retention_interval().as_secs(),
            enable_retention: defaults.enable_retention(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindSection {
    pub state_graph: Option<StateGraph>,
    pub max_attempts: Option<u32>,
    pub stale_recovery: Option<StaleRecovery>,
    pub stale_timeout_secs: Option<u64>,
    pub retention_age_secs: Option<u64>,
    pub max_claims_per_tick: Option<usize>,
    pub handler_timeout_secs: Option<u64>,
}

impl KindSection {
    /// Applies the overrides of this section on top of `base`.
    pub fn apply(&self, base: QueuePolicy) -> QueuePolicy {
        let mut policy = base;
        if let Some(graph) = self.state_graph {
            policy = policy.with_state_graph(graph);
        }
        if let Some(attempts) = self.max_attempts {
            policy = policy.with_max_attempts(attempts);
        }
        if let Some(recovery) = self.stale_recovery {
            policy = policy.with_stale_recovery(recovery);
        }
        if let Some(secs) = self.stale_timeout_secs {
            policy = policy.with_stale_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.retention_age_secs {
            policy = policy.with_retention_age(Duration::from_secs(secs));
        }
        if let Some(claims) = self.max_claims_per_tick {
            policy = policy.with_max_claims_per_tick(claims);
        }
        if let Some(secs) = self.handler_timeout_secs {
            policy = policy.with_handler_timeout(Duration::from_secs(secs));
        }
        policy
    }
}

impl QueueConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The policy for a kind: its default policy with this file's overrides.
    pub fn policy_for<K: JobKind>(&self) -> QueuePolicy {
        self.policy_for_name(K::NAME, K::default_policy())
    }

    /// The policy for a kind known only by name.
    pub fn policy_for_name(&self, name: &str, base: QueuePolicy) -> QueuePolicy {
        match self.kinds.get(name) {
            Some(section) => section.apply(base),
            None => base,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::builder()
            .workers(self.runner.workers)
            .poll_interval(Duration::from_millis(self.runner.poll_interval_ms))
            .poll_jitter(Duration::from_millis(self.runner.poll_jitter_ms))
            .retention_interval(Duration::from_secs(self.runner.retention_interval_secs))
            .enable_retention(self.runner.enable_retention)
            .build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.database.pool_size) {
            return Err(ConfigError::InvalidPoolSize {
                size: self.database.pool_size,
            });
        }
        if self.runner.workers == 0 {
            return Err(ConfigError::InvalidRunner {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.runner.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidRunner {
                field: "poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.runner.retention_interval_secs == 0 {
            return Err(ConfigError::InvalidRunner {
                field: "retention_interval_secs",
                reason: "must be positive".to_string(),
            });
        }
        for (name, section) in &self.kinds {
            let invalid = |field, reason: &str| ConfigError::InvalidKind {
                kind: name.clone(),
                field,
                reason: reason.to_string(),
            };
            if section.max_attempts == Some(0) {
                return Err(invalid("max_attempts", "must be at least 1"));
            }
            if section.max_claims_per_tick == Some(0) {
                return Err(invalid("max_claims_per_tick", "must be at least 1"));
            }
        }
        Ok(())
    }
}
