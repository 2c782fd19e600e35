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

//! Configuration for the [`QueueRunner`](super::QueueRunner).

use std::time::Duration;

use crate::dispatcher::PollingDistributor;

/// Configuration for a queue runner.
///
/// # Construction
///
/// ```rust,ignore
/// let config = RunnerConfig::builder()
///     .workers(4)
///     .poll_interval(Duration::from_millis(250))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunnerConfig {
    workers: usize,
    poll_interval: Duration,
    poll_jitter: Duration,
    retention_interval: Duration,
    enable_retention: bool,
    runner_name: Option<String>,
}

impl RunnerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Number of competing processor loops.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// How long an idle worker waits before claiming again.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Upper bound of the random delay added to each poll.
    pub fn poll_jitter(&self) -> Duration {
        self.poll_jitter
    }

    /// How often the retention tick runs.
    pub fn retention_interval(&self) -> Duration {
        self.retention_interval
    }

    pub fn enable_retention(&self) -> bool {
        self.enable_retention
    }

    /// Name used in log messages, defaults to the job kind.
    pub fn runner_name(&self) -> Option<&str> {
        self.runner_name.as_deref()
    }

    /// Builds a distributor with this configuration's poll settings.
    pub fn distributor(&self) -> PollingDistributor {
        PollingDistributor::with_poll_interval(self.poll_interval).with_jitter(self.poll_jitter)
    }
}

/// Shortest poll or retention interval a runner accepts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Builder for [`RunnerConfig`].
#[derive(Debug, Clone)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl Default for RunnerConfigBuilder {
    fn default() -> Self {
        Self {
            config: RunnerConfig {
                workers: 2,
                poll_interval: Duration::from_secs(1),
                poll_jitter: Duration::from_millis(250),
                retention_interval: Duration::from_secs(300),
                enable_retention: true,
                runner_name: None,
            },
        }
    }
}

impl RunnerConfigBuilder {
    /// Sets the number of processor loops. At least one always runs.
    pub fn workers(mut self, value: usize) -> Self {
        self.config.workers = value.max(1);
        self
    }

    /// Sets the idle poll interval, clamped to [`MIN_INTERVAL`].
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value.max(MIN_INTERVAL);
        self
    }

    pub fn poll_jitter(mut self, value: Duration) -> Self {
        self.config.poll_jitter = value;
        self
    }

    /// Sets the retention interval, clamped to [`MIN_INTERVAL`].
    pub fn retention_interval(mut self, value: Duration) -> Self {
        self.config.retention_interval = value.max(MIN_INTERVAL);
        self
    }

    pub fn enable_retention(mut self, value: bool) -> Self {
        self.config.enable_retention = value;
        self
    }

    pub fn runner_name(mut self, value: Option<String>) -> Self {
        self.config.runner_name = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RunnerConfig {
        self.config
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfigBuilder::default().build()
    }
}
