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

//! Work distribution abstraction for waking queue workers.
//!
//! Workers call [`WorkDistributor::wait_for_work`] between processor ticks.
//! The polling distributor sleeps for its poll interval (plus jitter, so many
//! workers do not tick in lockstep) and can be woken early, e.g. by the
//! [`NotifyOnSubmit`](crate::queue::NotifyOnSubmit) hook after a local
//! submission.
//!
//! # Example
//!
//! ```rust,ignore
//! use claimq::dispatcher::{PollingDistributor, WorkDistributor};
//!
//! let distributor = PollingDistributor::with_poll_interval(Duration::from_secs(1));
//!
//! loop {
//!     distributor.wait_for_work().await;
//!     queue.run_processor_tick(&handler).await?;
//! }
//! ```

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Trait for abstracting how workers wait for new work.
///
/// The caller should attempt to claim work after `wait_for_work` returns,
/// handling the case where no work is actually available.
#[async_trait]
pub trait WorkDistributor: Send + Sync {
    /// Wait until work might be available, or a poll interval elapses.
    async fn wait_for_work(&self);

    /// Signals that the distributor should stop waiting and shutdown.
    ///
    /// After calling this, `wait_for_work` returns promptly.
    fn shutdown(&self);
}

/// Work distributor using periodic polling with an explicit wake signal.
///
/// Works with every backend since it needs nothing from the database.
#[derive(Debug, Clone)]
pub struct PollingDistributor {
    poll_interval: Duration,
    jitter: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PollingDistributor {
    /// Default poll interval
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self::with_poll_interval(Self::DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            jitter: Duration::ZERO,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Adds up to `jitter` of random delay to every poll.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wakes every waiting worker now.
    ///
    /// When no worker is currently waiting, the next call to `wait_for_work`
    /// returns immediately instead.
    pub fn wake(&self) {
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }
        let jitter_ms = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        self.poll_interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for PollingDistributor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkDistributor for PollingDistributor {
    async fn wait_for_work(&self) {
        // Registered before the shutdown check so a concurrent shutdown
        // cannot slip between the two.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.next_delay()) => {
                debug!("Poll interval elapsed");
            }
            _ = &mut notified => {
                debug!("Distributor woken");
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
