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

//! In-process trigger for processor and retention ticks.
//!
//! Applications that do not have their own scheduler can hand a queue and a
//! handler to a [`QueueRunner`]. It spawns `workers` processor loops that
//! compete for jobs through the store exactly like separate processes would,
//! plus one retention loop on its own interval.
//!
//! ```rust,ignore
//! let config = RunnerConfig::builder().workers(4).build();
//! let runner = QueueRunner::start(queue, Arc::new(handler), config);
//! // ...
//! runner.shutdown().await;
//! ```

mod config;

pub use config::{RunnerConfig, RunnerConfigBuilder, MIN_INTERVAL};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dispatcher::{PollingDistributor, WorkDistributor};
use crate::queue::{JobHandler, JobKind, JobQueue};

/// Background loops driving one queue.
pub struct QueueRunner {
    name: String,
    distributor: Arc<PollingDistributor>,
    shutdown_sender: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueRunner {
    /// Starts the runner's loops on the current Tokio runtime.
    pub fn start<K, H>(queue: JobQueue<K>, handler: Arc<H>, config: RunnerConfig) -> Self
    where
        K: JobKind,
        H: JobHandler<K> + 'static,
    {
        let distributor = Arc::new(config.distributor());
        Self::start_with_distributor(queue, handler, config, distributor)
    }

    /// Starts the runner with a distributor shared with the submitting side,
    /// typically through a [`NotifyOnSubmit`](crate::queue::NotifyOnSubmit)
    /// hook.
    pub fn start_with_distributor<K, H>(
        queue: JobQueue<K>,
        handler: Arc<H>,
        config: RunnerConfig,
        distributor: Arc<PollingDistributor>,
    ) -> Self
    where
        K: JobKind,
        H: JobHandler<K> + 'static,
    {
        let name = config
            .runner_name()
            .map(str::to_string)
            .unwrap_or_else(|| K::NAME.to_string());
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mut handles = Vec::with_capacity(config.workers() + 1);

        info!(
            "Starting queue runner '{}' with {} workers",
            name,
            config.workers()
        );

        for worker in 0..config.workers() {
            handles.push(tokio::spawn(run_worker(
                format!("{}-{}", name, worker),
                queue.clone(),
                handler.clone(),
                distributor.clone(),
                shutdown_receiver.clone(),
            )));
        }

        if config.enable_retention() {
            handles.push(tokio::spawn(run_retention(
                name.clone(),
                queue,
                config.retention_interval(),
                shutdown_receiver,
            )));
        }

        Self {
            name,
            distributor,
            shutdown_sender,
            handles: Mutex::new(handles),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The distributor the workers wait on.
    pub fn distributor(&self) -> Arc<PollingDistributor> {
        self.distributor.clone()
    }

    /// Stops all loops after their current tick and waits for them.
    pub async fn shutdown(&self) {
        info!("Shutting down queue runner '{}'", self.name);
        let _ = self.shutdown_sender.send(true);
        self.distributor.shutdown();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Queue runner '{}' task ended abnormally: {}", self.name, e);
            }
        }
    }
}

impl Drop for QueueRunner {
    fn drop(&mut self) {
        let _ = self.shutdown_sender.send(true);
        self.distributor.shutdown();
    }
}

async fn run_worker<K, H>(
    name: String,
    queue: JobQueue<K>,
    handler: Arc<H>,
    distributor: Arc<PollingDistributor>,
    shutdown: watch::Receiver<bool>,
) where
    K: JobKind,
    H: JobHandler<K> + 'static,
{
    debug!("Worker {} started", name);
    let full_tick = queue.policy().max_claims_per_tick;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let drained = match queue.run_processor_tick(handler.as_ref()).await {
            Ok(report) => report.claimed == 0 || report.claimed < full_tick,
            Err(e) => {
                error!("Worker {} tick failed: {}", name, e);
                true
            }
        };

        if *shutdown.borrow() {
            break;
        }
        // A full tick means there is likely more work queued.
        if drained {
            distributor.wait_for_work().await;
        }
    }

    debug!("Worker {} stopped", name);
}

async fn run_retention<K: JobKind>(
    name: String,
    queue: JobQueue<K>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match queue.run_retention_tick().await {
            Ok(report) => debug!("Retention tick for '{}': {:?}", name, report),
            Err(e) => error!("Retention tick for '{}' failed: {}", name, e),
        }
    }

    debug!("Retention loop for '{}' stopped", name);
}
