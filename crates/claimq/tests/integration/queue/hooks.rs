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

//! Tests for submission hooks.

use async_trait::async_trait;
use claimq::dal::JobDAL;
use claimq::dispatcher::{PollingDistributor, WorkDistributor};
use claimq::queue::{DeduplicateQueued, JobKind, JobQueue, NotifyOnSubmit, SubmitHook};
use claimq::{Job, JobFilter, JobState, NewJob, QueueError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::{ping, Ping, PingPayload, TestFixture};

/// Refuses jobs for owner 0 and tags every other message.
struct TagAndVeto;

#[async_trait]
impl SubmitHook<Ping> for TagAndVeto {
    async fn will_submit(
        &self,
        _store: &JobDAL<'_>,
        mut job: NewJob<PingPayload>,
    ) -> Result<Option<NewJob<PingPayload>>, QueueError> {
        if job.owner_id == 0 {
            return Ok(None);
        }
        job.payload.message = format!("[tagged] {}", job.payload.message);
        Ok(Some(job))
    }
}

/// Counts submissions and then fails.
#[derive(Default)]
struct FailingObserver {
    seen: Arc<AtomicUsize>,
}

#[async_trait]
impl<K: JobKind> SubmitHook<K> for FailingObserver {
    async fn did_submit(&self, _job: &Job<K::Payload>) -> Result<(), QueueError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::InvalidRecord("observer unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_hook_can_veto_submission() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal()).with_hook(TagAndVeto);

    let vetoed = queue
        .submit(0, ping("hello"))
        .await
        .expect("A veto is not an error");
    assert!(vetoed.is_none());
    assert_eq!(
        queue
            .count(&JobFilter::default())
            .await
            .expect("Count failed"),
        0,
        "Nothing is stored for a vetoed submission"
    );
}

#[tokio::test]
async fn test_hook_can_rewrite_submission() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal()).with_hook(TagAndVeto);

    let submitted = queue
        .submit_job(NewJob::new(5, ping("hello")))
        .await
        .expect("Submit failed")
        .expect("submitted");
    assert_eq!(submitted.payload.message, "[tagged] hello");

    let stored = queue.get(submitted.key).await.expect("Get failed");
    assert_eq!(stored.payload.message, "[tagged] hello");
    assert_eq!(stored.state, JobState::Queued);
}

#[tokio::test]
async fn test_failing_post_submit_hook_keeps_job() {
    let fixture = TestFixture::sqlite().await;
    let observer = FailingObserver::default();
    let seen = observer.seen.clone();
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal()).with_hook(observer);

    let key = queue
        .submit(1, ping("hello"))
        .await
        .expect("Post-submit failures are not reported to the submitter")
        .expect("submitted");

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(
        queue.get(key).await.expect("Get failed").state,
        JobState::Queued
    );
}

#[tokio::test]
async fn test_deduplicate_queued_suppresses_identical_payloads() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> =
        JobQueue::new(fixture.dal()).with_hook(DeduplicateQueued::<Ping>::new());

    let first = queue
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed");
    assert!(first.is_some());

    let duplicate = queue
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed");
    assert!(duplicate.is_none(), "Same owner, same payload, still queued");

    let other_owner = queue
        .submit(2, ping("sync"))
        .await
        .expect("Submit failed");
    assert!(other_owner.is_some());

    let other_payload = queue
        .submit(1, ping("sync again"))
        .await
        .expect("Submit failed");
    assert!(other_payload.is_some());

    // Once the first job is claimed the same payload may be queued again.
    queue.claim_one().await.expect("Claim failed");
    let resubmitted = queue
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed");
    assert!(resubmitted.is_some());
}

#[tokio::test]
async fn test_deduplicate_queued_tolerates_duplicates_stored_by_another_submitter() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> =
        JobQueue::new(fixture.dal()).with_hook(DeduplicateQueued::<Ping>::new());
    let unhooked: JobQueue<Ping> = JobQueue::new(claimq::DAL::new(fixture.open_another()));

    // A racing submitter stored the same payload after the check passed.
    queue
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    unhooked
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed")
        .expect("submitted");

    let filter = JobFilter::for_owner(1).with_state(JobState::Queued);
    assert_eq!(queue.count(&filter).await.expect("Count failed"), 2);

    let vetoed = queue
        .submit(1, ping("sync"))
        .await
        .expect("Submit failed");
    assert!(vetoed.is_none());
    assert_eq!(queue.count(&filter).await.expect("Count failed"), 2);

    // The stored duplicates are processed like any other job.
    assert!(queue.claim_one().await.expect("Claim failed").is_some());
    assert!(queue.claim_one().await.expect("Claim failed").is_some());
    assert_eq!(queue.count(&filter).await.expect("Count failed"), 0);
}

#[tokio::test]
async fn test_notify_on_submit_wakes_waiting_worker() {
    let fixture = TestFixture::sqlite().await;
    let distributor = Arc::new(PollingDistributor::with_poll_interval(Duration::from_secs(60)));
    let queue: JobQueue<Ping> =
        JobQueue::new(fixture.dal()).with_hook(NotifyOnSubmit::new(distributor.clone()));

    let waiter = {
        let distributor = distributor.clone();
        tokio::spawn(async move { distributor.wait_for_work().await })
    };

    queue
        .submit(1, ping("wake up"))
        .await
        .expect("Submit failed");

    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("Worker should be woken long before its poll interval")
        .expect("Waiter panicked");
}
