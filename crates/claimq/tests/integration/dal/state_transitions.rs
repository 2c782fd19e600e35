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

//! Tests for state updates, compare-and-set and retry release.

use chrono::Utc;
use claimq::{JobKey, JobRecord, JobResult, JobState, NewJob, QueueError, DAL};
use serde_json::json;
use uuid::Uuid;

use crate::fixtures::TestFixture;

async fn claimed_job(dal: &DAL) -> JobRecord {
    let jobs = dal.jobs("ping");
    jobs.insert(NewJob::new(1, json!({ "message": "hi" })))
        .await
        .expect("Failed to insert job");
    jobs.claim_one()
        .await
        .expect("Failed to claim")
        .expect("Expected a queued job")
}

#[tokio::test]
async fn test_update_state_moves_in_flight_job() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let job = claimed_job(&dal).await;
    let jobs = dal.jobs("ping");

    jobs.update_state(job.key, JobState::Executing, None)
        .await
        .expect("Claimed -> Executing should succeed");
    let result = JobResult::success().with_parameter("rows", 12);
    jobs.update_state(job.key, JobState::Completed, Some(&result))
        .await
        .expect("Executing -> Completed should succeed");

    let stored = jobs.get(job.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.result, Some(result));
    assert!(stored.modified >= job.modified);
}

#[tokio::test]
async fn test_update_state_rejects_finished_job() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let job = claimed_job(&dal).await;
    let jobs = dal.jobs("ping");

    jobs.update_state(job.key, JobState::Declined, Some(&JobResult::failure("no")))
        .await
        .expect("Claimed -> Declined should succeed");

    let err = jobs
        .update_state(job.key, JobState::Completed, Some(&JobResult::success()))
        .await
        .expect_err("A finished job must not change state");
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: JobState::Declined,
            to: JobState::Completed
        }
    ));
}

#[tokio::test]
async fn test_update_state_rejects_claim_and_requeue_targets() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");
    let queued = jobs
        .insert(NewJob::new(1, json!({})))
        .await
        .expect("Failed to insert job");

    let err = jobs
        .update_state(queued.key, JobState::Claimed, None)
        .await
        .expect_err("Claiming goes through claim_one only");
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: JobState::Queued,
            to: JobState::Claimed
        }
    ));

    let err = jobs
        .update_state(queued.key, JobState::Completed, None)
        .await
        .expect_err("A queued job cannot finish");
    assert!(matches!(err, QueueError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_update_state_missing_job_is_not_found() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let key = JobKey::new(1, Uuid::new_v4());

    let err = dal
        .jobs("ping")
        .update_state(key, JobState::Completed, None)
        .await
        .expect_err("Missing job");
    assert!(matches!(err, QueueError::NotFound(k) if k == key));
}

#[tokio::test]
async fn test_compare_and_update_is_idempotent() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let job = claimed_job(&dal).await;
    let jobs = dal.jobs("ping");

    let first = jobs
        .compare_and_update_state(job.key, JobState::Claimed, JobState::Executing, None)
        .await
        .expect("CAS failed");
    let second = jobs
        .compare_and_update_state(job.key, JobState::Claimed, JobState::Executing, None)
        .await
        .expect("CAS failed");

    assert!(first, "First acknowledgement wins");
    assert!(!second, "Duplicate acknowledgement is a no-op");

    let stored = jobs.get(job.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Executing);
}

#[tokio::test]
async fn test_compare_and_update_missing_job_is_not_found() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let key = JobKey::new(3, Uuid::new_v4());

    let err = dal
        .jobs("ping")
        .compare_and_update_state(key, JobState::Claimed, JobState::Executing, None)
        .await
        .expect_err("Missing job");
    assert!(matches!(err, QueueError::NotFound(_)));
}

#[tokio::test]
async fn test_compare_and_update_refuses_claim_edge() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");
    let queued = jobs
        .insert(NewJob::new(1, json!({})))
        .await
        .expect("Failed to insert job");

    let err = jobs
        .compare_and_update_state(queued.key, JobState::Queued, JobState::Claimed, None)
        .await
        .expect_err("Claim edge is reserved for claim_one");
    assert!(matches!(err, QueueError::InvalidTransition { .. }));

    let stored = jobs.get(queued.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Queued);
}

#[tokio::test]
async fn test_release_for_retry_requeues_and_keeps_attempt() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let job = claimed_job(&dal).await;
    let jobs = dal.jobs("ping");

    jobs.update_state(job.key, JobState::Executing, Some(&JobResult::failure("partial")))
        .await
        .expect("Claimed -> Executing should succeed");
    assert!(jobs
        .release_for_retry(job.key, job.attempt)
        .await
        .expect("Release failed"));

    let stored = jobs.get(job.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Queued);
    assert_eq!(stored.attempt, 1);
    assert_eq!(stored.result, None);

    let reclaimed = jobs
        .claim_one()
        .await
        .expect("Failed to claim")
        .expect("Released job should be claimable");
    assert_eq!(reclaimed.key, job.key);
    assert_eq!(reclaimed.attempt, 2);
    assert_eq!(reclaimed.result, None);

    // Once finished it can no longer be released.
    jobs.update_state(job.key, JobState::Completed, Some(&JobResult::success()))
        .await
        .expect("Failed to complete");
    assert!(!jobs
        .release_for_retry(job.key, reclaimed.attempt)
        .await
        .expect("Release failed"));
}

#[tokio::test]
async fn test_terminal_transitions_default_the_result() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");

    let completed = claimed_job(&dal).await;
    jobs.update_state(completed.key, JobState::Completed, None)
        .await
        .expect("Failed to complete");
    let stored = jobs.get(completed.key).await.expect("Failed to get job");
    assert_eq!(stored.result, Some(JobResult::success()));

    let declined = claimed_job(&dal).await;
    assert!(jobs
        .compare_and_update_state(declined.key, JobState::Claimed, JobState::Declined, None)
        .await
        .expect("Compare-and-set failed"));
    let stored = jobs.get(declined.key).await.expect("Failed to get job");
    assert_eq!(stored.result, Some(JobResult::failure("declined")));
}

#[tokio::test]
async fn test_claimed_updates_are_fenced_on_attempt() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let first = claimed_job(&dal).await;
    let jobs = dal.jobs("ping");
    assert_eq!(first.attempt, 1);

    // Recovered and claimed again while the first claimant still runs.
    let moved = jobs
        .force_state(JobState::Claimed, Utc::now(), JobState::Queued, None)
        .await
        .expect("Failed to force state");
    assert_eq!(moved, 1);
    let second = jobs
        .claim_one()
        .await
        .expect("Failed to claim")
        .expect("Recovered job should be claimable");
    assert_eq!(second.attempt, 2);

    let err = jobs
        .update_claimed_state(first.key, first.attempt, JobState::Executing, None)
        .await
        .expect_err("Old claimant must not move the job");
    assert!(matches!(
        err,
        QueueError::InvalidTransition {
            from: JobState::Claimed,
            to: JobState::Executing
        }
    ));
    let err = jobs
        .update_claimed_state(
            first.key,
            first.attempt,
            JobState::Completed,
            Some(&JobResult::success()),
        )
        .await
        .expect_err("Old claimant must not finish the job");
    assert!(matches!(err, QueueError::InvalidTransition { .. }));
    assert!(!jobs
        .release_for_retry(first.key, first.attempt)
        .await
        .expect("Release failed"));

    let stored = jobs.get(first.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Claimed);
    assert_eq!(stored.attempt, 2);

    jobs.update_claimed_state(
        second.key,
        second.attempt,
        JobState::Completed,
        Some(&JobResult::success()),
    )
    .await
    .expect("Current claimant should finish the job");
    let stored = jobs.get(first.key).await.expect("Failed to get job");
    assert_eq!(stored.state, JobState::Completed);
}

#[tokio::test]
async fn test_insert_duplicate_key_conflicts() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");
    let id = Uuid::new_v4();

    jobs.insert(NewJob::new(5, json!({})).with_id(id))
        .await
        .expect("Failed to insert job");
    let err = jobs
        .insert(NewJob::new(5, json!({})).with_id(id))
        .await
        .expect_err("Same key twice");
    assert!(matches!(err, QueueError::Conflict(k) if k == JobKey::new(5, id)));
}
