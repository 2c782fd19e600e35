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

//! End-to-end lifecycle tests through the typed queue.

use chrono::{Duration as ChronoDuration, Utc};
use claimq::queue::{
    InstructionPayload, JobQueue, NodeInstruction, QueuePolicy,
};
use claimq::{JobResult, JobState, QueueError, StateGraph};
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::fixtures::{ping, Ping, ScriptedHandler, TestFixture};

#[tokio::test]
async fn test_submit_claim_complete_purge() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal());

    let key = queue
        .submit(42, ping("ping"))
        .await
        .expect("Submit failed")
        .expect("No hooks, so nothing vetoes");
    assert_eq!(key.owner_id, 42);

    let job = queue
        .claim_one()
        .await
        .expect("Claim failed")
        .expect("Expected the submitted job");
    assert_eq!(job.key, key);
    assert_eq!(job.state, JobState::Claimed);
    assert_eq!(job.payload, ping("ping"));

    queue
        .complete(key, JobResult::success())
        .await
        .expect("Complete failed");
    let finished = queue.get(key).await.expect("Get failed");
    assert_eq!(finished.state, JobState::Completed);
    assert_eq!(finished.result.map(|r| r.success), Some(true));

    assert!(queue.claim_one().await.expect("Claim failed").is_none());

    let now = Utc::now();
    assert_eq!(
        queue
            .purge_terminal_older_than(now - ChronoDuration::hours(1))
            .await
            .expect("Purge failed"),
        0,
        "Freshly finished jobs are too young to purge"
    );
    assert_eq!(
        queue
            .purge_terminal_older_than(now + ChronoDuration::hours(1))
            .await
            .expect("Purge failed"),
        1
    );
    assert!(matches!(
        queue.get(key).await,
        Err(QueueError::NotFound(k)) if k == key
    ));
}

#[tokio::test]
async fn test_processor_tick_completes_submitted_job() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal());
    let handler = ScriptedHandler::default();

    let key = queue
        .submit(42, ping("ping"))
        .await
        .expect("Submit failed")
        .expect("submitted");

    let report = queue
        .run_processor_tick(&handler)
        .await
        .expect("Tick failed");
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(handler.calls(), 1);

    let job = queue.get(key).await.expect("Get failed");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempt, 1);
    assert!(job.result.expect("result recorded").success);
}

#[tokio::test]
async fn test_acknowledge_is_idempotent() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal());

    let key = queue
        .submit(1, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");
    queue.begin_executing(key).await.expect("Begin failed");

    let first = JobResult::success().with_message("first report");
    let second = JobResult::failure("late duplicate");
    assert!(queue
        .acknowledge(key, JobState::Executing, JobState::Completed, Some(first.clone()))
        .await
        .expect("Ack failed"));
    assert!(!queue
        .acknowledge(key, JobState::Executing, JobState::Completed, Some(second))
        .await
        .expect("Ack failed"));

    let job = queue.get(key).await.expect("Get failed");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(first), "Only the first report is recorded");
}

#[tokio::test]
async fn test_acknowledged_terminal_jobs_always_carry_a_result() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal());

    let completed = queue
        .submit(1, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");
    assert!(queue
        .acknowledge(completed, JobState::Claimed, JobState::Completed, None)
        .await
        .expect("Ack failed"));

    let declined = queue
        .submit(2, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");
    assert!(queue
        .acknowledge(declined, JobState::Claimed, JobState::Declined, None)
        .await
        .expect("Ack failed"));

    let job = queue.get(completed).await.expect("Get failed");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(JobResult::success()));

    let job = queue.get(declined).await.expect("Get failed");
    assert_eq!(job.state, JobState::Declined);
    let result = job.result.expect("Declined jobs carry a result");
    assert!(!result.success);
}

#[tokio::test]
async fn test_concurrent_acknowledgements_have_one_winner() {
    let fixture = TestFixture::sqlite().await;
    let queue: JobQueue<Ping> = JobQueue::new(fixture.dal());
    let key = queue
        .submit(1, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");

    const ACTORS: usize = 5;
    let barrier = Arc::new(Barrier::new(ACTORS));
    let mut handles = Vec::new();
    for i in 0..ACTORS {
        let queue: JobQueue<Ping> = JobQueue::new(claimq::DAL::new(fixture.open_another()));
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            queue
                .acknowledge(
                    key,
                    JobState::Claimed,
                    JobState::Completed,
                    Some(JobResult::success().with_message(format!("actor {}", i))),
                )
                .await
                .expect("Ack failed")
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("Actor panicked") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_acknowledge_rejects_edges_outside_the_graph() {
    let fixture = TestFixture::sqlite().await;
    let policy = QueuePolicy::default().with_state_graph(StateGraph::ThreeState);
    let queue: JobQueue<Ping> = JobQueue::with_policy(fixture.dal(), policy);
    let key = queue
        .submit(1, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");

    let err = queue
        .acknowledge(key, JobState::Claimed, JobState::Executing, None)
        .await
        .expect_err("Three-state kinds have no Executing state");
    assert!(matches!(err, QueueError::InvalidTransition { .. }));

    let err = queue
        .acknowledge(key, JobState::Claimed, JobState::Queued, None)
        .await
        .expect_err("Requeueing is not an acknowledgement");
    assert!(matches!(err, QueueError::InvalidTransition { .. }));

    assert!(queue
        .acknowledge(key, JobState::Claimed, JobState::Declined, None)
        .await
        .expect("Ack failed"));
}

#[tokio::test]
async fn test_begin_executing_is_a_no_op_for_three_state_kinds() {
    let fixture = TestFixture::sqlite().await;
    let policy = QueuePolicy::default().with_state_graph(StateGraph::ThreeState);
    let queue: JobQueue<Ping> = JobQueue::with_policy(fixture.dal(), policy);
    let key = queue
        .submit(1, ping("work"))
        .await
        .expect("Submit failed")
        .expect("submitted");
    queue.claim_one().await.expect("Claim failed");

    queue.begin_executing(key).await.expect("Begin failed");
    assert_eq!(
        queue.get(key).await.expect("Get failed").state,
        JobState::Claimed
    );
}

#[tokio::test]
async fn test_builtin_kinds_share_one_store() {
    let fixture = TestFixture::sqlite().await;
    let instructions: JobQueue<NodeInstruction> = JobQueue::new(fixture.dal());
    let pings: JobQueue<Ping> = JobQueue::new(fixture.dal());

    let payload = InstructionPayload::new("SetControlParameter").with_parameter("relay", "on");
    let key = instructions
        .submit(11, payload.clone())
        .await
        .expect("Submit failed")
        .expect("submitted");
    pings
        .submit(11, ping("unrelated"))
        .await
        .expect("Submit failed");

    assert_eq!(instructions.kind(), "node_instruction");
    let job = instructions
        .claim_one()
        .await
        .expect("Claim failed")
        .expect("Instruction should be queued");
    assert_eq!(job.key, key);
    assert_eq!(job.payload, payload);

    // Claiming instructions leaves the ping job alone.
    assert!(instructions.claim_one().await.expect("Claim failed").is_none());
    assert!(pings.claim_one().await.expect("Claim failed").is_some());
}
