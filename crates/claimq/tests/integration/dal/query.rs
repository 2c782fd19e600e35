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

//! Tests for filtered listing, ordering, paging and counting.

use chrono::Utc;
use claimq::{JobFilter, JobKey, JobSort, JobState, NewJob, Page, DAL};
use serde_json::json;
use std::time::Duration;

use crate::fixtures::TestFixture;

/// Inserts `n` jobs for `owner`, a couple of milliseconds apart.
async fn insert_jobs(dal: &DAL, owner: i64, n: usize) -> Vec<JobKey> {
    let mut keys = Vec::new();
    for i in 0..n {
        let job = dal
            .jobs("ping")
            .insert(NewJob::new(owner, json!({ "message": i })))
            .await
            .expect("Failed to insert job");
        keys.push(job.key);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    keys
}

#[tokio::test]
async fn test_find_filters_by_owner_and_state() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");

    let owner_a = insert_jobs(&dal, 1, 3).await;
    insert_jobs(&dal, 2, 2).await;

    // Claims the oldest job, which belongs to owner 1.
    let claimed = jobs
        .claim_one()
        .await
        .expect("Failed to claim")
        .expect("Expected a queued job");
    assert_eq!(claimed.key, owner_a[0]);

    let owned = jobs
        .find_filtered(&JobFilter::for_owner(1), JobSort::CreatedAsc, Page::default())
        .await
        .expect("Failed to list");
    assert_eq!(owned.iter().map(|j| j.key).collect::<Vec<_>>(), owner_a);

    let queued = jobs
        .find_filtered(
            &JobFilter::for_owner(1).with_state(JobState::Queued),
            JobSort::CreatedAsc,
            Page::default(),
        )
        .await
        .expect("Failed to list");
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|j| j.state == JobState::Queued));

    let everyone = JobFilter {
        owner_ids: vec![1, 2],
        ..Default::default()
    };
    assert_eq!(jobs.count_filtered(&everyone).await.expect("Count failed"), 5);
    assert_eq!(
        jobs.count_filtered(&JobFilter::default().with_state(JobState::Claimed))
            .await
            .expect("Count failed"),
        1
    );
}

#[tokio::test]
async fn test_find_sorts_and_pages() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");
    let keys = insert_jobs(&dal, 4, 5).await;

    let newest_first = jobs
        .find_filtered(&JobFilter::default(), JobSort::CreatedDesc, Page::default())
        .await
        .expect("Failed to list");
    let mut reversed = keys.clone();
    reversed.reverse();
    assert_eq!(
        newest_first.iter().map(|j| j.key).collect::<Vec<_>>(),
        reversed
    );

    let second_page = jobs
        .find_filtered(
            &JobFilter::default(),
            JobSort::CreatedAsc,
            Page {
                offset: 2,
                limit: 2,
            },
        )
        .await
        .expect("Failed to list");
    assert_eq!(
        second_page.iter().map(|j| j.key).collect::<Vec<_>>(),
        keys[2..4].to_vec()
    );

    let past_end = jobs
        .find_filtered(
            &JobFilter::default(),
            JobSort::CreatedAsc,
            Page {
                offset: 10,
                limit: 5,
            },
        )
        .await
        .expect("Failed to list");
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_find_sorts_by_last_modification() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");
    let keys = insert_jobs(&dal, 4, 3).await;

    // Touch the oldest job so it becomes the most recently modified.
    jobs.claim_one().await.expect("Failed to claim");

    let recent = jobs
        .find_filtered(&JobFilter::default(), JobSort::ModifiedDesc, Page::first(1))
        .await
        .expect("Failed to list");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].key, keys[0]);
}

#[tokio::test]
async fn test_find_filters_by_creation_window() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let jobs = dal.jobs("ping");

    insert_jobs(&dal, 1, 2).await;
    let after = Utc::now();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let middle = insert_jobs(&dal, 1, 2).await;
    let before = Utc::now();
    tokio::time::sleep(Duration::from_millis(2)).await;
    insert_jobs(&dal, 1, 1).await;

    let filter = JobFilter::for_owner(1).created_between(after, before);
    let window = jobs
        .find_filtered(&filter, JobSort::CreatedAsc, Page::default())
        .await
        .expect("Failed to list");
    assert_eq!(window.iter().map(|j| j.key).collect::<Vec<_>>(), middle);
    assert_eq!(jobs.count_filtered(&filter).await.expect("Count failed"), 2);
}

#[tokio::test]
async fn test_find_single_job() {
    let fixture = TestFixture::sqlite().await;
    let dal = fixture.dal();
    let keys = insert_jobs(&dal, 9, 1).await;

    let found = dal
        .jobs("ping")
        .find(keys[0])
        .await
        .expect("Find failed")
        .expect("Job should exist");
    assert_eq!(found.payload, json!({ "message": 0 }));

    // Same key under another kind does not exist.
    assert!(dal
        .jobs("other")
        .find(keys[0])
        .await
        .expect("Find failed")
        .is_none());
}
