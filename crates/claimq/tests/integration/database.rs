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

//! Tests for connecting and migrating.

use claimq::{BackendType, Database, JobFilter};

use crate::fixtures::TestFixture;

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let fixture = TestFixture::sqlite().await;
    let database = fixture.database();
    assert_eq!(database.backend(), BackendType::Sqlite);

    database
        .run_migrations()
        .await
        .expect("Re-running migrations should be a no-op");

    let count = fixture
        .dal()
        .jobs("ping")
        .count_filtered(&JobFilter::default())
        .await
        .expect("The job table should exist");
    assert_eq!(count, 0);
}

#[test]
fn test_unknown_url_scheme_is_rejected() {
    assert!(Database::try_new("mysql://localhost/jobs", 1).is_err());
}
