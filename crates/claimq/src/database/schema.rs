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

//! Diesel schema shared by both backends.
//!
//! Column types are restricted to ones both PostgreSQL and SQLite map the
//! same way (`Text`, `BigInt`, `Integer`, `Bool`, `Timestamp`), so a single
//! table definition serves both connection types.

diesel::table! {
    queued_jobs (id) {
        id -> Text,
        kind -> Text,
        owner_id -> BigInt,
        state -> Text,
        payload -> Text,
        attempt -> Integer,
        result_success -> Nullable<Bool>,
        result_message -> Nullable<Text>,
        result_params -> Nullable<Text>,
        created_at -> Timestamp,
        modified_at -> Timestamp,
    }
}
