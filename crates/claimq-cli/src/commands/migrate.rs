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

//! Implementation of the `migrate` command.

use anyhow::{Context, Result};
use tracing::info;

use super::CommandEnv;

pub async fn run(env: &CommandEnv) -> Result<()> {
    let database = env.connect()?;
    info!("Running {} migrations", database.backend().as_str());

    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    info!("Migrations complete");
    Ok(())
}
