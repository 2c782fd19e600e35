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

//! claimq CLI - administration of claim-based job queues.

use anyhow::Result;
use clap::{Parser, Subcommand};
use claimq::JobState;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod commands;

use commands::admin::RecoveryAction;
use commands::jobs::SortOrder;

/// claimq - persistent job queues with exclusive claiming
#[derive(Parser)]
#[command(name = "claimq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Configuration file (defaults to CLAIMQ_CONFIG or the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Inspect and acknowledge jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Maintenance of the job store
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum JobsCommands {
    /// List jobs of one kind
    List {
        /// Job kind, e.g. "node_instruction"
        #[arg(long)]
        kind: String,

        /// Only jobs of these owners
        #[arg(long = "owner")]
        owners: Vec<i64>,

        /// Only jobs in these states
        #[arg(long = "state")]
        states: Vec<JobState>,

        #[arg(long, value_enum, default_value_t = SortOrder::CreatedAsc)]
        sort: SortOrder,

        #[arg(long, default_value_t = 50)]
        limit: u64,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Print one JSON object per job
        #[arg(long)]
        json: bool,
    },
    /// Move a job from an expected state to a new one, if it is still there
    Ack {
        #[arg(long)]
        kind: String,

        #[arg(long)]
        owner: i64,

        #[arg(long)]
        id: Uuid,

        #[arg(long)]
        expected: JobState,

        #[arg(long = "new")]
        new_state: JobState,

        /// Record the outcome as failed (only for terminal states)
        #[arg(long)]
        failure: bool,

        /// Message recorded with the outcome
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Delete finished jobs older than a duration
    Purge {
        /// Job kinds to purge (defaults to all built-in kinds)
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Delete jobs finished longer ago than this (e.g., "30d", "24h", "1h30m")
        #[arg(long, default_value = "24h")]
        older_than: String,

        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Requeue or decline jobs stuck in flight
    RecoverStale {
        /// Job kinds to recover (defaults to all built-in kinds)
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Jobs without a transition for this long are stale (defaults to
        /// each kind's stale timeout)
        #[arg(long)]
        older_than: Option<String>,

        /// What to do with stale jobs (defaults to each kind's policy)
        #[arg(long, value_enum)]
        action: Option<RecoveryAction>,

        /// Preview what would be recovered without changing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let env = commands::CommandEnv::load(cli.database_url, cli.config.as_deref())?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&env).await?,
        Commands::Jobs { command } => match command {
            JobsCommands::List {
                kind,
                owners,
                states,
                sort,
                limit,
                offset,
                json,
            } => {
                let query = commands::jobs::ListQuery {
                    kind,
                    owners,
                    states,
                    sort,
                    limit,
                    offset,
                    json,
                };
                commands::jobs::list(&env, &query).await?;
            }
            JobsCommands::Ack {
                kind,
                owner,
                id,
                expected,
                new_state,
                failure,
                message,
            } => {
                let ack = commands::jobs::Ack {
                    kind,
                    owner,
                    id,
                    expected,
                    new_state,
                    failure,
                    message,
                };
                commands::jobs::ack(&env, &ack).await?;
            }
        },
        Commands::Admin { command } => match command {
            AdminCommands::Purge {
                kinds,
                older_than,
                dry_run,
            } => {
                commands::admin::purge(&env, &kinds, &older_than, dry_run).await?;
            }
            AdminCommands::RecoverStale {
                kinds,
                older_than,
                action,
                dry_run,
            } => {
                commands::admin::recover_stale(&env, &kinds, older_than.as_deref(), action, dry_run)
                    .await?;
            }
        },
    }

    Ok(())
}
