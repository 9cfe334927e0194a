//! Audit Chain Administration CLI
//!
//! Command-line tool for operating the audit chain: secret rotation,
//! on-demand verification, and ledger history.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use audit_chain::database::queries::Queries;
use audit_chain::database::Database;
use audit_chain::error::AuditError;
use audit_chain::secrets::SecretStore;
use audit_chain::verify::{FullVerifier, IncrementalVerifier, VerificationLedger, VerifyScope};

#[derive(Parser)]
#[command(name = "audit-admin")]
#[command(about = "Audit chain administration tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL
    #[arg(long, default_value = "sqlite://audit.db")]
    database_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate in a new hashing secret; prior versions stay usable for
    /// verifying historical entries
    RotateSecret {
        /// Secret bytes, hex encoded
        #[arg(long, conflicts_with = "generate")]
        hex: Option<String>,

        /// Generate a random 32-byte secret instead
        #[arg(long)]
        generate: bool,
    },

    /// Re-verify chains from the beginning
    VerifyFull {
        /// Restrict to one owner; default is every owner
        #[arg(long)]
        owner: Option<String>,
    },

    /// Verify entries appended since the owner's cursor
    VerifyIncremental {
        /// Owner whose chain to verify
        owner: String,
    },

    /// Show recorded verification runs
    History {
        /// Only show runs that found a problem
        #[arg(long)]
        failures_only: bool,

        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Summarize the store: owners, entry counts, current secret version
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_chain=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let database = Database::new(&cli.database_url)
        .await
        .context("Failed to open database")?;
    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;
    let pool = database.pool().clone();

    match cli.command {
        Commands::RotateSecret { hex, generate } => {
            let secret = match (hex, generate) {
                (Some(hex), _) => hex::decode(hex.trim()).context("Invalid hex secret")?,
                (None, true) => rand::random::<[u8; 32]>().to_vec(),
                (None, false) => {
                    return Err(anyhow!("Provide a secret with --hex or use --generate"));
                }
            };

            let version = SecretStore::new(pool).rotate(secret).await?;
            println!("Rotated to secret version {}", version);
        }

        Commands::VerifyFull { owner } => {
            let scope = match owner {
                Some(owner) => VerifyScope::Owner(owner),
                None => VerifyScope::All,
            };
            let run = FullVerifier::new(pool).verify_full(scope).await?;
            print_run(&run);
            if !run.intact {
                std::process::exit(1);
            }
        }

        Commands::VerifyIncremental { owner } => {
            match IncrementalVerifier::new(pool).verify_incremental(&owner).await {
                Ok(run) => {
                    print_run(&run);
                    if !run.intact {
                        std::process::exit(1);
                    }
                }
                Err(AuditError::ConcurrencyContention(owner)) => {
                    println!("Skipped: a verification run for {} is already in progress", owner);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::History {
            failures_only,
            limit,
        } => {
            let ledger = VerificationLedger::new(pool);
            let runs = if failures_only {
                ledger.failed_runs(limit).await?
            } else {
                ledger.recent_runs(limit).await?
            };

            if runs.is_empty() {
                println!("No verification runs recorded");
            }
            for run in runs {
                print_run(&run);
            }
        }

        Commands::Status => {
            let owners = Queries::owners(&pool).await?;
            let total = Queries::entry_count(&pool).await?;
            println!("Entries: {} across {} owner(s)", total, owners.len());
            for owner in &owners {
                let count = Queries::entry_count_for_owner(&pool, owner).await?;
                let cursor = Queries::cursor_for_owner(&pool, owner).await?;
                match cursor {
                    Some(cursor) => println!(
                        "  {}: {} entries, verified through {}",
                        owner, count, cursor.last_verified_created_at
                    ),
                    None => println!("  {}: {} entries, never incrementally verified", owner, count),
                }
            }
            match SecretStore::new(pool).current_version().await {
                Ok(version) => println!("Current secret version: {}", version),
                Err(_) => println!("No secret versions provisioned"),
            }
        }
    }

    Ok(())
}

fn print_run(run: &audit_chain::database::models::VerificationRun) {
    if run.intact {
        println!(
            "[{}] {} {}: intact, {}/{} entries verified",
            run.run_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_type.as_str(),
            run.owner_id.as_deref().unwrap_or("all owners"),
            run.verified_entries,
            run.total_entries_examined
        );
    } else {
        println!(
            "[{}] {} {}: BROKEN at entry {} ({}), {}/{} verified",
            run.run_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_type.as_str(),
            run.owner_id.as_deref().unwrap_or("all owners"),
            run.broken_entry_id.as_deref().unwrap_or("?"),
            run.failure.map(|f| f.as_str()).unwrap_or("unknown"),
            run.verified_entries,
            run.total_entries_examined
        );
        if let (Some(expected), Some(actual)) = (&run.expected_hash, &run.actual_hash) {
            println!("    expected: {}", expected);
            println!("    actual:   {}", actual);
        }
    }
}
