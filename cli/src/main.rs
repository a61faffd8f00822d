//! kvbulk CLI — provision tables, manage users and run bulk migrations.
//!
//! Usage:
//! ```bash
//! # Create the users table on DynamoDB Local
//! kvbulk create-table --table test-table
//!
//! # Write 5000 generated users through the bulk orchestrator
//! kvbulk migrate --count 5000
//!
//! # Serve the HTTP API on :3000
//! kvbulk serve --addr 0.0.0.0:3000
//! ```

mod logging;
mod server;
mod settings;
mod users;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use kvbulk_core::{BulkOrchestrator, ItemStore, MemoryStore, StoreChunkWriter};
use kvbulk_dynamo::{create_table, DynamoStore, TableStatus};

use crate::logging::LogConfig;
use crate::settings::{Backend, Settings};
use crate::users::{mock_users, NewUser, UserService};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    logging::init_tracing(&LogConfig::from_lookup(|key| env::var(key).ok()));

    let rest = &args[2..];
    let result = match args[1].as_str() {
        "create-table" => cmd_create_table(rest).await,
        "put" => cmd_put(rest).await,
        "get" => cmd_get(rest).await,
        "list" => cmd_list(rest).await,
        "update-email" => cmd_update_email(rest).await,
        "migrate" => cmd_migrate(rest).await,
        "serve" => cmd_serve(rest).await,
        "version" | "--version" | "-V" => {
            println!("kvbulk {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("kvbulk {}", env!("CARGO_PKG_VERSION"));
    println!("Bulk writes to DynamoDB with chunking, retries and bounded concurrency\n");
    println!("USAGE:");
    println!("    kvbulk <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    create-table  Create the users table (id/sk keys, on-demand)");
    println!("    put           Register a user (--id, --email, --name)");
    println!("    get           Fetch a user (--id)");
    println!("    list          Scan all users");
    println!("    update-email  Change a user's email (--id, --email)");
    println!("    migrate       Bulk-write generated users (--count, default 1000)");
    println!("    serve         Run the HTTP API (--addr, default {DEFAULT_ADDR})");
    println!("    version       Print version");
    println!("    help          Print this help\n");
    println!("COMMON FLAGS:");
    println!("    --table <NAME>             Table name  [env: USERS_TABLE, default: test-table]");
    println!("    --backend <memory|dynamo>  Storage backend  [default: dynamo]\n");
    println!("ENVIRONMENT:");
    println!("    AWS_REGION, DYNAMODB_ENDPOINT, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY");
    println!("    KVBULK_CHUNK_SIZE, KVBULK_CONCURRENCY, KVBULK_MAX_RETRIES");
    println!("    KVBULK_LOG (default: info), KVBULK_LOG_JSON=1");
}

async fn open_store(settings: &Settings) -> Arc<dyn ItemStore> {
    match settings.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Dynamo => Arc::new(DynamoStore::connect(&settings.dynamo).await),
    }
}

async fn user_service(args: &[String]) -> Result<(Settings, UserService)> {
    let settings = Settings::from_env(args)?;
    let store = open_store(&settings).await;
    let users = UserService::new(store, settings.table.clone());
    Ok((settings, users))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_create_table(args: &[String]) -> Result<()> {
    let settings = Settings::from_env(args)?;
    if settings.backend == Backend::Memory {
        bail!("create-table needs the dynamo backend");
    }
    let store = DynamoStore::connect(&settings.dynamo).await;
    match create_table(store.client(), &settings.table).await? {
        TableStatus::Created { arn } => {
            println!("Created table {}", settings.table);
            if let Some(arn) = arn {
                println!("  ARN: {arn}");
            }
        }
        TableStatus::AlreadyExists => println!("Table {} already exists", settings.table),
    }
    Ok(())
}

async fn cmd_put(args: &[String]) -> Result<()> {
    let user = NewUser {
        id: parse_flag(args, "--id").context("--id is required")?,
        email: parse_flag(args, "--email").context("--email is required")?,
        name: parse_flag(args, "--name").context("--name is required")?,
    };
    let (_, users) = user_service(args).await?;
    let record = users.register(&user).await?;
    print_json(&record)
}

async fn cmd_get(args: &[String]) -> Result<()> {
    let id = parse_flag(args, "--id").context("--id is required")?;
    let (_, users) = user_service(args).await?;
    let user = users
        .get(&id)
        .await?
        .ok_or_else(|| anyhow!("user {id} not found"))?;
    print_json(&user)
}

async fn cmd_list(args: &[String]) -> Result<()> {
    let (_, users) = user_service(args).await?;
    print_json(&users.list().await?)
}

async fn cmd_update_email(args: &[String]) -> Result<()> {
    let id = parse_flag(args, "--id").context("--id is required")?;
    let email = parse_flag(args, "--email").context("--email is required")?;
    let (_, users) = user_service(args).await?;
    match users.update_email(&id, &email).await? {
        Some(user) => print_json(&user),
        None => {
            println!("Updated {id}");
            Ok(())
        }
    }
}

async fn cmd_migrate(args: &[String]) -> Result<()> {
    let count = match parse_flag(args, "--count") {
        Some(n) => n.parse::<usize>().with_context(|| format!("invalid --count '{n}'"))?,
        None => server::DEFAULT_MIGRATION_COUNT,
    };
    let (settings, users) = user_service(args).await?;
    let writer = Arc::new(StoreChunkWriter::new(users.store().clone()));
    let orchestrator = BulkOrchestrator::new(writer, settings.orchestrator.clone())?;

    println!(
        "Migrating {count} users into {} via {}...",
        users.table(),
        users.store().name()
    );
    let report = orchestrator
        .submit(users.table(), mock_users(count, Utc::now()))
        .await?;

    println!("  Total:      {}", report.total_items);
    println!("  Succeeded:  {}", report.succeeded_items);
    println!("  Failed:     {}", report.failed_items);
    println!("  Chunks:     {}", report.chunks);
    println!("  Writes:     {}", report.write_attempts);
    println!("  Elapsed:    {}ms", report.elapsed_ms);
    for failure in &report.batch_errors {
        let chunk = failure
            .chunk_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        println!(
            "  [chunk {chunk}] {}: {} item(s): {}",
            failure.kind, failure.item_count, failure.error
        );
    }

    if !report.is_success() {
        bail!("{} of {} items failed", report.failed_items, report.total_items);
    }
    Ok(())
}

async fn cmd_serve(args: &[String]) -> Result<()> {
    let addr = parse_flag(args, "--addr").unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let (settings, users) = user_service(args).await?;
    let writer = Arc::new(StoreChunkWriter::new(users.store().clone()));
    let orchestrator = Arc::new(BulkOrchestrator::new(writer, settings.orchestrator.clone())?);

    let app = server::router(server::AppState {
        users,
        orchestrator,
    });
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, table = %settings.table, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
