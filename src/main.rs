//! bulk-runner - run one bulk operation against the in-memory network inventory
//!
//! Loads records (and optional seed resources) from JSON files, runs them
//! through the bulk engine, logs every engine event and prints the final
//! result as JSON.

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use netinv_bulk::storage::{NormalizeNames, RegionAllowList};
use netinv_bulk::utils::{format_duration, init_tracing};
use netinv_bulk::{
    BulkEvent, BulkOperationConfig, BulkOperationEngine, BulkOperationRequest,
    BulkOperationResult, BulkRecord, Config, InventoryAdapter, InventoryStore, OperationStatus,
    OperationType, ResourceKind,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "bulk-runner", version, about = "Run a bulk operation against an in-memory network inventory")]
struct Cli {
    /// Engine configuration file (YAML); falls back to NETINV_BULK_* variables
    #[arg(long, env = "NETINV_BULK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON array of records, either `{"id", "data"}` objects or bare payloads
    #[arg(long)]
    records: PathBuf,

    /// JSON object of resources to load first, keyed by resource type
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Resource type: vpc, subnet or gateway
    #[arg(long, default_value = "vpc")]
    resource_type: ResourceKind,

    /// Operation: create, update, delete or upsert
    #[arg(long, default_value = "create")]
    operation: OperationType,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    max_concurrent: Option<usize>,

    #[arg(long)]
    retry_attempts: Option<u32>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Undo applied mutations if the operation aborts
    #[arg(long)]
    rollback: bool,

    /// Abort on the first record that fails terminally
    #[arg(long)]
    stop_on_error: bool,

    /// Only accept records in these regions (repeatable)
    #[arg(long = "allowed-region")]
    allowed_regions: Vec<String>,

    /// Lowercase and trim resource names before writing them
    #[arg(long)]
    normalize_names: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(result) if result.status == OperationStatus::Completed => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<BulkOperationResult> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::from_env()?,
    };
    config.engine.logging.json |= cli.json_logs;
    init_tracing(config.logging())?;

    let store = Arc::new(InventoryStore::new());
    if let Some(path) = &cli.seed {
        let seeded = store
            .seed(&read_json(path).await?)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid seed file {}", path.display()))?;
        info!("Seeded {} resource(s) from {}", seeded, path.display());
    }

    let engine = BulkOperationEngine::new(config.engine.clone());
    for adapter in InventoryAdapter::for_all_kinds(&store) {
        engine.register_adapter(Arc::new(adapter));
    }

    let mut policy = operation_config(&cli, config.defaults());
    if !cli.allowed_regions.is_empty() {
        engine.register_validator(Arc::new(RegionAllowList::new(cli.allowed_regions.clone())));
        policy = policy.with_validator(RegionAllowList::NAME);
    }
    if cli.normalize_names {
        engine.register_processor(Arc::new(NormalizeNames));
        policy = policy.with_processor(NormalizeNames::NAME);
    }

    let records = parse_records(read_json(&cli.records).await?)
        .with_context(|| format!("Invalid records file {}", cli.records.display()))?;

    let events = engine.subscribe();
    let id = engine.submit(BulkOperationRequest::new(policy, records))?;
    let logger = tokio::spawn(log_events(events, id.clone()));

    let result = engine.await_result(&id).await?;
    if let Err(e) = logger.await {
        warn!("Event logger stopped: {}", e);
    }

    info!(
        "Operation {} {} in {}: {} succeeded, {} failed, {} skipped ({} {} now stored)",
        result.operation_id,
        result.status,
        format_duration(result.duration),
        result.successful_records,
        result.failed_records,
        result.skipped_records,
        store.count(cli.resource_type),
        cli.resource_type
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result)
}

fn operation_config(cli: &Cli, defaults: &BulkOperationConfig) -> BulkOperationConfig {
    let mut policy =
        BulkOperationConfig::from_template(defaults, cli.operation, cli.resource_type.as_str());

    if let Some(batch_size) = cli.batch_size {
        policy = policy.with_batch_size(batch_size);
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        policy = policy.with_max_concurrent(max_concurrent);
    }
    if let Some(retry_attempts) = cli.retry_attempts {
        policy = policy.with_retry_attempts(retry_attempts);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        policy = policy.with_timeout(std::time::Duration::from_millis(timeout_ms));
    }
    if cli.rollback {
        policy = policy.with_rollback(true);
    }
    if cli.stop_on_error {
        policy = policy.with_continue_on_error(false);
    }
    policy
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_records(value: Value) -> Result<Vec<BulkRecord>> {
    let Value::Array(items) = value else {
        anyhow::bail!("records must be a JSON array");
    };

    items
        .into_iter()
        .map(|item| -> Result<BulkRecord> {
            if item.get("data").is_some() {
                Ok(serde_json::from_value(item)?)
            } else {
                let id = item.get("id").and_then(Value::as_str).map(str::to_string);
                Ok(BulkRecord { id, data: item })
            }
        })
        .collect()
}

async fn log_events(mut events: broadcast::Receiver<BulkEvent>, operation_id: String) {
    loop {
        match events.recv().await {
            Ok(event) if event.operation_id() != operation_id => {}
            Ok(BulkEvent::Progress(progress)) => debug!(
                event = "operation:progress",
                processed = progress.processed_records,
                total = progress.total_records,
                "{:.1}% done",
                progress.progress
            ),
            Ok(event) => {
                let terminal = event.is_terminal();
                match &event {
                    BulkEvent::Failed { failure, .. } => {
                        error!(event = event.name(), code = %failure.code, "{}", failure.message)
                    }
                    BulkEvent::RollbackCompleted { info, .. } if !info.rollback_success => warn!(
                        event = event.name(),
                        "{} undo(s) failed",
                        info.rollback_errors.len()
                    ),
                    _ => info!(event = event.name(), "{}", operation_id),
                }
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event logger lagged, {} event(s) dropped", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
