//! Batchward job worker runtime.

#![forbid(unsafe_code)]

mod import_transform;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use batchward_application::{
    BatchExecutedEvent, ContentStore, JobRunnerService, LeaseLockManager,
};
use batchward_core::{AppError, AppResult, JobId};
use batchward_domain::{JobDefinition, JobRunStatus, PartitionConfig};
use batchward_infrastructure::{
    ChannelBatchEventPublisher, FileSystemContentStore, JsonFileDataSource, RedisContentStore,
    TracingMessageSink, TracingProgressSink,
};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::import_transform::ImportTransform;

#[derive(Debug, Clone)]
struct WorkerConfig {
    job_id: JobId,
    source_path: PathBuf,
    entity_name: String,
    required_fields: Vec<String>,
    lease_dir: PathBuf,
    redis_url: Option<String>,
    lease_key_prefix: String,
    lease_seconds: u32,
    holder_id: String,
    partition: PartitionConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let lease_store = build_lease_store(&config)?;
    let lease_manager = Arc::new(
        LeaseLockManager::new(lease_store, config.holder_id.as_str(), config.lease_seconds)?
            .with_path_prefix(""),
    );
    let data_source = Arc::new(JsonFileDataSource::open(config.source_path.as_path()).await?);
    let (event_publisher, events) = ChannelBatchEventPublisher::channel();
    let event_consumer = tokio::spawn(log_batch_events(events));

    let runner = JobRunnerService::new(lease_manager, data_source, Arc::new(TracingProgressSink))
        .with_message_sink(Arc::new(TracingMessageSink))
        .with_event_publisher(Arc::new(event_publisher));
    let shutdown_handler = register_shutdown_handler(runner.clone(), config.job_id.clone());

    let job = JobDefinition::new(
        config.job_id.clone(),
        config.entity_name.as_str(),
        config.partition,
    )?;
    info!(
        job_id = %config.job_id,
        holder_id = %config.holder_id,
        source_path = %config.source_path.display(),
        offset = config.partition.offset(),
        limit = config.partition.limit(),
        batch_size = config.partition.batch_size(),
        per_store = config.partition.per_store(),
        "batchward-worker started"
    );

    let transform = Arc::new(ImportTransform::new(config.required_fields.clone()));
    let run = match runner.run(&job, transform).await {
        Ok(run) => run,
        Err(AppError::LeaseContention(job_id)) => {
            warn!(job_id = %job_id, "job is already running elsewhere");
            return Ok(ExitCode::from(2));
        }
        Err(error) => return Err(error),
    };

    // Runner clones hold the publisher; the channel closes once both are gone.
    shutdown_handler.abort();
    drop(runner);
    if let Err(error) = event_consumer.await {
        warn!(error = %error, "batch event consumer stopped abnormally");
    }

    let report = serde_json::to_string_pretty(&run)
        .map_err(|error| AppError::Internal(format!("failed to encode run report: {error}")))?;
    println!("{report}");

    Ok(match run.status {
        JobRunStatus::Completed | JobRunStatus::Cancelled => ExitCode::SUCCESS,
        JobRunStatus::Faulted => ExitCode::FAILURE,
    })
}

fn build_lease_store(config: &WorkerConfig) -> AppResult<Arc<dyn ContentStore>> {
    match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL '{redis_url}': {error}"))
            })?;
            info!(key_prefix = %config.lease_key_prefix, "using redis lease store");
            Ok(Arc::new(RedisContentStore::new(
                client,
                config.lease_key_prefix.as_str(),
            )))
        }
        None => {
            info!(lease_dir = %config.lease_dir.display(), "using filesystem lease store");
            Ok(Arc::new(FileSystemContentStore::new(
                config.lease_dir.clone(),
            )))
        }
    }
}

async fn log_batch_events(mut events: UnboundedReceiver<BatchExecutedEvent>) {
    while let Some(event) = events.recv().await {
        let failed = event.records.iter().filter(|record| record.has_error()).count();
        debug!(
            job_id = %event.context.job_id(),
            run_id = %event.context.run_id(),
            store_scope = %event.store_scope,
            batch_index = event.batch_index,
            records = event.records.len(),
            failed,
            "batch executed"
        );
    }
}

fn register_shutdown_handler(runner: JobRunnerService, job_id: JobId) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(error) = signal::ctrl_c().await {
                warn!(error = %error, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut terminate) => {
                    terminate.recv().await;
                }
                Err(error) => {
                    warn!(error = %error, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received SIGINT, cancelling job"),
            () = terminate => info!("received SIGTERM, cancelling job"),
        }

        if !runner.cancel(&job_id) {
            debug!(job_id = %job_id, "no active run to cancel");
        }
    })
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let job_id = JobId::new(required_env("BATCHWARD_JOB_ID")?)?;
        let source_path = PathBuf::from(required_env("BATCHWARD_SOURCE_PATH")?);
        let entity_name = optional_env("BATCHWARD_ENTITY_NAME").unwrap_or_else(|| "record".to_owned());
        let required_fields = optional_env("BATCHWARD_REQUIRED_FIELDS")
            .map(|value| parse_field_list(value.as_str()))
            .unwrap_or_default();
        let lease_dir = PathBuf::from(
            optional_env("BATCHWARD_LEASE_DIR").unwrap_or_else(|| "./leases".to_owned()),
        );
        let redis_url = optional_env("REDIS_URL");
        let lease_key_prefix = optional_env("BATCHWARD_LEASE_KEY_PREFIX")
            .unwrap_or_else(|| "batchward:lease".to_owned());
        let lease_seconds = parse_env_u32("BATCHWARD_LEASE_SECONDS", 3600)?;
        let holder_id = optional_env("BATCHWARD_HOLDER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "BATCHWARD_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let partition = PartitionConfig::new(
            parse_env_u64("BATCHWARD_OFFSET", 0)?,
            parse_env_u64("BATCHWARD_LIMIT", 1000)?,
            parse_env_u64("BATCHWARD_BATCH_SIZE", 100)?,
            parse_env_bool("BATCHWARD_PER_STORE", false)?,
        )?;

        Ok(Self {
            job_id,
            source_path,
            entity_name,
            required_fields,
            lease_dir,
            redis_url,
            lease_key_prefix,
            lease_seconds,
            holder_id,
            partition,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    optional_env(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_field_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected a boolean"
        ))),
    }
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match optional_env(name) {
        Some(value) => parse_bool(name, value.as_str()),
        None => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match optional_env(name) {
        Some(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match optional_env(name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
