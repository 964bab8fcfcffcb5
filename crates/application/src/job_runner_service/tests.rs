use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use batchward_core::{AppError, AppResult, JobId};
use batchward_domain::{
    JobDefinition, JobRunStatus, JobRunnerState, MessageSeverity, PartitionConfig, RowError,
    RowFailure, RowOutcome, StoreScope,
};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};

use crate::{
    BatchEventPublisher, BatchExecutedEvent, ContentStore, DataSource, ExecutionContext,
    LeaseLockManager, ProgressSink, RowTransform,
};

use super::JobRunnerService;

#[derive(Default)]
struct FakeContentStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.entries.lock().await.contains_key(path))
    }

    async fn read(&self, path: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().await.get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert(path.to_owned(), content.to_owned());
        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<bool> {
        Ok(self.entries.lock().await.remove(path).is_some())
    }
}

#[derive(Default)]
struct FakeDataSource {
    records: HashMap<StoreScope, Vec<Value>>,
    fail_fetch_at: Option<u64>,
    fetches: StdMutex<Vec<(StoreScope, u64, u64)>>,
}

impl FakeDataSource {
    fn with_records(scope: StoreScope, records: Vec<Value>) -> Self {
        Self {
            records: HashMap::from([(scope, records)]),
            ..Self::default()
        }
    }

    fn fetches(&self) -> Vec<(StoreScope, u64, u64)> {
        self.fetches
            .lock()
            .map(|fetches| fetches.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataSource for FakeDataSource {
    async fn store_ids(&self) -> AppResult<Vec<u32>> {
        Ok(self
            .records
            .keys()
            .filter_map(|scope| match scope {
                StoreScope::Store(store_id) => Some(*store_id),
                StoreScope::All => None,
            })
            .collect())
    }

    async fn count(&self, scope: StoreScope) -> AppResult<u64> {
        Ok(self.records.get(&scope).map_or(0, Vec::len) as u64)
    }

    async fn fetch(&self, scope: StoreScope, offset: u64, limit: u64) -> AppResult<Vec<Value>> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push((scope, offset, limit));
        }

        if self.fail_fetch_at == Some(offset) {
            return Err(AppError::Storage("catalog database unreachable".to_owned()));
        }

        Ok(self
            .records
            .get(&scope)
            .map(|records| {
                records
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingProgressSink {
    reports: StdMutex<Vec<(u64, u64)>>,
}

impl ProgressSink for RecordingProgressSink {
    fn report(&self, processed: u64, total: u64) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((processed, total));
        }
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: StdMutex<Vec<BatchExecutedEvent>>,
}

impl RecordingPublisher {
    fn batch_sizes(&self) -> Vec<usize> {
        self.events
            .lock()
            .map(|events| events.iter().map(|event| event.records.len()).collect())
            .unwrap_or_default()
    }
}

impl BatchEventPublisher for RecordingPublisher {
    fn publish(&self, event: BatchExecutedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Requires a non-empty `name`; records carrying an `id` count as updates.
struct NameTransform;

#[async_trait]
impl RowTransform for NameTransform {
    async fn apply(
        &self,
        _context: &ExecutionContext,
        record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        match record.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => {
                if record.get("id").is_some() {
                    Ok(RowOutcome::Updated)
                } else {
                    Ok(RowOutcome::Created)
                }
            }
            _ => Err(RowError::for_field("name", "name is required").into()),
        }
    }
}

/// Cancels its own run while processing the record at `cancel_at`.
struct SelfCancellingTransform {
    cancel_at: u64,
    seen: StdMutex<u64>,
}

#[async_trait]
impl RowTransform for SelfCancellingTransform {
    async fn apply(
        &self,
        context: &ExecutionContext,
        _record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        let seen = self
            .seen
            .lock()
            .map(|mut seen| {
                *seen += 1;
                *seen
            })
            .unwrap_or_default();

        if seen == self.cancel_at {
            context.cancel();
        }

        Ok(RowOutcome::Created)
    }
}

/// Parks on the first record until the test releases it.
struct GatedTransform {
    started: Arc<Notify>,
    resume: Arc<Notify>,
    first: StdMutex<bool>,
}

#[async_trait]
impl RowTransform for GatedTransform {
    async fn apply(
        &self,
        _context: &ExecutionContext,
        _record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        let is_first = self
            .first
            .lock()
            .map(|mut first| std::mem::replace(&mut *first, false))
            .unwrap_or_default();

        if is_first {
            self.started.notify_one();
            self.resume.notified().await;
        }

        Ok(RowOutcome::Updated)
    }
}

/// Fails fatally on the record named `fatal_name`.
struct FatalTransform {
    fatal_name: &'static str,
}

#[async_trait]
impl RowTransform for FatalTransform {
    async fn apply(
        &self,
        _context: &ExecutionContext,
        record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        if record.get("name").and_then(Value::as_str) == Some(self.fatal_name) {
            return Err(AppError::Storage("pricing service unreachable".to_owned()).into());
        }

        Ok(RowOutcome::Created)
    }
}

struct PanickingTransform;

#[async_trait]
impl RowTransform for PanickingTransform {
    async fn apply(
        &self,
        _context: &ExecutionContext,
        _record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        panic!("transform crashed");
    }
}

struct Harness {
    runner: JobRunnerService,
    lease_manager: Arc<LeaseLockManager>,
    data_source: Arc<FakeDataSource>,
    progress: Arc<RecordingProgressSink>,
    publisher: Arc<RecordingPublisher>,
}

fn harness(data_source: FakeDataSource) -> Harness {
    let store = Arc::new(FakeContentStore::default());
    let lease_manager = Arc::new(
        LeaseLockManager::new(store, "worker-1", 600).unwrap_or_else(|_| unreachable!()),
    );
    let data_source = Arc::new(data_source);
    let progress = Arc::new(RecordingProgressSink::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let runner = JobRunnerService::new(lease_manager.clone(), data_source.clone(), progress.clone())
        .with_event_publisher(publisher.clone());

    Harness {
        runner,
        lease_manager,
        data_source,
        progress,
        publisher,
    }
}

/// Gives a background lease release the chance to finish.
async fn wait_until_unleased(harness: &Harness) {
    for _ in 0..100 {
        if !harness.lease_manager.is_leased(&job_id()).await {
            return;
        }
        tokio::task::yield_now().await;
    }
}

fn job(limit: u64, batch_size: u64, per_store: bool) -> JobDefinition {
    let partition =
        PartitionConfig::new(0, limit, batch_size, per_store).unwrap_or_else(|_| unreachable!());
    JobDefinition::new(job_id(), "product", partition).unwrap_or_else(|_| unreachable!())
}

fn job_id() -> JobId {
    JobId::new("catalog-import").unwrap_or_else(|_| unreachable!())
}

fn named_records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|index| json!({"name": format!("product-{index}")}))
        .collect()
}

#[tokio::test]
async fn run_isolates_invalid_row_and_reports_totals() {
    let records = vec![
        json!({"name": "desk"}),
        json!({"name": ""}),
        json!({"id": 7, "name": "lamp"}),
    ];
    let harness = harness(FakeDataSource::with_records(StoreScope::All, records));

    let run = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;

    assert!(run.is_ok());
    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Completed);
    assert_eq!(run.result.total_records(), 3);
    assert_eq!(run.result.new_records(), 1);
    assert_eq!(run.result.modified_records(), 1);
    assert_eq!(run.result.affected_records(), 2);
    assert!(run.result.has_errors());
    assert!(!run.result.has_warnings());
    assert!(run.result.ended_at().is_some());

    let errors: Vec<_> = run
        .result
        .messages()
        .iter()
        .filter(|message| message.severity() == MessageSeverity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].affected_row().map(|row| row.position()), Some(1));
    assert_eq!(errors[0].affected_field(), Some("name"));

    assert_eq!(harness.publisher.batch_sizes(), vec![2, 1]);
    assert!(!harness.runner.is_running(&job_id()).await);
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Idle);
}

#[tokio::test]
async fn run_walks_windows_and_batches_in_order() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(250),
    ));

    let run = harness.runner.run(&job(100, 40, false), Arc::new(NameTransform)).await;

    assert!(run.is_ok());
    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Completed);
    assert_eq!(run.result.new_records(), 250);

    let offsets: Vec<u64> = harness
        .data_source
        .fetches()
        .iter()
        .map(|(_, offset, _)| *offset)
        .collect();
    assert_eq!(offsets, vec![0, 100, 200]);
    assert_eq!(
        harness.publisher.batch_sizes(),
        vec![40, 40, 20, 40, 40, 20, 40, 10]
    );

    let reports = harness
        .progress
        .reports
        .lock()
        .map(|reports| reports.clone())
        .unwrap_or_default();
    assert_eq!(reports.len(), 8);
    assert_eq!(reports.first(), Some(&(40, 250)));
    assert_eq!(reports.last(), Some(&(250, 250)));
}

#[tokio::test]
async fn per_store_partitioning_restarts_for_each_store() {
    let data_source = FakeDataSource {
        records: HashMap::from([
            (StoreScope::Store(2), named_records(3)),
            (StoreScope::Store(1), named_records(5)),
        ]),
        ..FakeDataSource::default()
    };
    let harness = harness(data_source);

    let run = harness.runner.run(&job(4, 2, true), Arc::new(NameTransform)).await;

    assert!(run.is_ok());
    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.result.total_records(), 8);
    assert_eq!(run.result.new_records(), 8);
    assert_eq!(
        harness.data_source.fetches(),
        vec![
            (StoreScope::Store(1), 0, 4),
            (StoreScope::Store(1), 4, 4),
            (StoreScope::Store(2), 0, 4),
        ]
    );

    let scopes: Vec<StoreScope> = harness
        .publisher
        .events
        .lock()
        .map(|events| events.iter().map(|event| event.store_scope).collect())
        .unwrap_or_default();
    assert_eq!(
        scopes,
        vec![
            StoreScope::Store(1),
            StoreScope::Store(1),
            StoreScope::Store(1),
            StoreScope::Store(2),
            StoreScope::Store(2),
        ]
    );
}

#[tokio::test]
async fn row_error_in_middle_batch_does_not_stop_later_batches() {
    let mut records = named_records(10);
    records[4] = json!({"name": ""});
    let harness = harness(FakeDataSource::with_records(StoreScope::All, records));

    let run = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;

    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Completed);
    assert_eq!(harness.publisher.batch_sizes(), vec![2, 2, 2, 2, 2]);
    assert_eq!(run.result.new_records(), 9);
    assert_eq!(run.result.messages().len(), 1);
    assert_eq!(
        run.result.messages()[0]
            .affected_row()
            .map(|row| row.position()),
        Some(4)
    );
}

#[tokio::test]
async fn cancellation_stops_at_next_batch_boundary_and_keeps_counts() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(10),
    ));
    let transform = Arc::new(SelfCancellingTransform {
        cancel_at: 3,
        seen: StdMutex::new(0),
    });

    let run = harness.runner.run(&job(10, 2, false), transform).await;

    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Cancelled);
    assert!(run.result.cancelled());
    assert_eq!(run.result.new_records(), 4);
    assert_eq!(harness.publisher.batch_sizes(), vec![2, 2]);
    assert!(!harness.lease_manager.is_leased(&job_id()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_cancel_reaches_running_job() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(6),
    ));
    let started = Arc::new(Notify::new());
    let resume = Arc::new(Notify::new());
    let transform = Arc::new(GatedTransform {
        started: started.clone(),
        resume: resume.clone(),
        first: StdMutex::new(true),
    });

    let runner = harness.runner.clone();
    let handle = tokio::spawn(async move { runner.run(&job(10, 3, false), transform).await });

    started.notified().await;
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Running);
    assert!(harness.runner.is_running(&job_id()).await);
    assert!(harness.runner.cancel(&job_id()));
    resume.notify_one();

    let run = handle.await;
    assert!(run.is_ok());
    let run = run
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Cancelled);
    assert_eq!(run.result.modified_records(), 3);
    assert!(!harness.runner.cancel(&job_id()));
}

#[tokio::test]
async fn lease_contention_leaves_existing_lease_untouched() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(3),
    ));
    let held = harness.lease_manager.try_acquire(&job_id()).await;
    assert!(held.is_some());

    let run = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;

    assert!(matches!(run, Err(AppError::LeaseContention(_))));
    assert!(harness.data_source.fetches().is_empty());
    assert!(harness.runner.is_running(&job_id()).await);
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Idle);

    let released = harness
        .lease_manager
        .release(held.unwrap_or_else(|| unreachable!()))
        .await;
    assert!(matches!(released, Ok(true)));
}

#[tokio::test]
async fn fatal_fetch_error_faults_run_and_releases_lease() {
    let data_source = FakeDataSource {
        fail_fetch_at: Some(10),
        ..FakeDataSource::with_records(StoreScope::All, named_records(25))
    };
    let harness = harness(data_source);

    let run = harness.runner.run(&job(10, 5, false), Arc::new(NameTransform)).await;

    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Faulted);
    assert_eq!(run.result.new_records(), 10);
    assert!(run.result.ended_at().is_some());

    let errors: Vec<_> = run
        .result
        .messages()
        .iter()
        .filter(|message| message.severity() == MessageSeverity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].text(),
        "[Batch: 3, Stage: fetch] storage error: catalog database unreachable"
    );
    assert!(!harness.runner.is_running(&job_id()).await);
}

#[tokio::test]
async fn fatal_transform_error_faults_run_at_its_batch() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(10),
    ));
    let transform = Arc::new(FatalTransform {
        fatal_name: "product-5",
    });

    let run = harness.runner.run(&job(10, 2, false), transform).await;

    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Faulted);
    assert_eq!(run.result.new_records(), 4);
    assert!(run.result.ended_at().is_some());

    let errors: Vec<_> = run
        .result
        .messages()
        .iter()
        .filter(|message| message.severity() == MessageSeverity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].text(),
        "[Batch: 3, Stage: process] storage error: pricing service unreachable"
    );

    assert_eq!(harness.publisher.batch_sizes(), vec![2, 2]);
    assert!(!harness.lease_manager.is_leased(&job_id()).await);
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Idle);
}

#[tokio::test]
async fn second_run_of_same_job_in_process_is_rejected() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(4),
    ));
    let started = Arc::new(Notify::new());
    let resume = Arc::new(Notify::new());
    let transform = Arc::new(GatedTransform {
        started: started.clone(),
        resume: resume.clone(),
        first: StdMutex::new(true),
    });

    let runner = harness.runner.clone();
    let handle = tokio::spawn(async move { runner.run(&job(10, 2, false), transform).await });
    started.notified().await;

    let second = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;

    assert!(matches!(second, Err(AppError::LeaseContention(_))));
    assert!(harness.lease_manager.is_leased(&job_id()).await);
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Running);

    resume.notify_one();
    let first = handle.await;
    assert!(first.is_ok());
    let first = first
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(first.status, JobRunStatus::Completed);
    assert_eq!(first.result.modified_records(), 4);
    assert!(!harness.lease_manager.is_leased(&job_id()).await);
}

#[tokio::test]
async fn panicking_transform_frees_job_for_next_run() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(3),
    ));

    let runner = harness.runner.clone();
    let handle = tokio::spawn(async move {
        runner
            .run(&job(10, 2, false), Arc::new(PanickingTransform))
            .await
    });
    let crashed = handle.await;
    assert!(crashed.is_err_and(|error| error.is_panic()));

    wait_until_unleased(&harness).await;
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Idle);
    assert!(!harness.runner.is_running(&job_id()).await);

    let run = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;
    assert!(run.is_ok());
    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Completed);
    assert_eq!(run.result.new_records(), 3);
}

#[tokio::test]
async fn aborted_run_frees_job_for_next_run() {
    let harness = harness(FakeDataSource::with_records(
        StoreScope::All,
        named_records(3),
    ));
    let started = Arc::new(Notify::new());
    let transform = Arc::new(GatedTransform {
        started: started.clone(),
        resume: Arc::new(Notify::new()),
        first: StdMutex::new(true),
    });

    let runner = harness.runner.clone();
    let handle = tokio::spawn(async move { runner.run(&job(10, 2, false), transform).await });
    started.notified().await;
    assert!(harness.lease_manager.is_leased(&job_id()).await);

    handle.abort();
    let aborted = handle.await;
    assert!(aborted.is_err_and(|error| error.is_cancelled()));

    wait_until_unleased(&harness).await;
    assert_eq!(harness.runner.state(&job_id()), JobRunnerState::Idle);
    assert!(!harness.lease_manager.is_leased(&job_id()).await);

    let run = harness.runner.run(&job(10, 2, false), Arc::new(NameTransform)).await;
    assert!(run.is_ok());
    let run = run.unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status, JobRunStatus::Completed);
}
