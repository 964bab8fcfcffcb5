use batchward_core::AppError;
use batchward_domain::{BatchStage, PartitionPlanner, StoreScope};
use tracing::{debug, info, warn};

use super::*;
use crate::BatchInput;

const STAGE_SCOPES: &str = "scopes";
const STAGE_COUNT: &str = "count";
const STAGE_FETCH: &str = "fetch";
const STAGE_PROCESS: &str = "process";

enum RunInterrupt {
    Cancelled,
    Fatal { stage: BatchStage, error: AppError },
}

struct RunPass<'a> {
    planner: PartitionPlanner,
    pipeline: &'a RowPipeline,
    transform: &'a dyn RowTransform,
    context: &'a ExecutionContext,
}

#[derive(Debug, Default)]
struct RunProgress {
    processed: u64,
    batches: u64,
}

impl RunProgress {
    fn fatal(&self, stage: &str, error: AppError) -> RunInterrupt {
        RunInterrupt::Fatal {
            stage: BatchStage::new(self.batches + 1, stage),
            error,
        }
    }
}

impl JobRunnerService {
    pub(super) async fn execute(
        &self,
        job: &JobDefinition,
        pipeline: &RowPipeline,
        transform: &dyn RowTransform,
        context: &ExecutionContext,
        result: &mut RunResult,
    ) -> JobRunStatus {
        let pass = RunPass {
            planner: PartitionPlanner::new(job.partition()),
            pipeline,
            transform,
            context,
        };
        let mut progress = RunProgress::default();

        let outcome = match self.resolve_scopes(&pass.planner, result).await {
            Ok(scopes) => {
                let mut outcome = Ok(());
                for scope in scopes {
                    outcome = self
                        .execute_scope(&pass, scope, result, &mut progress)
                        .await;
                    if outcome.is_err() {
                        break;
                    }
                }
                outcome
            }
            Err(error) => Err(progress.fatal(STAGE_SCOPES, error)),
        };

        match outcome {
            Ok(()) => JobRunStatus::Completed,
            Err(RunInterrupt::Cancelled) => {
                info!(
                    processed = progress.processed,
                    batches = progress.batches,
                    "run cancelled at batch boundary"
                );
                result.mark_cancelled();
                self.record(result, ResultMessage::info("run cancelled on request"));
                JobRunStatus::Cancelled
            }
            Err(RunInterrupt::Fatal { stage, error }) => {
                warn!(
                    batch_index = stage.batch_index(),
                    stage = stage.stage(),
                    error = %error,
                    "run faulted"
                );
                result.add_error(&error, Some(&stage));
                if let (Some(message_sink), Some(message)) =
                    (&self.message_sink, result.messages().last())
                {
                    message_sink.publish(message);
                }
                JobRunStatus::Faulted
            }
        }
    }

    async fn resolve_scopes(
        &self,
        planner: &PartitionPlanner,
        result: &mut RunResult,
    ) -> AppResult<Vec<StoreScope>> {
        if !planner.config().per_store() {
            return Ok(vec![StoreScope::All]);
        }

        let mut store_ids = self.data_source.store_ids().await?;
        store_ids.sort_unstable();
        store_ids.dedup();

        if store_ids.is_empty() {
            self.record(
                result,
                ResultMessage::warning("per-store partitioning found no stores to process"),
            );
        }

        Ok(store_ids.into_iter().map(StoreScope::Store).collect())
    }

    async fn execute_scope(
        &self,
        pass: &RunPass<'_>,
        scope: StoreScope,
        result: &mut RunResult,
        progress: &mut RunProgress,
    ) -> Result<(), RunInterrupt> {
        let RunPass {
            planner,
            pipeline,
            transform,
            context,
        } = pass;

        if context.is_cancellation_requested() {
            return Err(RunInterrupt::Cancelled);
        }

        let counted = self
            .data_source
            .count(scope)
            .await
            .map_err(|error| progress.fatal(STAGE_COUNT, error))?;
        let expected = counted.saturating_sub(planner.config().offset());
        result.add_total_records(expected);
        debug!(store_scope = %scope, counted, expected, "store scope counted");

        let mut known_in_scope = expected;
        let mut observed_in_scope = 0_u64;
        let mut cursor = planner.cursor();

        while let Some(window) = cursor.next_window() {
            if context.is_cancellation_requested() {
                return Err(RunInterrupt::Cancelled);
            }

            let mut records = self
                .data_source
                .fetch(scope, window.offset, window.limit)
                .await
                .map_err(|error| progress.fatal(STAGE_FETCH, error))?;
            records.truncate(usize::try_from(window.limit).unwrap_or(usize::MAX));

            let observed = cursor.record_fetched(window, records.len() as u64);
            debug!(
                store_scope = %scope,
                window_index = observed.index,
                start = observed.start,
                end = observed.end,
                "window fetched"
            );

            observed_in_scope += observed.len();
            if observed_in_scope > known_in_scope {
                result.add_total_records(observed_in_scope - known_in_scope);
                known_in_scope = observed_in_scope;
            }

            let mut remaining = records.into_iter();
            let window_len = usize::try_from(observed.len()).unwrap_or(usize::MAX);
            for batch in planner.batches(window_len) {
                if context.is_cancellation_requested() {
                    return Err(RunInterrupt::Cancelled);
                }

                let input = BatchInput {
                    store_scope: scope,
                    batch_index: progress.batches + 1,
                    first_position: observed
                        .start
                        .saturating_add(u64::try_from(batch.start).unwrap_or(u64::MAX)),
                    values: remaining.by_ref().take(batch.len).collect(),
                };
                let report = pipeline
                    .process_batch(context, *transform, input)
                    .await
                    .map_err(|error| progress.fatal(STAGE_PROCESS, error))?;

                progress.batches += 1;
                progress.processed += report.processed as u64;
                for outcome in &report.outcomes {
                    result.record_outcome(*outcome);
                }
                for message in report.messages {
                    self.record(result, message);
                }

                context.report_progress(progress.processed, result.total_records());
            }
        }

        if observed_in_scope < expected {
            self.record(
                result,
                ResultMessage::warning(format!(
                    "{scope} expected {expected} records but only {observed_in_scope} were fetched"
                )),
            );
        }

        Ok(())
    }
}
