// src/worker/mod.rs

//! The worker loop: claim, evaluate, record, repeat.
//!
//! Workers are independent processes coordinating only through the shared
//! store; this module is the loop each of them runs. Several workers may
//! also run as tasks inside one process (tests do this), but nothing here
//! assumes that.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::model::WorkerSection;
use crate::errors::{EvoqueueError, Result};
use crate::store::{EnqueueRequest, TagFilter, WorkItem, WorkOutcome, WorkQueue};
use crate::types::WorkerId;

pub mod evaluator;

pub use evaluator::{Evaluation, Evaluator};

/// Start parameters for one worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_id: WorkerId,
    /// Which items this worker is willing to service.
    pub filter: TagFilter,
    /// Exit after processing this many items. `None` = unlimited.
    pub max_items: Option<usize>,
    /// Exit when a claim comes back empty instead of sleeping.
    pub stop_when_empty: bool,
    /// How long to sleep between empty claims (and storage-error backoff).
    pub poll_interval: Duration,
    /// Total evaluation attempts per logical unit of work before the worker
    /// cancels instead of requeueing. Must match the store's queue policy.
    pub retry_limit: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            worker_id: generated_worker_id(),
            filter: TagFilter::any(),
            max_items: None,
            stop_when_empty: false,
            poll_interval: Duration::from_secs(2),
            retry_limit: 2,
        }
    }
}

impl WorkerOptions {
    pub fn from_config(cfg: &WorkerSection, retry_limit: u32) -> Self {
        Self {
            worker_id: generated_worker_id(),
            filter: TagFilter::new(cfg.tags.clone()),
            max_items: (cfg.max_items > 0).then_some(cfg.max_items),
            stop_when_empty: cfg.stop_when_empty,
            poll_interval: Duration::from_secs_f64(cfg.poll_interval),
            retry_limit,
        }
    }
}

fn generated_worker_id() -> WorkerId {
    format!("worker-{}", Uuid::new_v4())
}

/// Why a worker exited its loop. Both are normal terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    QueueEmpty,
    MaxItems,
}

/// Counters for one worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
    pub exit: WorkerExit,
}

/// One worker: claims items from the queue and runs them through the
/// evaluator.
pub struct Worker<S: WorkQueue, E: Evaluator> {
    store: Arc<S>,
    evaluator: E,
    options: WorkerOptions,
}

impl<S: WorkQueue, E: Evaluator> Worker<S, E> {
    pub fn new(store: Arc<S>, evaluator: E, options: WorkerOptions) -> Self {
        Self {
            store,
            evaluator,
            options,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.options.worker_id
    }

    /// Main worker loop. Runs until the queue is drained (with
    /// `stop_when_empty`) or `max_items` is reached; storage errors back
    /// off and retry, since other components may still be making progress.
    pub async fn run(mut self) -> Result<WorkerSummary> {
        let worker_id = self.options.worker_id.clone();
        info!(worker = %worker_id, "worker started");

        let mut summary = WorkerSummary {
            processed: 0,
            succeeded: 0,
            failed: 0,
            canceled: 0,
            exit: WorkerExit::QueueEmpty,
        };

        loop {
            if let Some(max) = self.options.max_items
                && summary.processed >= max
            {
                summary.exit = WorkerExit::MaxItems;
                info!(worker = %worker_id, max, "max item count reached; exiting");
                break;
            }

            let claimed = match self.store.claim(&worker_id, &self.options.filter) {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(worker = %worker_id, error = %e, "claim failed; backing off");
                    sleep(self.options.poll_interval).await;
                    continue;
                }
            };

            let Some(item) = claimed else {
                if self.options.stop_when_empty {
                    info!(worker = %worker_id, "queue empty; exiting");
                    break;
                }
                sleep(self.options.poll_interval).await;
                continue;
            };

            match self.process(item, &mut summary).await {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    warn!(worker = %worker_id, error = %e, "storage error while processing; backing off");
                    sleep(self.options.poll_interval).await;
                }
            }
        }

        info!(
            worker = %worker_id,
            processed = summary.processed,
            succeeded = summary.succeeded,
            "worker finished"
        );
        Ok(summary)
    }

    /// Run one claimed item through the evaluator and record the outcome.
    ///
    /// Claim conflicts (`NotOwned`) are swallowed: the item was reassigned
    /// after a lease timeout and belongs to someone else now. Only storage
    /// errors propagate.
    async fn process(&mut self, item: WorkItem, summary: &mut WorkerSummary) -> Result<()> {
        let worker_id = self.options.worker_id.clone();
        debug!(worker = %worker_id, item = %item.id, candidate = %item.candidate, "processing item");

        if let Err(e) = self.store.mark_running(&item.id, &worker_id) {
            return self.swallow_not_owned(e, &item.id);
        }

        let evaluation = self.evaluator.evaluate(item.payload.clone()).await;

        match evaluation {
            Evaluation::Success {
                fitness,
                result_data,
            } => {
                debug!(worker = %worker_id, item = %item.id, fitness, "evaluation succeeded");
                let outcome = WorkOutcome::Succeeded {
                    fitness,
                    result_data,
                };
                match self.store.complete(&item.id, &worker_id, outcome) {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => return self.swallow_not_owned(e, &item.id),
                }
            }
            Evaluation::Failure { reason } => {
                self.handle_failure(item, reason, summary)?;
            }
        }
        Ok(())
    }

    /// Classify an evaluator failure: requeue a fresh item while attempts
    /// remain, cancel permanently once the retry budget is spent.
    fn handle_failure(
        &self,
        item: WorkItem,
        reason: String,
        summary: &mut WorkerSummary,
    ) -> Result<()> {
        let worker_id = &self.options.worker_id;
        let attempts = item.failure_count + 1;

        if attempts >= self.options.retry_limit {
            // Terminal failure signal for the operator; no automatic retry.
            error!(
                worker = %worker_id,
                item = %item.id,
                candidate = %item.candidate,
                attempts,
                reason = %reason,
                "evaluation failed permanently; canceling"
            );
            let outcome = WorkOutcome::Canceled { reason };
            match self.store.complete(&item.id, worker_id, outcome) {
                Ok(()) => summary.canceled += 1,
                Err(e) => return self.swallow_not_owned(e, &item.id),
            }
            return Ok(());
        }

        warn!(
            worker = %worker_id,
            item = %item.id,
            candidate = %item.candidate,
            attempts,
            retry_limit = self.options.retry_limit,
            reason = %reason,
            "transient evaluation failure; requeueing"
        );
        match self
            .store
            .complete(&item.id, worker_id, WorkOutcome::Failed { reason })
        {
            Ok(()) => {}
            // Lost the claim: whoever owns the item now is responsible for
            // its retries, so do not enqueue a duplicate.
            Err(e) => return self.swallow_not_owned(e, &item.id),
        }
        self.store.enqueue(EnqueueRequest::retry_of(&item))?;
        summary.failed += 1;
        Ok(())
    }

    fn swallow_not_owned(&self, e: EvoqueueError, item: &str) -> Result<()> {
        match e {
            EvoqueueError::NotOwned { .. } => {
                warn!(
                    worker = %self.options.worker_id,
                    item = %item,
                    "lost claim on item; discarding local state"
                );
                Ok(())
            }
            other => Err(other),
        }
    }
}
