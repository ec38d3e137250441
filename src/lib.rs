// src/lib.rs

//! Distributed evaluation scheduler for evolutionary structure search.
//!
//! Any number of independent worker processes coordinate through a shared
//! SQLite store: the controller keeps a steady-state number of candidate
//! evaluations in flight, workers claim items exactly once, evaluate them
//! through an external [`worker::Evaluator`], and record fitness back into
//! the store until a stop condition ends the search.

pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod search;
pub mod store;
pub mod types;
pub mod worker;

use std::sync::Arc;

use tracing::info;

use crate::config::model::ConfigFile;
use crate::engine::{ControllerOptions, SearchController, SearchOutcome};
use crate::errors::Result;
use crate::search::dedup::DuplicateValidator;
use crate::search::scheduler::SteadyStateScheduler;
use crate::search::selector::Selector;
use crate::search::source::{CandidateSource, SourceRegistry};
use crate::search::stop::StopConditionEvaluator;
use crate::store::{SearchStore, WorkQueue};
use crate::worker::{Evaluator, Worker, WorkerOptions, WorkerSummary};

/// Wire up a controller from a validated config, a shared store, and the
/// source implementations named in `[source.<name>]`.
///
/// This resolves the source registry once, builds the selector, duplicate
/// validator, scheduler, and stop evaluator, and leaves running the loop to
/// the caller.
pub fn build_controller<S: SearchStore>(
    cfg: &ConfigFile,
    store: Arc<S>,
    sources: Vec<Arc<dyn CandidateSource>>,
    options: ControllerOptions,
) -> Result<SearchController<S>> {
    let registry = SourceRegistry::from_config(cfg, sources)?;
    info!(
        sources = registry.len(),
        nsteadystate = cfg.search.nsteadystate,
        "configured search"
    );

    let selector = Selector::new(cfg.selection.truncation_fraction);
    let validator = DuplicateValidator::new(cfg.search.similarity_threshold);
    let scheduler = SteadyStateScheduler::new(
        Arc::clone(&store),
        registry,
        selector,
        validator,
        cfg.search.nsteadystate,
        cfg.search.max_duplicate_retries,
    );
    let stop = StopConditionEvaluator::new(cfg.stop_config());

    Ok(SearchController::new(store, scheduler, stop, options))
}

/// High-level entry point for the controller side of a search: build the
/// controller from config and run it to completion.
///
/// Workers run separately — typically as independent processes pointed at
/// the same store — via [`run_worker`].
pub async fn run_search<S: SearchStore>(
    cfg: &ConfigFile,
    store: Arc<S>,
    sources: Vec<Arc<dyn CandidateSource>>,
) -> Result<SearchOutcome> {
    let options = ControllerOptions::from_config(&cfg.search);
    let controller = build_controller(cfg, store, sources, options)?;
    controller.run().await
}

/// Run one worker with start parameters taken from `[worker]`.
pub async fn run_worker<S: WorkQueue, E: Evaluator>(
    cfg: &ConfigFile,
    store: Arc<S>,
    evaluator: E,
) -> Result<WorkerSummary> {
    let options = WorkerOptions::from_config(&cfg.worker, cfg.search.retry_limit);
    Worker::new(store, evaluator, options).run().await
}
