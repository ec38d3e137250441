// src/engine/controller.rs

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::search::scheduler::SteadyStateScheduler;
use crate::search::stop::StopConditionEvaluator;
use crate::store::SearchStore;

use super::{ControllerOptions, SearchOutcome};

/// Drives the search: replenish, sleep, check the stop conditions, repeat.
///
/// The controller never executes evaluations and never mutates a work item;
/// workers do both. Everything it knows it re-derives from the store, so a
/// restarted controller replays the evaluation history into a fresh
/// stop-condition evaluator and carries on.
pub struct SearchController<S: SearchStore> {
    store: Arc<S>,
    scheduler: SteadyStateScheduler<S>,
    stop: StopConditionEvaluator,
    options: ControllerOptions,
    /// Evaluations already fed to the stop evaluator.
    observed: usize,
}

impl<S: SearchStore> SearchController<S> {
    pub fn new(
        store: Arc<S>,
        scheduler: SteadyStateScheduler<S>,
        stop: StopConditionEvaluator,
        options: ControllerOptions,
    ) -> Self {
        Self {
            store,
            scheduler,
            stop,
            options,
            observed: 0,
        }
    }

    /// Main polling loop.
    pub async fn run(mut self) -> Result<SearchOutcome> {
        info!("search controller started");
        let mut cycles: u64 = 0;

        // Catch up on history before scheduling anything; a restarted
        // controller may already be past a stop condition.
        self.observe_new_evaluations()?;

        while !self.stop.is_done() {
            if let Some(max) = self.options.max_cycles
                && cycles >= max
            {
                warn!(cycles, "max cycle count reached; stopping without a terminal state");
                break;
            }

            match self.scheduler.replenish() {
                Ok(report) => {
                    if report.enqueued > 0 || report.slots_skipped > 0 {
                        debug!(
                            enqueued = report.enqueued,
                            duplicates = report.duplicates_discarded,
                            skipped = report.slots_skipped,
                            released = report.leases_released,
                            "replenish cycle"
                        );
                    }
                }
                // The store may be briefly unreachable; other components can
                // still make progress, so back off rather than abort.
                Err(e) => warn!(error = %e, "replenish failed; backing off"),
            }

            cycles += 1;
            sleep(self.options.sleep_step).await;

            if let Err(e) = self.observe_new_evaluations() {
                warn!(error = %e, "could not read evaluation history; backing off");
            }
        }

        let state = self.stop.state();
        info!(?state, cycles, "search loop finished; no further work will be enqueued");

        if self.options.drain_on_stop {
            self.drain().await?;
        }

        let totals = self.store.totals()?;
        let best = self.store.evaluated_population()?.into_iter().next();
        Ok(SearchOutcome {
            state,
            totals,
            best,
            cycles,
        })
    }

    /// Feed evaluations that completed since the last poll into the stop
    /// evaluator, in completion order.
    fn observe_new_evaluations(&mut self) -> Result<()> {
        let history = self.store.evaluations_in_order()?;
        if history.len() <= self.observed {
            return Ok(());
        }
        let totals = self.store.totals()?;
        for candidate in &history[self.observed..] {
            self.stop.observe(candidate, totals);
        }
        self.observed = history.len();
        Ok(())
    }

    /// Wait for workers to finish the claims they are holding. Waiting
    /// items are left alone: the controller does not own them, and
    /// stop-on-empty workers will drain them.
    async fn drain(&self) -> Result<()> {
        loop {
            let active = self.store.active_total()?;
            if active == 0 {
                info!("all claimed work has drained");
                return Ok(());
            }
            debug!(active, "waiting for claimed work to drain");
            sleep(self.options.sleep_step).await;
        }
    }
}
