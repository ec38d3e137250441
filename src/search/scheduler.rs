// src/search/scheduler.rs

//! Steady-state queue replenishment.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::errors::{EvoqueueError, Result};
use crate::search::candidate::Candidate;
use crate::search::dedup::DuplicateValidator;
use crate::search::selector::Selector;
use crate::search::source::{SourceEntry, SourceKind, SourceRegistry};
use crate::store::{EnqueueRequest, SearchStore, WorkPayload};

/// What happened to one replenishment slot.
enum SlotOutcome {
    Enqueued,
    /// The source's parent pool is still empty; try again next cycle.
    NoParents,
    /// Every attempt produced a duplicate (or the source kept failing).
    GaveUp,
}

/// Summary of one `replenish` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplenishReport {
    /// Work items enqueued this cycle.
    pub enqueued: usize,
    /// Candidate seeds discarded as duplicates.
    pub duplicates_discarded: usize,
    /// Slots skipped for this cycle (no parents yet, or retries exhausted).
    pub slots_skipped: usize,
    /// Expired claims released back to the queue before counting.
    pub leases_released: usize,
}

/// Keeps, per source, `round_half_up(N * w')` work items in flight.
///
/// The scheduler is the only component that creates work items, and it only
/// ever adds: existing items are never removed or re-prioritized. All state
/// is re-derived from the store on every invocation, so a crashed controller
/// resumes with nothing to rebuild.
pub struct SteadyStateScheduler<S: SearchStore> {
    store: Arc<S>,
    registry: SourceRegistry,
    selector: Selector,
    validator: DuplicateValidator,
    nsteadystate: usize,
    max_duplicate_retries: usize,
}

impl<S: SearchStore> SteadyStateScheduler<S> {
    pub fn new(
        store: Arc<S>,
        registry: SourceRegistry,
        selector: Selector,
        validator: DuplicateValidator,
        nsteadystate: usize,
        max_duplicate_retries: usize,
    ) -> Self {
        Self {
            store,
            registry,
            selector,
            validator,
            nsteadystate,
            max_duplicate_retries: max_duplicate_retries.max(1),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Top the queue up to each source's steady-state target.
    pub fn replenish(&self) -> Result<ReplenishReport> {
        let mut report = ReplenishReport {
            leases_released: self.store.release_expired(Utc::now())?,
            ..ReplenishReport::default()
        };

        for (entry, target) in self.entries_with_targets() {
            let current = self.store.in_flight_count(entry.source.name())?;
            if current >= target {
                continue;
            }
            let deficit = target - current;
            debug!(
                source = %entry.source.name(),
                current,
                target,
                deficit,
                "replenishing source"
            );

            let mut filled = 0;
            for _ in 0..deficit {
                match self.fill_slot(entry, &mut report)? {
                    SlotOutcome::Enqueued => {
                        filled += 1;
                        report.enqueued += 1;
                    }
                    SlotOutcome::NoParents => {
                        // The whole source is blocked until the population
                        // fills in; skip its remaining slots this cycle.
                        report.slots_skipped += deficit - filled;
                        break;
                    }
                    SlotOutcome::GaveUp => report.slots_skipped += 1,
                }
            }
        }

        Ok(report)
    }

    fn entries_with_targets(&self) -> Vec<(&SourceEntry, usize)> {
        self.registry
            .iter()
            .map(|entry| {
                let target = self
                    .registry
                    .target_for(entry.source.name(), self.nsteadystate)
                    .unwrap_or(0);
                (entry, target)
            })
            .collect()
    }

    /// Try to fill one slot for `entry`, regenerating on duplicates up to
    /// the configured bound.
    fn fill_slot(&self, entry: &SourceEntry, report: &mut ReplenishReport) -> Result<SlotOutcome> {
        let name = entry.source.name();

        for _ in 0..self.max_duplicate_retries {
            let parents: Vec<Candidate> = match entry.source.kind() {
                SourceKind::Creation => Vec::new(),
                SourceKind::Transformation { parents } => {
                    match self.selector.select(self.store.as_ref(), parents) {
                        Ok(picked) => picked,
                        Err(EvoqueueError::InsufficientPopulation) => {
                            debug!(
                                source = %name,
                                "no evaluated candidates yet; skipping transformation source this cycle"
                            );
                            return Ok(SlotOutcome::NoParents);
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            let seed = match entry.source.generate(&parents) {
                Ok(seed) => seed,
                Err(e) => {
                    warn!(source = %name, error = %e, "source failed to generate; skipping slot");
                    return Ok(SlotOutcome::GaveUp);
                }
            };

            if self
                .validator
                .is_duplicate(&seed.fingerprint, self.store.as_ref())?
            {
                report.duplicates_discarded += 1;
                continue;
            }

            let parent_ids = parents.iter().map(|p| p.id.clone()).collect();
            let candidate = Candidate::new(seed.fingerprint, name, parent_ids);
            self.store.insert_candidate(&candidate)?;

            let payload = WorkPayload {
                candidate: candidate.id.clone(),
                source: name.to_string(),
                params: seed.params,
            };
            let item = self.store.enqueue(EnqueueRequest::new(payload))?;
            debug!(source = %name, candidate = %candidate.id, item = %item, "enqueued candidate");
            return Ok(SlotOutcome::Enqueued);
        }

        warn!(
            source = %name,
            retries = self.max_duplicate_retries,
            "could not produce a unique candidate; skipping slot this cycle"
        );
        Ok(SlotOutcome::GaveUp)
    }
}
