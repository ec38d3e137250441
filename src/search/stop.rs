// src/search/stop.rs

//! Stop-condition state machine.
//!
//! The evaluator is pure: it is fed completed evaluations in order and holds
//! no reference to the store. The controller replays history from the store
//! into a fresh evaluator after a restart, which is what makes the polling
//! loop crash-safe.

use tracing::{debug, info};

use crate::search::candidate::{Candidate, Fingerprint};
use crate::store::CandidateTotals;

/// Overall search state. All non-`Running` states are terminal and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Running,
    /// The best fitness stopped improving for long enough.
    Converged,
    /// The structure budget is spent (and the exact-count floor satisfied).
    Exhausted,
    /// A candidate matched the user-supplied expected structure.
    MatchedExpected,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchState::Running)
    }
}

/// Parameters for the stop-condition evaluator.
#[derive(Debug, Clone)]
pub struct StopConfig {
    /// Hard cap on candidates ever created or queued.
    pub max_structures: usize,
    /// Floor of evaluated candidates that must be met before `Exhausted`
    /// can fire, even if that pushes past `max_structures`.
    pub min_structures_exact: usize,
    /// An improvement of the best fitness by more than this resets the
    /// survival count; improvements within it update the best silently.
    pub convergence_cutoff: f64,
    /// Number of consecutively evaluated individuals without a real
    /// improvement before the search converges. `None` disables the check.
    pub best_survival_cutoff: Option<usize>,
    /// Fingerprint of a target structure that ends the search when matched.
    pub expected: Option<Fingerprint>,
    /// Tolerance for the expected-structure match.
    pub similarity_threshold: f64,
}

/// Tracks best fitness, the survival count since the last real improvement,
/// and decides when the search is done.
#[derive(Debug)]
pub struct StopConditionEvaluator {
    config: StopConfig,
    state: SearchState,
    best: Option<f64>,
    /// Individuals evaluated since the best last improved beyond the cutoff.
    survivors: usize,
}

impl StopConditionEvaluator {
    pub fn new(config: StopConfig) -> Self {
        Self {
            config,
            state: SearchState::Running,
            best: None,
            survivors: 0,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn best_fitness(&self) -> Option<f64> {
        self.best
    }

    /// Feed one completed evaluation, with the store totals current as of
    /// that observation. Returns the (possibly new) search state.
    ///
    /// Once terminal, further observations are ignored.
    pub fn observe(&mut self, candidate: &Candidate, totals: CandidateTotals) -> SearchState {
        if self.state.is_terminal() {
            return self.state;
        }
        let Some(fitness) = candidate.fitness else {
            return self.state;
        };

        self.track_best(fitness);

        // Exhaustion is checked first, but never before the exact-count
        // floor has been satisfied.
        if totals.created >= self.config.max_structures
            && totals.evaluated >= self.config.min_structures_exact
        {
            info!(
                created = totals.created,
                evaluated = totals.evaluated,
                max_structures = self.config.max_structures,
                "structure budget exhausted"
            );
            self.state = SearchState::Exhausted;
        } else if self.matches_expected(&candidate.fingerprint) {
            info!(candidate = %candidate.id, "candidate matched the expected structure");
            self.state = SearchState::MatchedExpected;
        } else if let Some(cutoff) = self.config.best_survival_cutoff
            && self.survivors >= cutoff
        {
            info!(
                best = self.best,
                survivors = self.survivors,
                "best fitness survived long enough; search converged"
            );
            self.state = SearchState::Converged;
        }

        self.state
    }

    fn track_best(&mut self, fitness: f64) {
        match self.best {
            None => {
                self.best = Some(fitness);
            }
            Some(best) if fitness < best - self.config.convergence_cutoff => {
                debug!(old_best = best, new_best = fitness, "best fitness improved");
                self.best = Some(fitness);
                self.survivors = 0;
            }
            Some(best) => {
                // A near-tie may still nudge the best value down, but it
                // neither resets nor restarts the survival window.
                if fitness < best {
                    self.best = Some(fitness);
                }
                self.survivors += 1;
            }
        }
    }

    fn matches_expected(&self, fingerprint: &Fingerprint) -> bool {
        match &self.config.expected {
            Some(expected) => expected.within(fingerprint, self.config.similarity_threshold),
            None => false,
        }
    }
}
