// src/engine/mod.rs

//! Search orchestration.
//!
//! The controller is a polling loop, not an event-driven system: its only
//! side effects are store reads and writes, which makes it trivially
//! restartable after a crash. [`controller`] holds the loop itself; the
//! shared option/outcome types live here.

use std::time::Duration;

use crate::config::model::SearchSection;
use crate::search::candidate::Candidate;
use crate::search::stop::SearchState;
use crate::store::CandidateTotals;

pub mod controller;

pub use controller::SearchController;

/// Options for the controller loop.
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Poll interval. The only knob trading store load against reaction
    /// time to queue drain.
    pub sleep_step: Duration,
    /// After a terminal stop state, wait until no worker is still holding a
    /// claim before returning.
    pub drain_on_stop: bool,
    /// Safety valve for operators: give up after this many poll cycles even
    /// if no stop condition fired. `None` = run until stopped.
    pub max_cycles: Option<u64>,
}

impl ControllerOptions {
    pub fn from_config(cfg: &SearchSection) -> Self {
        Self {
            sleep_step: Duration::from_secs_f64(cfg.sleep_step),
            drain_on_stop: false,
            max_cycles: None,
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            sleep_step: Duration::from_secs(5),
            drain_on_stop: false,
            max_cycles: None,
        }
    }
}

/// Final report of one search run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Terminal state, or `Running` when `max_cycles` cut the loop short.
    pub state: SearchState,
    pub totals: CandidateTotals,
    /// Best evaluated candidate, if any evaluation completed.
    pub best: Option<Candidate>,
    /// Poll cycles executed.
    pub cycles: u64,
}
