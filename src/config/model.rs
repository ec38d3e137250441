// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::search::candidate::Fingerprint;
use crate::search::stop::StopConfig;
use crate::store::QueuePolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [search]
/// nsteadystate = 20
/// sleep_step = 5.0
///
/// [source.random]
/// kind = "creation"
/// weight = 0.7
///
/// [source.mutate]
/// kind = "transformation"
/// weight = 0.3
///
/// [stop.basic]
/// max_structures = 50
/// ```
///
/// All sections are optional and have reasonable defaults, except that at
/// least one `[source.<name>]` must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Scheduler and queue behaviour from `[search]`.
    #[serde(default)]
    pub search: SearchSection,

    /// Parent selection from `[selection]`.
    #[serde(default)]
    pub selection: SelectionSection,

    /// All sources from `[source.<name>]`, keyed by source name.
    #[serde(default)]
    pub source: BTreeMap<String, SourceConfig>,

    /// Stop conditions from `[stop.basic]` / `[stop.expected_structure]`.
    #[serde(default)]
    pub stop: StopSection,

    /// Default worker start parameters from `[worker]`.
    #[serde(default)]
    pub worker: WorkerSection,
}

/// Validated configuration. Constructed via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub search: SearchSection,
    pub selection: SelectionSection,
    pub source: BTreeMap<String, SourceConfig>,
    pub stop: StopSection,
    pub worker: WorkerSection,
}

impl ConfigFile {
    /// Used by the validation layer after all checks pass.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            search: raw.search,
            selection: raw.selection,
            source: raw.source,
            stop: raw.stop,
            worker: raw.worker,
        }
    }

    /// Lease/retry policy for the store, derived from `[search]`.
    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            claim_lease: self.search.claim_lease_duration(),
            retry_limit: self.search.retry_limit,
        }
    }

    /// Stop-condition parameters, derived from `[stop]` and the shared
    /// similarity threshold.
    pub fn stop_config(&self) -> StopConfig {
        StopConfig {
            max_structures: self.stop.basic.max_structures,
            min_structures_exact: self.stop.basic.min_structures_exact,
            convergence_cutoff: self.stop.basic.convergence_cutoff,
            best_survival_cutoff: self.stop.basic.best_survival_cutoff,
            expected: self
                .stop
                .expected_structure
                .as_ref()
                .map(|e| Fingerprint::new(e.fingerprint.clone())),
            similarity_threshold: self.search.similarity_threshold,
        }
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    /// Target total in-flight count `N`.
    #[serde(default = "default_nsteadystate")]
    pub nsteadystate: usize,

    /// Controller poll interval in seconds.
    #[serde(default = "default_sleep_step")]
    pub sleep_step: f64,

    /// Fingerprint distance below which two candidates are the same
    /// individual.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// How often a source may regenerate a duplicate before its slot is
    /// skipped for the cycle.
    #[serde(default = "default_max_duplicate_retries")]
    pub max_duplicate_retries: usize,

    /// Total evaluation attempts per logical unit of work.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Seconds before an abandoned claim may be reassigned; `0` disables
    /// leasing.
    #[serde(default = "default_claim_lease")]
    pub claim_lease: f64,
}

fn default_nsteadystate() -> usize {
    10
}

fn default_sleep_step() -> f64 {
    5.0
}

fn default_similarity_threshold() -> f64 {
    1e-4
}

fn default_max_duplicate_retries() -> usize {
    5
}

fn default_retry_limit() -> u32 {
    2
}

fn default_claim_lease() -> f64 {
    86_400.0
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            nsteadystate: default_nsteadystate(),
            sleep_step: default_sleep_step(),
            similarity_threshold: default_similarity_threshold(),
            max_duplicate_retries: default_max_duplicate_retries(),
            retry_limit: default_retry_limit(),
            claim_lease: default_claim_lease(),
        }
    }
}

impl SearchSection {
    /// `claim_lease` as a duration; `None` when leasing is disabled.
    pub fn claim_lease_duration(&self) -> Option<chrono::Duration> {
        if self.claim_lease > 0.0 {
            Some(chrono::Duration::milliseconds(
                (self.claim_lease * 1000.0) as i64,
            ))
        } else {
            None
        }
    }
}

/// `[selection]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionSection {
    /// Fraction of the evaluated population parents are drawn from,
    /// in `(0, 1]`.
    #[serde(default = "default_truncation_fraction")]
    pub truncation_fraction: f64,
}

fn default_truncation_fraction() -> f64 {
    0.25
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            truncation_fraction: default_truncation_fraction(),
        }
    }
}

/// Declared kind of a configured source; cross-checked against the
/// registered implementation at search start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKindConfig {
    Creation,
    Transformation,
}

/// `[source.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKindConfig,

    /// Relative share of the steady-state target. Weights need not sum
    /// to 1; they are renormalized.
    pub weight: f64,
}

/// `[stop]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopSection {
    #[serde(default)]
    pub basic: BasicStopConfig,

    #[serde(default)]
    pub expected_structure: Option<ExpectedStructureConfig>,
}

/// `[stop.basic]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicStopConfig {
    /// Hard cap on candidates ever created or queued.
    #[serde(default = "default_max_structures")]
    pub max_structures: usize,

    /// Floor of evaluated candidates that must be met before the cap can
    /// end the search.
    #[serde(default)]
    pub min_structures_exact: usize,

    /// Minimum improvement of the best fitness that counts as progress.
    #[serde(default)]
    pub convergence_cutoff: f64,

    /// Individuals the best must survive before the search converges;
    /// omit to disable convergence stopping.
    #[serde(default)]
    pub best_survival_cutoff: Option<usize>,
}

fn default_max_structures() -> usize {
    1000
}

impl Default for BasicStopConfig {
    fn default() -> Self {
        Self {
            max_structures: default_max_structures(),
            min_structures_exact: 0,
            convergence_cutoff: 0.0,
            best_survival_cutoff: None,
        }
    }
}

/// `[stop.expected_structure]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedStructureConfig {
    /// Fingerprint of the target structure.
    pub fingerprint: Vec<f64>,
}

/// `[worker]` section: defaults for worker start parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Tags this worker services; empty means everything.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Exit after this many items; `0` means unlimited.
    #[serde(default)]
    pub max_items: usize,

    /// Exit instead of sleeping when the queue is empty.
    #[serde(default)]
    pub stop_when_empty: bool,

    /// Seconds between empty claims.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
}

fn default_poll_interval() -> f64 {
    2.0
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            max_items: 0,
            stop_when_empty: false,
            poll_interval: default_poll_interval(),
        }
    }
}
