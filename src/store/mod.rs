// src/store/mod.rs

//! The shared store: work queue plus candidate history.
//!
//! This is the only shared mutable resource in the whole system. Worker
//! processes and the controller coordinate exclusively through it; there is
//! no process-to-process communication and no in-process lock protecting
//! cross-process state. Every status mutation is a conditional update keyed
//! on "current owner + current status", so a lost race surfaces as
//! [`EvoqueueError::NotOwned`] (or simply as claiming a different item),
//! never as corrupted state.
//!
//! - [`sqlite`] is the production implementation on a shared SQLite file.
//! - [`memory`] is an in-process double with identical observable semantics,
//!   used by tests and simulations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::search::candidate::{Candidate, Fingerprint};
use crate::types::{CandidateId, SourceName, WorkItemId, WorkStatus, WorkerId};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Tag present on every scheduled unit of work.
pub const GLOBAL_TAG: &str = "evoqueue";

/// Work-type tag for candidate evaluations.
pub const WORK_TYPE_TAG: &str = "evaluate";

/// Default tag set for one scheduled unit of work:
/// `{global tag, work type, source name, full work name}`.
///
/// Tags always match by exact set membership, so a worker filtering on
/// tag `X` never picks up an item tagged `X-2`.
pub fn default_tags(source: &str, candidate: &str) -> Vec<String> {
    vec![
        GLOBAL_TAG.to_string(),
        WORK_TYPE_TAG.to_string(),
        source.to_string(),
        format!("{WORK_TYPE_TAG}:{source}:{candidate}"),
    ]
}

/// Opaque parameters handed to the external evaluator, plus the identity of
/// the candidate being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPayload {
    pub candidate: CandidateId,
    pub source: SourceName,
    /// Evaluator parameters; the queue never interprets these.
    pub params: serde_json::Value,
}

/// Request to enqueue one unit of work.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub payload: WorkPayload,
    pub tags: Vec<String>,
    /// Failures already accumulated by this logical unit of work. Fresh
    /// items start at zero; retry items carry the predecessor's count + 1.
    pub failure_count: u32,
}

impl EnqueueRequest {
    pub fn new(payload: WorkPayload) -> Self {
        let tags = default_tags(&payload.source, &payload.candidate);
        Self {
            payload,
            tags,
            failure_count: 0,
        }
    }

    /// Override the default tag set.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// A fresh item retrying the same logical unit of work as `item`.
    pub fn retry_of(item: &WorkItem) -> Self {
        Self {
            payload: item.payload.clone(),
            tags: item.tags.clone(),
            failure_count: item.failure_count + 1,
        }
    }
}

/// One schedulable unit of evaluation work as tracked by the store.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub candidate: CandidateId,
    pub source: SourceName,
    pub payload: WorkPayload,
    pub status: WorkStatus,
    pub tags: Vec<String>,
    pub claimed_by: Option<WorkerId>,
    pub failure_count: u32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set on claim; an expired lease lets `release_expired` reassign the
    /// item. `None` means the claim never expires.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub result_data: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
}

/// Terminal outcome reported through [`WorkQueue::complete`].
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    /// The evaluation finished; the store records the candidate's fitness in
    /// the same transaction that closes the item.
    Succeeded {
        fitness: f64,
        result_data: serde_json::Value,
    },
    /// Transient failure; the worker enqueues a fresh retry item separately.
    Failed { reason: String },
    /// The logical unit of work is abandoned for good.
    Canceled { reason: String },
}

impl WorkOutcome {
    pub fn status(&self) -> WorkStatus {
        match self {
            WorkOutcome::Succeeded { .. } => WorkStatus::Succeeded,
            WorkOutcome::Failed { .. } => WorkStatus::Failed,
            WorkOutcome::Canceled { .. } => WorkStatus::Canceled,
        }
    }
}

/// Which items a claimer is willing to service.
///
/// An empty filter matches every item; otherwise an item is eligible when
/// its tag set intersects the filter (exact string equality).
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    tags: Vec<String>,
}

impl TagFilter {
    /// Matches every item.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    pub fn is_any(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn matches(&self, item_tags: &[String]) -> bool {
        self.is_any() || item_tags.iter().any(|t| self.tags.contains(t))
    }
}

/// Lease and retry policy applied by a store.
#[derive(Debug, Clone, Copy)]
pub struct QueuePolicy {
    /// How long a claim may sit unfinished before `release_expired` may
    /// reassign it. `None` disables leasing.
    pub claim_lease: Option<Duration>,
    /// Total evaluation attempts per logical unit of work before a release
    /// cancels instead of requeueing.
    pub retry_limit: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            claim_lease: None,
            retry_limit: 2,
        }
    }
}

/// Store-wide candidate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateTotals {
    /// Candidates ever created (evaluated or still queued).
    pub created: usize,
    /// Candidates with a recorded fitness.
    pub evaluated: usize,
}

/// The work queue half of the shared store.
///
/// `claim` is the single correctness-critical primitive: it must be atomic
/// with respect to concurrent callers, so that two simultaneous claimers
/// never both receive the same item.
pub trait WorkQueue: Send + Sync {
    /// Create a new `waiting` item. Fails only with a storage error.
    fn enqueue(&self, request: EnqueueRequest) -> Result<WorkItemId>;

    /// Atomically claim the oldest eligible `waiting` item, or `None`
    /// without blocking when nothing is eligible. FIFO by creation time.
    fn claim(&self, worker: &str, filter: &TagFilter) -> Result<Option<WorkItem>>;

    /// `claimed → running`; `NotOwned` when the caller lost the claim.
    fn mark_running(&self, item: &str, worker: &str) -> Result<()>;

    /// Transition an owned claimed/running item to a terminal state and
    /// record its result data. `NotOwned` when the caller lost the claim
    /// (e.g. the item was reassigned after a lease timeout).
    fn complete(&self, item: &str, worker: &str, outcome: WorkOutcome) -> Result<()>;

    /// Return expired claimed/running items to `waiting` (owner cleared,
    /// failure count incremented), cancelling those that have spent their
    /// retry budget. Returns how many items were touched.
    fn release_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Fetch a single item by id.
    fn work_item(&self, item: &str) -> Result<Option<WorkItem>>;

    /// In-flight (`waiting`+`claimed`+`running`) items produced by `source`.
    fn in_flight_count(&self, source: &str) -> Result<usize>;

    /// In-flight items across all sources.
    fn in_flight_total(&self) -> Result<usize>;

    /// Claimed or running items: work some worker is actively holding.
    fn active_total(&self) -> Result<usize>;
}

/// The candidate-history half of the shared store.
pub trait CandidateStore: Send + Sync {
    fn insert_candidate(&self, candidate: &Candidate) -> Result<()>;

    fn candidate(&self, id: &str) -> Result<Option<Candidate>>;

    /// Evaluated candidates ordered by fitness ascending (best first).
    fn evaluated_population(&self) -> Result<Vec<Candidate>>;

    /// Evaluated candidates ordered by completion time; used to replay
    /// history into the stop-condition evaluator.
    fn evaluations_in_order(&self) -> Result<Vec<Candidate>>;

    /// Every fingerprint ever stored, evaluated or in flight.
    fn fingerprints(&self) -> Result<Vec<Fingerprint>>;

    fn totals(&self) -> Result<CandidateTotals>;
}

/// Everything the search controller needs from the shared store.
pub trait SearchStore: WorkQueue + CandidateStore {}

impl<T: WorkQueue + CandidateStore> SearchStore for T {}
