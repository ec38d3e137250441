// src/store/memory.rs

//! In-memory store double.
//!
//! Same observable semantics as the SQLite store, behind one mutex. Used by
//! tests and simulations; the mutex stands in for the database's atomicity,
//! not for any cross-process guarantee.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{EvoqueueError, Result};
use crate::search::candidate::{Candidate, Fingerprint};
use crate::store::{
    CandidateStore, CandidateTotals, EnqueueRequest, QueuePolicy, TagFilter, WorkItem,
    WorkOutcome, WorkQueue,
};
use crate::types::{CandidateId, WorkItemId, WorkStatus};

#[derive(Debug, Default)]
struct Inner {
    /// Items in creation order; claim scans front to back (FIFO).
    items: Vec<WorkItem>,
    candidates: HashMap<CandidateId, Candidate>,
    /// Candidate insertion order, for stable iteration.
    candidate_order: Vec<CandidateId>,
    /// Candidate ids in the order their evaluations completed.
    evaluation_order: Vec<CandidateId>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    policy: QueuePolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: QueuePolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            policy,
        }
    }
}

impl WorkQueue for MemoryStore {
    fn enqueue(&self, request: EnqueueRequest) -> Result<WorkItemId> {
        let mut inner = self.inner.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        inner.items.push(WorkItem {
            id: id.clone(),
            candidate: request.payload.candidate.clone(),
            source: request.payload.source.clone(),
            payload: request.payload,
            status: WorkStatus::Waiting,
            tags: request.tags,
            claimed_by: None,
            failure_count: request.failure_count,
            created_at: Utc::now(),
            finished_at: None,
            lease_expires_at: None,
            result_data: None,
            failure_reason: None,
        });
        Ok(id)
    }

    fn claim(&self, worker: &str, filter: &TagFilter) -> Result<Option<WorkItem>> {
        let mut inner = self.inner.lock().unwrap();
        let lease = self.policy.claim_lease.map(|d| Utc::now() + d);

        let item = inner
            .items
            .iter_mut()
            .find(|i| i.status == WorkStatus::Waiting && filter.matches(&i.tags));

        match item {
            Some(item) => {
                item.status = WorkStatus::Claimed;
                item.claimed_by = Some(worker.to_string());
                item.lease_expires_at = lease;
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }

    fn mark_running(&self, item: &str, worker: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let found = inner.items.iter_mut().find(|i| {
            i.id == item
                && i.status == WorkStatus::Claimed
                && i.claimed_by.as_deref() == Some(worker)
        });
        match found {
            Some(found) => {
                found.status = WorkStatus::Running;
                Ok(())
            }
            None => Err(EvoqueueError::NotOwned {
                item: item.to_string(),
                worker: worker.to_string(),
            }),
        }
    }

    fn complete(&self, item: &str, worker: &str, outcome: WorkOutcome) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let found = inner.items.iter_mut().find(|i| {
            i.id == item
                && matches!(i.status, WorkStatus::Claimed | WorkStatus::Running)
                && i.claimed_by.as_deref() == Some(worker)
        });
        let Some(found) = found else {
            return Err(EvoqueueError::NotOwned {
                item: item.to_string(),
                worker: worker.to_string(),
            });
        };

        found.status = outcome.status();
        found.finished_at = Some(now);
        let candidate_id = found.candidate.clone();
        let mut evaluated = None;
        match outcome {
            WorkOutcome::Succeeded {
                fitness,
                result_data,
            } => {
                found.result_data = Some(result_data);
                evaluated = Some(fitness);
            }
            WorkOutcome::Failed { reason } | WorkOutcome::Canceled { reason } => {
                found.failure_reason = Some(reason);
            }
        }

        if let Some(fitness) = evaluated
            && let Some(candidate) = inner.candidates.get_mut(&candidate_id)
            && candidate.fitness.is_none()
        {
            candidate.fitness = Some(fitness);
            candidate.evaluated_at = Some(now);
            inner.evaluation_order.push(candidate_id);
        }
        Ok(())
    }

    fn release_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let retry_limit = self.policy.retry_limit;
        let mut touched = 0;

        for item in inner.items.iter_mut() {
            let expired = matches!(item.status, WorkStatus::Claimed | WorkStatus::Running)
                && item.lease_expires_at.is_some_and(|lease| lease <= now);
            if !expired {
                continue;
            }
            touched += 1;
            item.claimed_by = None;
            item.lease_expires_at = None;
            if item.failure_count + 1 >= retry_limit {
                item.status = WorkStatus::Canceled;
                item.finished_at = Some(now);
                item.failure_reason =
                    Some("claim lease expired; retry budget spent".to_string());
            } else {
                item.status = WorkStatus::Waiting;
                item.failure_count += 1;
            }
        }
        Ok(touched)
    }

    fn work_item(&self, item: &str) -> Result<Option<WorkItem>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.items.iter().find(|i| i.id == item).cloned())
    }

    fn in_flight_count(&self, source: &str) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .filter(|i| i.source == source && i.status.is_in_flight())
            .count())
    }

    fn in_flight_total(&self) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.items.iter().filter(|i| i.status.is_in_flight()).count())
    }

    fn active_total(&self) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .iter()
            .filter(|i| matches!(i.status, WorkStatus::Claimed | WorkStatus::Running))
            .count())
    }
}

impl CandidateStore for MemoryStore {
    fn insert_candidate(&self, candidate: &Candidate) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.candidates.contains_key(&candidate.id) {
            inner.candidate_order.push(candidate.id.clone());
        }
        inner
            .candidates
            .insert(candidate.id.clone(), candidate.clone());
        // A candidate inserted with fitness already recorded (test setups)
        // still needs a slot in the evaluation order.
        if candidate.is_evaluated() {
            let already_ordered = inner.evaluation_order.contains(&candidate.id);
            if !already_ordered {
                inner.evaluation_order.push(candidate.id.clone());
            }
        }
        Ok(())
    }

    fn candidate(&self, id: &str) -> Result<Option<Candidate>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.candidates.get(id).cloned())
    }

    fn evaluated_population(&self) -> Result<Vec<Candidate>> {
        let inner = self.inner.lock().unwrap();
        let mut population: Vec<Candidate> = inner
            .evaluation_order
            .iter()
            .filter_map(|id| inner.candidates.get(id))
            .cloned()
            .collect();
        population.sort_by(|a, b| {
            a.fitness
                .partial_cmp(&b.fitness)
                .unwrap_or(Ordering::Equal)
        });
        Ok(population)
    }

    fn evaluations_in_order(&self) -> Result<Vec<Candidate>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .evaluation_order
            .iter()
            .filter_map(|id| inner.candidates.get(id))
            .cloned()
            .collect())
    }

    fn fingerprints(&self) -> Result<Vec<Fingerprint>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .candidate_order
            .iter()
            .filter_map(|id| inner.candidates.get(id))
            .map(|c| c.fingerprint.clone())
            .collect())
    }

    fn totals(&self) -> Result<CandidateTotals> {
        let inner = self.inner.lock().unwrap();
        Ok(CandidateTotals {
            created: inner.candidates.len(),
            evaluated: inner.evaluation_order.len(),
        })
    }
}
