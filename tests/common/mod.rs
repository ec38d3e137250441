// tests/common/mod.rs

#![allow(dead_code)]

use serde_json::json;

use evoqueue::search::candidate::{Candidate, Fingerprint};
use evoqueue::store::{CandidateStore, EnqueueRequest, SearchStore, WorkPayload};
use evoqueue::types::WorkItemId;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Insert an unevaluated candidate with fingerprint `[value]`.
pub fn seed_candidate<S: CandidateStore>(store: &S, value: f64, source: &str) -> Candidate {
    let candidate = Candidate::new(Fingerprint::new(vec![value]), source, Vec::new());
    store.insert_candidate(&candidate).expect("insert candidate");
    candidate
}

/// Insert a candidate and enqueue one work item for it. The payload carries
/// `{"fitness": value}` so the fake evaluator scores it with `value`.
pub fn enqueue_for<S: SearchStore>(
    store: &S,
    value: f64,
    source: &str,
) -> (Candidate, WorkItemId) {
    let candidate = seed_candidate(store, value, source);
    let payload = WorkPayload {
        candidate: candidate.id.clone(),
        source: source.to_string(),
        params: json!({ "fitness": value }),
    };
    let item = store
        .enqueue(EnqueueRequest::new(payload))
        .expect("enqueue item");
    (candidate, item)
}
