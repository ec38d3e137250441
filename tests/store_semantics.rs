// tests/store_semantics.rs
//
// Shared-store semantics that must hold identically for the in-memory
// double and the SQLite implementation.

mod common;

use common::{TestResult, enqueue_for};

use chrono::{Duration, Utc};
use evoqueue::store::{
    MemoryStore, QueuePolicy, SearchStore, SqliteStore, TagFilter, WorkOutcome,
};
use evoqueue::types::WorkStatus;
use evoqueue_test_utils::init_tracing;
use serde_json::json;

fn sqlite_store(policy: QueuePolicy) -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("queue.db"), policy).expect("open store");
    (dir, store)
}

fn claims_are_fifo<S: SearchStore>(store: &S) -> TestResult {
    let (_, first) = enqueue_for(store, 1.0, "create");
    let (_, second) = enqueue_for(store, 2.0, "create");
    let (_, third) = enqueue_for(store, 3.0, "create");

    let order: Vec<_> = (0..3)
        .map(|_| store.claim("w1", &TagFilter::any()).unwrap().unwrap().id)
        .collect();
    assert_eq!(order, vec![first, second, third]);
    assert!(store.claim("w1", &TagFilter::any())?.is_none());
    Ok(())
}

#[test]
fn claims_are_fifo_memory() -> TestResult {
    init_tracing();
    claims_are_fifo(&MemoryStore::new())
}

#[test]
fn claims_are_fifo_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    claims_are_fifo(&store)
}

fn tag_matching_is_exact<S: SearchStore>(store: &S) -> TestResult {
    let (candidate, _) = enqueue_for(store, 1.0, "create");
    // Re-tag by enqueueing a dedicated item with a custom tag.
    let payload = evoqueue::store::WorkPayload {
        candidate: candidate.id.clone(),
        source: "create".to_string(),
        params: json!({}),
    };
    let request = evoqueue::store::EnqueueRequest::new(payload)
        .with_tags(vec!["X-2".to_string()]);
    let tagged = store.enqueue(request)?;

    // A filter on "X" must not match the item tagged "X-2".
    let filter_x = TagFilter::new(vec!["X".to_string()]);
    let claimed = store.claim("w1", &filter_x)?;
    assert!(claimed.is_none(), "prefix tag must not match");

    let filter_exact = TagFilter::new(vec!["X-2".to_string()]);
    let claimed = store.claim("w1", &filter_exact)?.expect("exact tag matches");
    assert_eq!(claimed.id, tagged);
    Ok(())
}

#[test]
fn tag_matching_is_exact_memory() -> TestResult {
    init_tracing();
    tag_matching_is_exact(&MemoryStore::new())
}

#[test]
fn tag_matching_is_exact_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    tag_matching_is_exact(&store)
}

fn complete_requires_ownership<S: SearchStore>(store: &S) -> TestResult {
    let (_, item) = enqueue_for(store, 1.0, "create");

    let claimed = store.claim("owner", &TagFilter::any())?.unwrap();
    assert_eq!(claimed.id, item);
    assert_eq!(claimed.status, WorkStatus::Claimed);
    assert_eq!(claimed.claimed_by.as_deref(), Some("owner"));

    // A different worker cannot complete the item.
    let outcome = WorkOutcome::Succeeded {
        fitness: 1.0,
        result_data: json!({}),
    };
    let err = store.complete(&item, "thief", outcome.clone()).unwrap_err();
    assert!(matches!(err, evoqueue::errors::EvoqueueError::NotOwned { .. }));

    // The owner can, and the item reaches a terminal state exactly once.
    store.complete(&item, "owner", outcome.clone())?;
    let done = store.work_item(&item)?.unwrap();
    assert_eq!(done.status, WorkStatus::Succeeded);
    assert!(done.finished_at.is_some());

    // Completing again fails: the item is no longer claimed or running.
    assert!(store.complete(&item, "owner", outcome).is_err());
    Ok(())
}

#[test]
fn complete_requires_ownership_memory() -> TestResult {
    init_tracing();
    complete_requires_ownership(&MemoryStore::new())
}

#[test]
fn complete_requires_ownership_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    complete_requires_ownership(&store)
}

fn success_records_candidate_fitness<S: SearchStore>(store: &S) -> TestResult {
    let (candidate, item) = enqueue_for(store, 42.0, "create");
    assert!(store.candidate(&candidate.id)?.unwrap().fitness.is_none());

    store.claim("w1", &TagFilter::any())?.unwrap();
    store.mark_running(&item, "w1")?;
    store.complete(
        &item,
        "w1",
        WorkOutcome::Succeeded {
            fitness: 42.0,
            result_data: json!({ "energy": -1.5 }),
        },
    )?;

    let evaluated = store.candidate(&candidate.id)?.unwrap();
    assert_eq!(evaluated.fitness, Some(42.0));
    assert!(evaluated.evaluated_at.is_some());

    let population = store.evaluated_population()?;
    assert_eq!(population.len(), 1);
    assert_eq!(population[0].id, candidate.id);

    let totals = store.totals()?;
    assert_eq!(totals.created, 1);
    assert_eq!(totals.evaluated, 1);
    Ok(())
}

#[test]
fn success_records_candidate_fitness_memory() -> TestResult {
    init_tracing();
    success_records_candidate_fitness(&MemoryStore::new())
}

#[test]
fn success_records_candidate_fitness_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    success_records_candidate_fitness(&store)
}

fn population_is_sorted_best_first<S: SearchStore>(store: &S) -> TestResult {
    for fitness in [5.0, 1.0, 3.0] {
        let (_, item) = enqueue_for(store, fitness, "create");
        store.claim("w1", &TagFilter::any())?.unwrap();
        store.complete(
            &item,
            "w1",
            WorkOutcome::Succeeded {
                fitness,
                result_data: json!({}),
            },
        )?;
    }

    let fitnesses: Vec<f64> = store
        .evaluated_population()?
        .iter()
        .map(|c| c.fitness.unwrap())
        .collect();
    assert_eq!(fitnesses, vec![1.0, 3.0, 5.0]);
    Ok(())
}

#[test]
fn population_is_sorted_best_first_memory() -> TestResult {
    init_tracing();
    population_is_sorted_best_first(&MemoryStore::new())
}

#[test]
fn population_is_sorted_best_first_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    population_is_sorted_best_first(&store)
}

fn mark_running_requires_claim<S: SearchStore>(store: &S) -> TestResult {
    let (_, item) = enqueue_for(store, 1.0, "create");

    // Not claimed yet.
    assert!(store.mark_running(&item, "w1").is_err());

    store.claim("w1", &TagFilter::any())?.unwrap();
    assert!(store.mark_running(&item, "other").is_err());
    store.mark_running(&item, "w1")?;
    assert_eq!(store.work_item(&item)?.unwrap().status, WorkStatus::Running);
    Ok(())
}

#[test]
fn mark_running_requires_claim_memory() -> TestResult {
    init_tracing();
    mark_running_requires_claim(&MemoryStore::new())
}

#[test]
fn mark_running_requires_claim_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    mark_running_requires_claim(&store)
}

fn expired_leases_are_reassigned<S: SearchStore>(store: &S) -> TestResult {
    let (_, item) = enqueue_for(store, 1.0, "create");

    // First claim: lease expires immediately (zero-length lease).
    let claimed = store.claim("w1", &TagFilter::any())?.unwrap();
    assert!(claimed.lease_expires_at.is_some());

    let later = Utc::now() + Duration::seconds(1);
    assert_eq!(store.release_expired(later)?, 1);

    let released = store.work_item(&item)?.unwrap();
    assert_eq!(released.status, WorkStatus::Waiting);
    assert_eq!(released.claimed_by, None);
    assert_eq!(released.failure_count, 1);

    // The original worker lost the claim.
    let err = store
        .complete(
            &item,
            "w1",
            WorkOutcome::Succeeded {
                fitness: 1.0,
                result_data: json!({}),
            },
        )
        .unwrap_err();
    assert!(matches!(err, evoqueue::errors::EvoqueueError::NotOwned { .. }));

    // Second expiry spends the retry budget (retry_limit = 2): canceled.
    store.claim("w2", &TagFilter::any())?.unwrap();
    let even_later = later + Duration::seconds(1);
    assert_eq!(store.release_expired(even_later)?, 1);

    let canceled = store.work_item(&item)?.unwrap();
    assert_eq!(canceled.status, WorkStatus::Canceled);
    assert!(canceled.failure_reason.is_some());
    Ok(())
}

fn zero_lease_policy() -> QueuePolicy {
    QueuePolicy {
        claim_lease: Some(Duration::zero()),
        retry_limit: 2,
    }
}

#[test]
fn expired_leases_are_reassigned_memory() -> TestResult {
    init_tracing();
    expired_leases_are_reassigned(&MemoryStore::with_policy(zero_lease_policy()))
}

#[test]
fn expired_leases_are_reassigned_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(zero_lease_policy());
    expired_leases_are_reassigned(&store)
}

fn unleased_claims_never_expire<S: SearchStore>(store: &S) -> TestResult {
    let (_, item) = enqueue_for(store, 1.0, "create");
    let claimed = store.claim("w1", &TagFilter::any())?.unwrap();
    assert!(claimed.lease_expires_at.is_none());

    let far_future = Utc::now() + Duration::days(365);
    assert_eq!(store.release_expired(far_future)?, 0);
    assert_eq!(store.work_item(&item)?.unwrap().status, WorkStatus::Claimed);
    Ok(())
}

#[test]
fn unleased_claims_never_expire_memory() -> TestResult {
    init_tracing();
    unleased_claims_never_expire(&MemoryStore::new())
}

#[test]
fn unleased_claims_never_expire_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    unleased_claims_never_expire(&store)
}

fn in_flight_counts_track_sources<S: SearchStore>(store: &S) -> TestResult {
    enqueue_for(store, 1.0, "create");
    enqueue_for(store, 2.0, "create");
    let (_, mutate_item) = enqueue_for(store, 3.0, "mutate");

    assert_eq!(store.in_flight_count("create")?, 2);
    assert_eq!(store.in_flight_count("mutate")?, 1);
    assert_eq!(store.in_flight_total()?, 3);
    assert_eq!(store.active_total()?, 0);

    let filter = TagFilter::new(vec!["mutate".to_string()]);
    store.claim("w1", &filter)?.unwrap();
    assert_eq!(store.in_flight_total()?, 3);
    assert_eq!(store.active_total()?, 1);

    store.complete(
        &mutate_item,
        "w1",
        WorkOutcome::Failed {
            reason: "calculator missing".to_string(),
        },
    )?;
    assert_eq!(store.in_flight_count("mutate")?, 0);
    assert_eq!(store.in_flight_total()?, 2);
    assert_eq!(store.active_total()?, 0);
    Ok(())
}

#[test]
fn in_flight_counts_track_sources_memory() -> TestResult {
    init_tracing();
    in_flight_counts_track_sources(&MemoryStore::new())
}

#[test]
fn in_flight_counts_track_sources_sqlite() -> TestResult {
    init_tracing();
    let (_dir, store) = sqlite_store(QueuePolicy::default());
    in_flight_counts_track_sources(&store)
}
