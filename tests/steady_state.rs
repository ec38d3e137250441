// tests/steady_state.rs
//
// Steady-state replenishment: per-source targets, the in-flight bound,
// duplicate rejection, and transformation gating.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use common::TestResult;
use evoqueue::config::ConfigFile;
use evoqueue::search::dedup::DuplicateValidator;
use evoqueue::search::scheduler::SteadyStateScheduler;
use evoqueue::search::selector::Selector;
use evoqueue::search::source::{CandidateSource, SourceRegistry};
use evoqueue::store::{MemoryStore, TagFilter, WorkOutcome, WorkQueue};
use evoqueue_test_utils::builders::ConfigFileBuilder;
use evoqueue_test_utils::init_tracing;
use evoqueue_test_utils::sources::{BrokenSource, ConstantSource, JitterMutationSource, SequenceSource};

fn scheduler_for(
    cfg: &ConfigFile,
    store: Arc<MemoryStore>,
    sources: Vec<Arc<dyn CandidateSource>>,
) -> SteadyStateScheduler<MemoryStore> {
    let registry = SourceRegistry::from_config(cfg, sources).expect("registry from config");
    SteadyStateScheduler::new(
        store,
        registry,
        Selector::new(cfg.selection.truncation_fraction),
        DuplicateValidator::new(cfg.search.similarity_threshold),
        cfg.search.nsteadystate,
        cfg.search.max_duplicate_retries,
    )
}

fn create_and_mutate_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_creation_source("create", 0.7)
        .with_transformation_source("mutate", 0.3)
        .with_nsteadystate(10)
        .build()
}

#[test]
fn transformation_sources_wait_for_the_first_evaluation() -> TestResult {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let cfg = create_and_mutate_config();
    let scheduler = scheduler_for(
        &cfg,
        Arc::clone(&store),
        vec![
            Arc::new(SequenceSource::new("create")),
            Arc::new(JitterMutationSource::new("mutate")),
        ],
    );

    // Empty population: only creation work may be issued.
    let report = scheduler.replenish()?;
    assert_eq!(report.enqueued, 7);
    assert_eq!(store.in_flight_count("create")?, 7);
    assert_eq!(store.in_flight_count("mutate")?, 0);

    // Evaluate one creation candidate.
    let item = store.claim("w1", &TagFilter::any())?.unwrap();
    store.complete(
        &item.id,
        "w1",
        WorkOutcome::Succeeded {
            fitness: 1.0,
            result_data: json!({}),
        },
    )?;

    // Now the mutate source has parents to draw from.
    scheduler.replenish()?;
    assert_eq!(store.in_flight_count("create")?, 7);
    assert_eq!(store.in_flight_count("mutate")?, 3);
    Ok(())
}

#[test]
fn replenish_never_exceeds_the_steady_state_bound() -> TestResult {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let cfg = create_and_mutate_config();
    let scheduler = scheduler_for(
        &cfg,
        Arc::clone(&store),
        vec![
            Arc::new(SequenceSource::new("create")),
            Arc::new(JitterMutationSource::new("mutate")),
        ],
    );

    // Tolerance: ⌈sources/2⌉ = 1 on top of N = 10.
    for _ in 0..5 {
        scheduler.replenish()?;
        assert!(store.in_flight_total()? <= 11);
    }
    // With no completions, repeated replenishment adds nothing.
    assert_eq!(store.in_flight_count("create")?, 7);
    assert_eq!(store.in_flight_count("mutate")?, 0);
    Ok(())
}

#[test]
fn duplicate_candidates_are_never_enqueued() -> TestResult {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let cfg = ConfigFileBuilder::new()
        .with_creation_source("constant", 1.0)
        .with_nsteadystate(5)
        .build();
    let scheduler = scheduler_for(
        &cfg,
        Arc::clone(&store),
        vec![Arc::new(ConstantSource::new("constant", vec![1.0, 2.0]))],
    );

    let report = scheduler.replenish()?;
    assert_eq!(report.enqueued, 1, "only the first copy is accepted");
    assert!(report.duplicates_discarded > 0);
    assert_eq!(store.in_flight_total()?, 1);

    let report = scheduler.replenish()?;
    assert_eq!(report.enqueued, 0);
    assert_eq!(store.in_flight_total()?, 1);
    Ok(())
}

#[test]
fn a_failing_source_skips_its_slots_without_erroring() -> TestResult {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let cfg = ConfigFileBuilder::new()
        .with_creation_source("broken", 1.0)
        .with_nsteadystate(4)
        .build();
    let scheduler = scheduler_for(
        &cfg,
        Arc::clone(&store),
        vec![Arc::new(BrokenSource::new("broken"))],
    );

    let report = scheduler.replenish()?;
    assert_eq!(report.enqueued, 0);
    assert_eq!(report.slots_skipped, 4);
    assert_eq!(store.in_flight_total()?, 0);
    Ok(())
}

fn registry_with_weights(weights: &[f64]) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for (i, weight) in weights.iter().enumerate() {
        registry
            .register(Arc::new(SequenceSource::new(&format!("s{i}"))), *weight)
            .expect("register source");
    }
    registry
}

proptest! {
    // Σ round(N * w_i / Σw) stays within ⌈sources/2⌉ of N.
    #[test]
    fn renormalized_targets_stay_near_the_steady_state(
        weights in proptest::collection::vec(0.01f64..100.0, 1..8),
        n in 1usize..100,
    ) {
        let registry = registry_with_weights(&weights);
        let sum: usize = registry.targets(n).iter().map(|(_, t)| t).sum();
        let tolerance = registry.len().div_ceil(2);
        prop_assert!(
            sum.abs_diff(n) <= tolerance,
            "n={n} sum={sum} tolerance={tolerance} weights={weights:?}"
        );
    }

    // A source's target is monotonically non-decreasing in its own weight,
    // holding the others fixed.
    #[test]
    fn a_sources_share_grows_with_its_weight(
        weights in proptest::collection::vec(0.01f64..100.0, 2..8),
        n in 1usize..100,
    ) {
        let registry = registry_with_weights(&weights);
        let before = registry.target_for("s0", n).unwrap();

        let mut raised = weights.clone();
        raised[0] *= 2.0;
        let registry = registry_with_weights(&raised);
        let after = registry.target_for("s0", n).unwrap();

        prop_assert!(after >= before, "doubling w0 shrank its target: {before} -> {after}");
    }
}
