// src/worker/evaluator.rs

//! External evaluator contract.
//!
//! The worker talks to an `Evaluator` instead of a concrete calculator
//! binary. This keeps the scientific evaluation logic outside the crate and
//! makes it easy to swap in a fake evaluator in tests, the same way the
//! worker loop itself is driven through the store traits.

use std::future::Future;
use std::pin::Pin;

use crate::store::WorkPayload;

/// What one evaluation produced.
///
/// Failures are data, not errors: the worker classifies them into retries
/// or terminal cancellation. `result_data` is opaque to the scheduler core.
#[derive(Debug, Clone)]
pub enum Evaluation {
    Success {
        fitness: f64,
        result_data: serde_json::Value,
    },
    Failure {
        reason: String,
    },
}

/// Trait abstracting the external "evaluate candidate" call.
///
/// The returned future may run for a very long time (external calculations
/// take seconds to days); the worker holds no lock while awaiting it beyond
/// its own claim on the work item.
pub trait Evaluator: Send {
    fn evaluate(
        &mut self,
        payload: WorkPayload,
    ) -> Pin<Box<dyn Future<Output = Evaluation> + Send + '_>>;
}
