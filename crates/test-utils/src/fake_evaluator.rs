use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::json;

use evoqueue::store::WorkPayload;
use evoqueue::worker::{Evaluation, Evaluator};

/// A fake evaluator that:
/// - records every payload it was asked to evaluate
/// - pops scripted outcomes first, then falls back to a success whose
///   fitness comes from the payload's `"fitness"` (or `"seq"`) parameter.
///
/// Clones share the same record and script, so a test can keep one handle
/// while handing clones to several workers.
#[derive(Clone, Default)]
pub struct FakeEvaluator {
    evaluated: Arc<Mutex<Vec<WorkPayload>>>,
    script: Arc<Mutex<VecDeque<Evaluation>>>,
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome to be returned (FIFO) before the default kicks in.
    pub fn push_outcome(&self, outcome: Evaluation) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Payloads evaluated so far, in order.
    pub fn evaluated(&self) -> Vec<WorkPayload> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn evaluated_count(&self) -> usize {
        self.evaluated.lock().unwrap().len()
    }

    fn default_outcome(payload: &WorkPayload) -> Evaluation {
        let fitness = payload
            .params
            .get("fitness")
            .and_then(|v| v.as_f64())
            .or_else(|| payload.params.get("seq").and_then(|v| v.as_f64()))
            .unwrap_or(0.0);
        Evaluation::Success {
            fitness,
            result_data: json!({ "evaluator": "fake" }),
        }
    }
}

impl Evaluator for FakeEvaluator {
    fn evaluate(
        &mut self,
        payload: WorkPayload,
    ) -> Pin<Box<dyn Future<Output = Evaluation> + Send + '_>> {
        let evaluated = Arc::clone(&self.evaluated);
        let script = Arc::clone(&self.script);

        Box::pin(async move {
            evaluated.lock().unwrap().push(payload.clone());
            let scripted = script.lock().unwrap().pop_front();
            match scripted {
                Some(outcome) => outcome,
                None => Self::default_outcome(&payload),
            }
        })
    }
}
