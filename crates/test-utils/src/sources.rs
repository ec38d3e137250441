//! Deterministic candidate sources for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use evoqueue::errors::Result;
use evoqueue::search::candidate::{Candidate, CandidateSeed, Fingerprint};
use evoqueue::search::source::{CandidateSource, SourceKind};

/// Creation source producing evenly spaced fingerprints `[offset + n]`.
///
/// Each generated seed carries `{"seq": n, "fitness": offset + n}` so the
/// [`crate::fake_evaluator::FakeEvaluator`] scores candidate `n` with
/// fitness `offset + n`: the first candidate is the best.
pub struct SequenceSource {
    name: String,
    offset: f64,
    counter: AtomicU64,
}

impl SequenceSource {
    pub fn new(name: &str) -> Self {
        Self::with_offset(name, 0.0)
    }

    pub fn with_offset(name: &str, offset: f64) -> Self {
        Self {
            name: name.to_string(),
            offset,
            counter: AtomicU64::new(0),
        }
    }

    pub fn generated(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl CandidateSource for SequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Creation
    }

    fn generate(&self, _parents: &[Candidate]) -> Result<CandidateSeed> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let value = self.offset + n as f64;
        Ok(CandidateSeed::new(
            Fingerprint::new(vec![value]),
            json!({ "seq": n, "fitness": value }),
        ))
    }
}

/// Transformation source nudging one parent's fingerprint by a small,
/// per-call-unique offset.
///
/// The generated fitness is the parent's first fingerprint component minus
/// the offset, so mutations improve slightly on their parents.
pub struct JitterMutationSource {
    name: String,
    step: f64,
    counter: AtomicU64,
}

impl JitterMutationSource {
    pub fn new(name: &str) -> Self {
        Self::with_step(name, 0.01)
    }

    pub fn with_step(name: &str, step: f64) -> Self {
        Self {
            name: name.to_string(),
            step,
            counter: AtomicU64::new(0),
        }
    }

    pub fn generated(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl CandidateSource for JitterMutationSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Transformation { parents: 1 }
    }

    fn generate(&self, parents: &[Candidate]) -> Result<CandidateSeed> {
        let parent = parents
            .first()
            .ok_or_else(|| anyhow::anyhow!("jitter source needs exactly one parent"))?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let offset = self.step * (n + 1) as f64;
        let base = parent.fingerprint.values().first().copied().unwrap_or(0.0);
        let value = base + offset;
        Ok(CandidateSeed::new(
            Fingerprint::new(vec![value]),
            json!({ "seq": n, "fitness": base - offset }),
        ))
    }
}

/// Creation source that always emits the same fingerprint; everything after
/// the first accepted candidate is a duplicate.
pub struct ConstantSource {
    name: String,
    fingerprint: Vec<f64>,
}

impl ConstantSource {
    pub fn new(name: &str, fingerprint: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            fingerprint,
        }
    }
}

impl CandidateSource for ConstantSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Creation
    }

    fn generate(&self, _parents: &[Candidate]) -> Result<CandidateSeed> {
        Ok(CandidateSeed::new(
            Fingerprint::new(self.fingerprint.clone()),
            json!({ "fitness": 0.0 }),
        ))
    }
}

/// Creation source whose `generate` always fails.
pub struct BrokenSource {
    name: String,
}

impl BrokenSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl CandidateSource for BrokenSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Creation
    }

    fn generate(&self, _parents: &[Candidate]) -> Result<CandidateSeed> {
        Err(anyhow::anyhow!("this source never produces a candidate").into())
    }
}
