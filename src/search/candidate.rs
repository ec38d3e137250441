// src/search/candidate.rs

//! Candidate individuals and their fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CandidateId, SourceName};

/// Derived descriptor of a candidate used for duplicate comparison.
///
/// Two fingerprints within the configured similarity threshold are treated
/// as the same individual regardless of which source produced them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<f64>);

impl Fingerprint {
    pub fn new(values: Vec<f64>) -> Self {
        Fingerprint(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Euclidean distance, or `None` when the dimensionalities differ.
    ///
    /// Fingerprints of different length describe incomparable descriptors
    /// and are never the same individual.
    pub fn distance(&self, other: &Fingerprint) -> Option<f64> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let sum: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }

    /// Whether `other` lies within `threshold` of this fingerprint.
    pub fn within(&self, other: &Fingerprint, threshold: f64) -> bool {
        match self.distance(other) {
            Some(d) => d <= threshold,
            None => false,
        }
    }
}

/// What a source produces: a fingerprint plus opaque evaluator parameters.
///
/// The scheduler assigns identity, parent links, and timestamps when it
/// accepts the seed into the store.
#[derive(Debug, Clone)]
pub struct CandidateSeed {
    pub fingerprint: Fingerprint,
    /// Opaque parameters forwarded to the external evaluator.
    pub params: serde_json::Value,
}

impl CandidateSeed {
    pub fn new(fingerprint: Fingerprint, params: serde_json::Value) -> Self {
        Self {
            fingerprint,
            params,
        }
    }
}

/// A generated structure/individual subject to evaluation.
///
/// Immutable once fitness is recorded; never deleted (history is required
/// for convergence checks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub fingerprint: Fingerprint,
    /// Lower is better by convention; `None` until evaluated.
    pub fitness: Option<f64>,
    /// Name of the source that produced this candidate.
    pub source: SourceName,
    /// Parent candidate ids; empty for creation sources.
    pub parents: Vec<CandidateId>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(
        fingerprint: Fingerprint,
        source: impl Into<SourceName>,
        parents: Vec<CandidateId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint,
            fitness: None,
            source: source.into(),
            parents,
            created_at: Utc::now(),
            evaluated_at: None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Fingerprint::new(vec![0.0, 0.0]);
        let b = Fingerprint::new(vec![3.0, 4.0]);
        assert_eq!(a.distance(&b), Some(5.0));
    }

    #[test]
    fn mismatched_dimensions_are_never_within_threshold() {
        let a = Fingerprint::new(vec![1.0]);
        let b = Fingerprint::new(vec![1.0, 0.0]);
        assert_eq!(a.distance(&b), None);
        assert!(!a.within(&b, f64::MAX));
    }

    #[test]
    fn within_is_inclusive_of_the_threshold() {
        let a = Fingerprint::new(vec![0.0]);
        let b = Fingerprint::new(vec![0.5]);
        assert!(a.within(&b, 0.5));
        assert!(!a.within(&b, 0.499));
    }
}
