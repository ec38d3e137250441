// src/search/dedup.rs

//! Duplicate detection against all known fingerprints.

use crate::errors::Result;
use crate::search::candidate::Fingerprint;
use crate::store::CandidateStore;

/// Compares a freshly generated fingerprint against every fingerprint the
/// store knows about: evaluated candidates and candidates still in flight.
///
/// A duplicate is not an error; the scheduler silently discards the seed and
/// regenerates, bounded by its per-cycle retry count.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateValidator {
    similarity_threshold: f64,
}

impl DuplicateValidator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn is_duplicate<S>(&self, fingerprint: &Fingerprint, store: &S) -> Result<bool>
    where
        S: CandidateStore + ?Sized,
    {
        let known = store.fingerprints()?;
        Ok(known
            .iter()
            .any(|existing| existing.within(fingerprint, self.similarity_threshold)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::candidate::Candidate;
    use crate::store::MemoryStore;

    #[test]
    fn nearby_fingerprints_are_duplicates() {
        let store = MemoryStore::new();
        let candidate = Candidate::new(Fingerprint::new(vec![1.0, 2.0]), "create", Vec::new());
        store.insert_candidate(&candidate).unwrap();

        let validator = DuplicateValidator::new(1e-3);
        let near = Fingerprint::new(vec![1.0, 2.0 + 1e-4]);
        let far = Fingerprint::new(vec![1.0, 3.0]);

        assert!(validator.is_duplicate(&near, &store).unwrap());
        assert!(!validator.is_duplicate(&far, &store).unwrap());
    }

    #[test]
    fn unevaluated_candidates_still_count_as_known() {
        // An in-flight candidate (no fitness yet) must block near-identical
        // work from entering the queue a second time.
        let store = MemoryStore::new();
        let in_flight = Candidate::new(Fingerprint::new(vec![0.5]), "create", Vec::new());
        store.insert_candidate(&in_flight).unwrap();

        let validator = DuplicateValidator::new(1e-6);
        assert!(
            validator
                .is_duplicate(&Fingerprint::new(vec![0.5]), &store)
                .unwrap()
        );
    }

    #[test]
    fn empty_store_has_no_duplicates() {
        let store = MemoryStore::new();
        let validator = DuplicateValidator::new(1.0);
        assert!(
            !validator
                .is_duplicate(&Fingerprint::new(vec![0.0]), &store)
                .unwrap()
        );
    }
}
