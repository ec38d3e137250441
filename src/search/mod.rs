// src/search/mod.rs

//! Evolutionary search core.
//!
//! - [`candidate`] defines individuals and their fingerprints.
//! - [`source`] defines generation strategies and the weighted registry.
//! - [`selector`] picks parents for transformation sources.
//! - [`dedup`] rejects near-identical candidates before they reach the queue.
//! - [`scheduler`] keeps the steady-state number of evaluations in flight.
//! - [`stop`] decides when the search is done.

pub mod candidate;
pub mod dedup;
pub mod scheduler;
pub mod selector;
pub mod source;
pub mod stop;

pub use candidate::{Candidate, CandidateSeed, Fingerprint};
pub use dedup::DuplicateValidator;
pub use scheduler::{ReplenishReport, SteadyStateScheduler};
pub use selector::Selector;
pub use source::{CandidateSource, SourceKind, SourceRegistry};
pub use stop::{SearchState, StopConditionEvaluator, StopConfig};
