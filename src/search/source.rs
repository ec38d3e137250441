// src/search/source.rs

//! Candidate generation sources and the weighted source registry.
//!
//! Sources are resolved from their configured names exactly once, when the
//! registry is built at search start; after that the registry is immutable
//! for the duration of the run. Per-source steady-state targets come from
//! renormalized weights and explicit round-half-up arithmetic, so the result
//! does not depend on platform rounding defaults.

use std::sync::Arc;

use crate::config::model::{ConfigFile, SourceKindConfig};
use crate::errors::{EvoqueueError, Result};
use crate::search::candidate::{Candidate, CandidateSeed};

/// Whether a source creates candidates from nothing or transforms parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Produces a candidate from nothing (e.g. random generation).
    Creation,
    /// Produces a candidate from `parents` existing candidates.
    Transformation { parents: usize },
}

impl SourceKind {
    pub fn parent_count(&self) -> usize {
        match self {
            SourceKind::Creation => 0,
            SourceKind::Transformation { parents } => *parents,
        }
    }
}

/// A named generation strategy.
///
/// Implementations are opaque to the scheduler: `generate` receives exactly
/// `kind().parent_count()` parents and returns a seed, or an error when the
/// source cannot produce one (the scheduler skips the slot in that case).
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
    fn generate(&self, parents: &[Candidate]) -> Result<CandidateSeed>;
}

/// A registered source with its configured weight.
pub struct SourceEntry {
    pub source: Arc<dyn CandidateSource>,
    pub weight: f64,
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("name", &self.source.name())
            .field("kind", &self.source.kind())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Immutable table of sources for one search run.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source with a positive weight. Names must be unique.
    pub fn register(&mut self, source: Arc<dyn CandidateSource>, weight: f64) -> Result<()> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(EvoqueueError::Config(format!(
                "source '{}' has non-positive weight {weight}",
                source.name()
            )));
        }
        if self.get(source.name()).is_some() {
            return Err(EvoqueueError::Config(format!(
                "source '{}' registered twice",
                source.name()
            )));
        }
        self.entries.push(SourceEntry { source, weight });
        Ok(())
    }

    /// Build the registry by pairing configured source sections with their
    /// implementations. Every configured source must have an implementation
    /// of the declared kind, and every implementation must be configured.
    pub fn from_config(
        cfg: &ConfigFile,
        sources: Vec<Arc<dyn CandidateSource>>,
    ) -> Result<Self> {
        let mut registry = SourceRegistry::new();

        for (name, source_cfg) in cfg.source.iter() {
            let implementation = sources
                .iter()
                .find(|s| s.name() == name)
                .cloned()
                .ok_or_else(|| EvoqueueError::UnknownSource(name.clone()))?;

            let kind_matches = match (source_cfg.kind, implementation.kind()) {
                (SourceKindConfig::Creation, SourceKind::Creation) => true,
                (SourceKindConfig::Transformation, SourceKind::Transformation { .. }) => true,
                _ => false,
            };
            if !kind_matches {
                return Err(EvoqueueError::Config(format!(
                    "source '{name}' is configured as {:?} but implemented as {:?}",
                    source_cfg.kind,
                    implementation.kind()
                )));
            }

            registry.register(implementation, source_cfg.weight)?;
        }

        for source in &sources {
            if registry.get(source.name()).is_none() {
                return Err(EvoqueueError::Config(format!(
                    "source '{}' has no [source.{}] configuration section",
                    source.name(),
                    source.name()
                )));
            }
        }

        if registry.is_empty() {
            return Err(EvoqueueError::Config(
                "at least one source must be configured".to_string(),
            ));
        }

        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.source.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceEntry> {
        self.entries.iter()
    }

    /// Per-source steady-state target for a total in-flight count of
    /// `nsteadystate`.
    ///
    /// Weights are renormalized (`w' = w / Σw`), so they need not sum to 1.
    /// The sum of all targets may differ from `nsteadystate` by up to
    /// `⌈sources/2⌉`; that discrepancy is accepted.
    pub fn target_for(&self, name: &str, nsteadystate: usize) -> Option<usize> {
        let total: f64 = self.entries.iter().map(|e| e.weight).sum();
        let entry = self.get(name)?;
        Some(round_half_up(nsteadystate as f64 * entry.weight / total))
    }

    /// All per-source targets, in registration order.
    pub fn targets(&self, nsteadystate: usize) -> Vec<(&str, usize)> {
        let total: f64 = self.entries.iter().map(|e| e.weight).sum();
        self.entries
            .iter()
            .map(|e| {
                let share = nsteadystate as f64 * e.weight / total;
                (e.source.name(), round_half_up(share))
            })
            .collect()
    }
}

/// Deterministic round-half-up: `.5` boundaries always round toward the
/// larger target.
fn round_half_up(x: f64) -> usize {
    (x + 0.5).floor() as usize
}
