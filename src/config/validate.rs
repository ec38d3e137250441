// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, SourceKindConfig};
use crate::errors::{EvoqueueError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::EvoqueueError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_sources(cfg)?;
    validate_search(cfg)?;
    validate_selection(cfg)?;
    validate_stop(cfg)?;
    validate_worker(cfg)?;
    Ok(())
}

fn ensure_has_sources(cfg: &RawConfigFile) -> Result<()> {
    if cfg.source.is_empty() {
        return Err(EvoqueueError::Config(
            "config must contain at least one [source.<name>] section".to_string(),
        ));
    }

    let has_creation = cfg
        .source
        .values()
        .any(|s| s.kind == SourceKindConfig::Creation);
    if !has_creation {
        return Err(EvoqueueError::Config(
            "at least one source must have kind = \"creation\" \
             (transformation sources need parents to exist)"
                .to_string(),
        ));
    }

    for (name, source) in cfg.source.iter() {
        if !(source.weight.is_finite() && source.weight > 0.0) {
            return Err(EvoqueueError::Config(format!(
                "[source.{name}].weight must be a positive number (got {})",
                source.weight
            )));
        }
    }
    Ok(())
}

fn validate_search(cfg: &RawConfigFile) -> Result<()> {
    let search = &cfg.search;

    if search.nsteadystate == 0 {
        return Err(EvoqueueError::Config(
            "[search].nsteadystate must be >= 1 (got 0)".to_string(),
        ));
    }
    if !(search.sleep_step.is_finite() && search.sleep_step > 0.0) {
        return Err(EvoqueueError::Config(format!(
            "[search].sleep_step must be a positive number of seconds (got {})",
            search.sleep_step
        )));
    }
    if !(search.similarity_threshold.is_finite() && search.similarity_threshold >= 0.0) {
        return Err(EvoqueueError::Config(format!(
            "[search].similarity_threshold must be >= 0 (got {})",
            search.similarity_threshold
        )));
    }
    if search.max_duplicate_retries == 0 {
        return Err(EvoqueueError::Config(
            "[search].max_duplicate_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    if search.retry_limit == 0 {
        return Err(EvoqueueError::Config(
            "[search].retry_limit must be >= 1 (got 0)".to_string(),
        ));
    }
    if !(search.claim_lease.is_finite() && search.claim_lease >= 0.0) {
        return Err(EvoqueueError::Config(format!(
            "[search].claim_lease must be >= 0 seconds (got {})",
            search.claim_lease
        )));
    }
    Ok(())
}

fn validate_selection(cfg: &RawConfigFile) -> Result<()> {
    let fraction = cfg.selection.truncation_fraction;
    if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
        return Err(EvoqueueError::Config(format!(
            "[selection].truncation_fraction must lie in (0, 1] (got {fraction})"
        )));
    }
    Ok(())
}

fn validate_stop(cfg: &RawConfigFile) -> Result<()> {
    let basic = &cfg.stop.basic;

    if basic.max_structures == 0 {
        return Err(EvoqueueError::Config(
            "[stop.basic].max_structures must be >= 1 (got 0)".to_string(),
        ));
    }
    if !(basic.convergence_cutoff.is_finite() && basic.convergence_cutoff >= 0.0) {
        return Err(EvoqueueError::Config(format!(
            "[stop.basic].convergence_cutoff must be >= 0 (got {})",
            basic.convergence_cutoff
        )));
    }
    if basic.best_survival_cutoff == Some(0) {
        return Err(EvoqueueError::Config(
            "[stop.basic].best_survival_cutoff must be >= 1; \
             omit it to disable convergence stopping"
                .to_string(),
        ));
    }
    if let Some(expected) = &cfg.stop.expected_structure
        && expected.fingerprint.is_empty()
    {
        return Err(EvoqueueError::Config(
            "[stop.expected_structure].fingerprint must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_worker(cfg: &RawConfigFile) -> Result<()> {
    let poll = cfg.worker.poll_interval;
    if !(poll.is_finite() && poll > 0.0) {
        return Err(EvoqueueError::Config(format!(
            "[worker].poll_interval must be a positive number of seconds (got {poll})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::config::model::{
        SearchSection, SelectionSection, SourceConfig, StopSection, WorkerSection,
    };

    fn raw_with_sources(sources: &[(&str, SourceKindConfig, f64)]) -> RawConfigFile {
        let mut map = BTreeMap::new();
        for (name, kind, weight) in sources {
            map.insert(
                name.to_string(),
                SourceConfig {
                    kind: *kind,
                    weight: *weight,
                },
            );
        }
        RawConfigFile {
            search: SearchSection::default(),
            selection: SelectionSection::default(),
            source: map,
            stop: StopSection::default(),
            worker: WorkerSection::default(),
        }
    }

    #[test]
    fn a_creation_source_is_required() {
        let raw = raw_with_sources(&[("mutate", SourceKindConfig::Transformation, 1.0)]);
        assert!(ConfigFile::try_from(raw).is_err());

        let raw = raw_with_sources(&[
            ("random", SourceKindConfig::Creation, 0.7),
            ("mutate", SourceKindConfig::Transformation, 0.3),
        ]);
        assert!(ConfigFile::try_from(raw).is_ok());
    }

    #[test]
    fn empty_source_table_is_rejected() {
        let raw = raw_with_sources(&[]);
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn non_positive_weight_is_rejected() {
        let raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 0.0)]);
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn zero_nsteadystate_is_rejected() {
        let mut raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 1.0)]);
        raw.search.nsteadystate = 0;
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn truncation_fraction_must_be_in_unit_interval() {
        let mut raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 1.0)]);
        raw.selection.truncation_fraction = 1.5;
        assert!(ConfigFile::try_from(raw).is_err());

        let mut raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 1.0)]);
        raw.selection.truncation_fraction = 1.0;
        assert!(ConfigFile::try_from(raw).is_ok());
    }

    #[test]
    fn zero_survival_cutoff_is_rejected() {
        let mut raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 1.0)]);
        raw.stop.basic.best_survival_cutoff = Some(0);
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn zero_claim_lease_disables_leasing() {
        let mut raw = raw_with_sources(&[("random", SourceKindConfig::Creation, 1.0)]);
        raw.search.claim_lease = 0.0;
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert!(cfg.queue_policy().claim_lease.is_none());
    }
}
