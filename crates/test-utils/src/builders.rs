#![allow(dead_code)]

use std::collections::BTreeMap;

use evoqueue::config::{
    BasicStopConfig, ConfigFile, ExpectedStructureConfig, RawConfigFile, SearchSection,
    SelectionSection, SourceConfig, SourceKindConfig, StopSection, WorkerSection,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                search: SearchSection::default(),
                selection: SelectionSection::default(),
                source: BTreeMap::new(),
                stop: StopSection::default(),
                worker: WorkerSection::default(),
            },
        }
    }

    pub fn with_creation_source(mut self, name: &str, weight: f64) -> Self {
        self.config.source.insert(
            name.to_string(),
            SourceConfig {
                kind: SourceKindConfig::Creation,
                weight,
            },
        );
        self
    }

    pub fn with_transformation_source(mut self, name: &str, weight: f64) -> Self {
        self.config.source.insert(
            name.to_string(),
            SourceConfig {
                kind: SourceKindConfig::Transformation,
                weight,
            },
        );
        self
    }

    pub fn with_nsteadystate(mut self, n: usize) -> Self {
        self.config.search.nsteadystate = n;
        self
    }

    pub fn with_sleep_step(mut self, seconds: f64) -> Self {
        self.config.search.sleep_step = seconds;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.search.similarity_threshold = threshold;
        self
    }

    pub fn with_max_duplicate_retries(mut self, retries: usize) -> Self {
        self.config.search.max_duplicate_retries = retries;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.config.search.retry_limit = limit;
        self
    }

    pub fn with_claim_lease(mut self, seconds: f64) -> Self {
        self.config.search.claim_lease = seconds;
        self
    }

    pub fn with_truncation_fraction(mut self, fraction: f64) -> Self {
        self.config.selection.truncation_fraction = fraction;
        self
    }

    pub fn with_basic_stop(mut self, basic: BasicStopConfig) -> Self {
        self.config.stop.basic = basic;
        self
    }

    pub fn with_max_structures(mut self, max: usize) -> Self {
        self.config.stop.basic.max_structures = max;
        self
    }

    pub fn with_min_structures_exact(mut self, min: usize) -> Self {
        self.config.stop.basic.min_structures_exact = min;
        self
    }

    pub fn with_convergence(mut self, cutoff: f64, survival: usize) -> Self {
        self.config.stop.basic.convergence_cutoff = cutoff;
        self.config.stop.basic.best_survival_cutoff = Some(survival);
        self
    }

    pub fn with_expected_structure(mut self, fingerprint: Vec<f64>) -> Self {
        self.config.stop.expected_structure = Some(ExpectedStructureConfig { fingerprint });
        self
    }

    pub fn with_worker_section(mut self, worker: WorkerSection) -> Self {
        self.config.worker = worker;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
