// src/config/mod.rs

//! Configuration surface: TOML model, loader, and semantic validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BasicStopConfig, ConfigFile, ExpectedStructureConfig, RawConfigFile, SearchSection,
    SelectionSection, SourceConfig, SourceKindConfig, StopSection, WorkerSection,
};
