// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvoqueueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The caller does not currently hold the claim on the item. This is
    /// always recoverable locally: someone else owns the item now.
    #[error("work item {item} is not owned by worker {worker}")]
    NotOwned { item: String, worker: String },

    /// Parent selection was requested before any candidate finished
    /// evaluating. The scheduler skips the source for one cycle.
    #[error("no evaluated candidates available for parent selection")]
    InsufficientPopulation,

    #[error("source not registered: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EvoqueueError>;
