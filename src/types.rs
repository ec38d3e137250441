// src/types.rs

//! Shared identifier aliases and small enums used across the crate.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical work item identifier (UUIDv4 string).
pub type WorkItemId = String;

/// Canonical candidate identifier (UUIDv4 string).
pub type CandidateId = String;

/// Identifier of a worker process (or task) claiming work.
pub type WorkerId = String;

/// Name of a registered candidate source.
pub type SourceName = String;

/// Lifecycle status of a work item in the shared store.
///
/// `Waiting → Claimed → Running` and then one of the terminal states.
/// A failed evaluation may be retried as a fresh item with a new id; the
/// status of the old item never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Waiting,
    Claimed,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl WorkStatus {
    /// Stable string form used for the `status` column in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Waiting => "waiting",
            WorkStatus::Claimed => "claimed",
            WorkStatus::Running => "running",
            WorkStatus::Succeeded => "succeeded",
            WorkStatus::Failed => "failed",
            WorkStatus::Canceled => "canceled",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkStatus::Succeeded | WorkStatus::Failed | WorkStatus::Canceled
        )
    }

    /// Whether the item counts toward the steady-state in-flight total.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkStatus::Waiting | WorkStatus::Claimed | WorkStatus::Running
        )
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waiting" => Ok(WorkStatus::Waiting),
            "claimed" => Ok(WorkStatus::Claimed),
            "running" => Ok(WorkStatus::Running),
            "succeeded" => Ok(WorkStatus::Succeeded),
            "failed" => Ok(WorkStatus::Failed),
            "canceled" => Ok(WorkStatus::Canceled),
            other => Err(format!("invalid work item status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            WorkStatus::Waiting,
            WorkStatus::Claimed,
            WorkStatus::Running,
            WorkStatus::Succeeded,
            WorkStatus::Failed,
            WorkStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<WorkStatus>(), Ok(status));
        }
    }

    #[test]
    fn in_flight_and_terminal_partition_statuses() {
        for status in [
            WorkStatus::Waiting,
            WorkStatus::Claimed,
            WorkStatus::Running,
            WorkStatus::Succeeded,
            WorkStatus::Failed,
            WorkStatus::Canceled,
        ] {
            assert_ne!(status.is_in_flight(), status.is_terminal());
        }
    }
}
