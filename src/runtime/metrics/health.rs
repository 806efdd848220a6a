use serde::{Deserialize, Serialize};

use crate::types::TermIndex;

use super::MetricsSnapshot;

/// Health status of the flush pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub last_committed: Option<TermIndex>,
    pub pending_transactions: usize,
    pub flushed_transactions: u64,
    pub failed_commits: u64,
    pub commit_retries: u64,
    pub last_flush_secs: Option<u64>,
}

/// Health state enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Idle,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Idle => write!(f, "IDLE"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

pub(crate) fn derive_health(snapshot: &MetricsSnapshot) -> HealthStatus {
    let has_activity = snapshot.last_flush_secs.is_some();
    let is_responsive = snapshot
        .last_flush_secs
        .map(|secs| secs < 60)
        .unwrap_or(false);

    // Retries mean the store hiccuped but every run still landed.
    let state = if snapshot.failed_commits > 0 {
        HealthState::Unhealthy
    } else if snapshot.commit_retries > 0 {
        HealthState::Degraded
    } else if !has_activity {
        HealthState::Idle
    } else if is_responsive {
        HealthState::Healthy
    } else {
        HealthState::Idle
    };

    HealthStatus {
        state,
        last_committed: snapshot.last_committed,
        pending_transactions: snapshot.pending_transactions,
        flushed_transactions: snapshot.flushed_transactions,
        failed_commits: snapshot.failed_commits,
        commit_retries: snapshot.commit_retries,
        last_flush_secs: snapshot.last_flush_secs,
    }
}
