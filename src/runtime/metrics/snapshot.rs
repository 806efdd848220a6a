use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::TermIndex;

/// A snapshot of flush metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub flush_iterations: u64,
    pub flushed_transactions: u64,
    pub max_transactions_in_one_iteration: u64,
    pub avg_transactions_in_one_iteration: f64,
    pub avg_flush_time_us: u64,
    pub flush_p50_us: u64,
    pub flush_p95_us: u64,
    pub flush_p99_us: u64,
    pub last_committed: Option<TermIndex>,
    pub pending_transactions: usize,
    pub commit_retries: u64,
    pub failed_commits: u64,
    pub checkpoints_created: u64,
    pub last_checkpoint_time_us: u64,
    pub notifications_sent: u64,
    pub notifications_suppressed: u64,
    pub last_flush_secs: Option<u64>,
}

pub(crate) fn calculate_percentile(values: &VecDeque<u64>, percentile: u8) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let mut sorted: Vec<_> = values.iter().copied().collect();
    sorted.sort_unstable();

    let index = ((percentile as f64 / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}
