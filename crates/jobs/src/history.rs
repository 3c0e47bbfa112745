//! Bounded in-memory run history, one ring per job name.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use crate::types::RunRecord;

/// Records kept per job when the caller does not say otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Attempt records, oldest dropped first once a job's ring is full.
pub struct RunHistory {
    limit: usize,
    runs: Mutex<HashMap<String, VecDeque<RunRecord>>>,
}

impl RunHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn append(&self, run: RunRecord) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let ring = runs.entry(run.job_name.clone()).or_default();
        if ring.len() >= self.limit {
            ring.pop_front();
        }
        ring.push_back(run);
    }

    /// The most recent `limit` records for `job_name`, oldest first.
    pub fn recent(&self, job_name: &str, limit: usize) -> Vec<RunRecord> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let Some(ring) = runs.get(job_name) else {
            return Vec::new();
        };
        let start = ring.len().saturating_sub(limit);
        ring.iter().skip(start).cloned().collect()
    }

    pub fn clear(&self, job_name: &str) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(job_name);
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
