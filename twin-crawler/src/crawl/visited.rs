use std::collections::HashMap;
use std::collections::hash_map::Entry;

use dashmap::DashMap;

/// Shallowest depth each item was scheduled at, tracked separately for
/// every job.
#[derive(Debug, Default)]
pub struct VisitedItems {
    jobs: DashMap<String, HashMap<String, u32>>,
}

impl VisitedItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `item_id` at `depth` for `job_id`.
    ///
    /// Returns `true` when the item is new or `depth` is shallower than any
    /// depth it was scheduled at before.
    pub fn mark(&self, job_id: &str, item_id: &str, depth: u32) -> bool {
        let mut items = self.jobs.entry(job_id.to_string()).or_default();
        match items.entry(item_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(depth);
                true
            }
            Entry::Occupied(mut slot) if depth < *slot.get() => {
                slot.insert(depth);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Shallowest depth `item_id` was scheduled at.
    pub fn depth_of(&self, job_id: &str, item_id: &str) -> Option<u32> {
        self.jobs
            .get(job_id)
            .and_then(|items| items.get(item_id).copied())
    }

    pub fn contains(&self, job_id: &str, item_id: &str) -> bool {
        self.depth_of(job_id, item_id).is_some()
    }

    /// Number of items visited by `job_id`.
    pub fn count(&self, job_id: &str) -> usize {
        self.jobs.get(job_id).map_or(0, |items| items.len())
    }

    pub fn forget(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    /// Number of jobs with bookkeeping.
    pub fn jobs(&self) -> usize {
        self.jobs.len()
    }
}
