use crate::process::ProcessId;
use dashmap::DashMap;
use std::collections::HashSet;

/// Consecutive unregistered reports after which a process is killed.
///
/// With the default one-minute heartbeat this is roughly eight minutes. The
/// count is in heartbeats, so it does not follow a changed heartbeat interval.
pub const UNREGISTERED_PROCESS_THRESHOLD: u32 = 8;

/// Counts how many heartbeats in a row each process was reported as not yet
/// registered with the control plane.
#[derive(Debug)]
pub struct UnregisteredProcessCounter {
    counts: DashMap<ProcessId, u32>,
    threshold: u32,
}

impl UnregisteredProcessCounter {
    pub fn new() -> Self {
        Self::with_threshold(UNREGISTERED_PROCESS_THRESHOLD)
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Applies one heartbeat's unregistered list.
    ///
    /// Ids missing from `unregistered` are forgotten. The others are counted
    /// up, and those reaching the threshold are removed and returned.
    pub fn record(&self, unregistered: &[ProcessId]) -> Vec<ProcessId> {
        let present: HashSet<ProcessId> = unregistered.iter().copied().collect();
        self.counts.retain(|id, _| present.contains(id));

        let mut expired = Vec::new();
        for id in present {
            let count = {
                let mut entry = self.counts.entry(id).or_insert(0);
                *entry += 1;
                *entry
            };
            tracing::debug!(process_id = %id, count, "Process still unregistered");
            if count >= self.threshold
                && self
                    .counts
                    .remove_if(&id, |_, c| *c >= self.threshold)
                    .is_some()
            {
                expired.push(id);
            }
        }
        expired
    }

    pub fn count(&self, id: &ProcessId) -> Option<u32> {
        self.counts.get(id).map(|c| *c)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Default for UnregisteredProcessCounter {
    fn default() -> Self {
        Self::new()
    }
}
