//! Per-instance mutual exclusion for switches.
//!
//! A switch or instance creation holds every `(host, instance)` key it
//! touches until its audit row reaches a terminal status. A second request
//! for a held key is rejected instead of queued.

use std::collections::HashSet;
use std::sync::Arc;

use coreswitch_core::{AgentHostId, InstanceId};
use parking_lot::Mutex;

type LockKey = (AgentHostId, InstanceId);

/// Registry of instance keys held by running switches.
#[derive(Debug, Clone, Default)]
pub struct InstanceLocks {
    held: Arc<Mutex<HashSet<LockKey>>>,
}

impl InstanceLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all instance keys of a host, or none of them.
    ///
    /// Duplicate IDs are collapsed. On contention, returns the first
    /// instance that is already held.
    ///
    /// # Errors
    ///
    /// Returns the contended instance ID.
    pub fn try_acquire<'a>(
        &self,
        host: AgentHostId,
        instances: impl IntoIterator<Item = &'a InstanceId>,
    ) -> Result<InstanceGuard, InstanceId> {
        let mut keys: Vec<LockKey> = instances
            .into_iter()
            .map(|instance| (host, instance.clone()))
            .collect();
        keys.sort();
        keys.dedup();

        let mut held = self.held.lock();
        if let Some((_, busy)) = keys.iter().find(|key| held.contains(*key)) {
            return Err(busy.clone());
        }
        held.extend(keys.iter().cloned());

        Ok(InstanceGuard {
            held: Arc::clone(&self.held),
            keys,
        })
    }

    /// Whether an instance key is currently held.
    #[must_use]
    pub fn is_held(&self, host: AgentHostId, instance: &InstanceId) -> bool {
        self.held.lock().contains(&(host, instance.clone()))
    }
}

/// Releases its keys when dropped.
#[derive(Debug)]
pub struct InstanceGuard {
    held: Arc<Mutex<HashSet<LockKey>>>,
    keys: Vec<LockKey>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
    }
}
