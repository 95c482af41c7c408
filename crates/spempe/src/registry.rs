//! Maps stable [`SyncId`]s to live objects and collects per-step
//! create/update/destroy changes for the sync engine to broadcast.

use hashbrown::{HashMap, HashSet};

use crate::error::SyncError;
use crate::sync_id::SyncId;

struct Entry {
    is_master: bool,
}

/// Per-step change sets, with transient same-step birth-death already suppressed.
#[derive(Debug, Default, Clone)]
pub struct ChangeSets {
    pub created: Vec<SyncId>,
    pub updated: Vec<SyncId>,
    pub destroyed: Vec<SyncId>,
}

#[derive(Default)]
pub struct Registry {
    next_raw_id: u64,
    entries: HashMap<SyncId, Entry>,
    created: HashSet<SyncId>,
    updated: HashSet<SyncId>,
    destroyed: HashSet<SyncId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_raw_id: 1,
            ..Default::default()
        }
    }

    /// Server side: issues a fresh SyncId for a newly created master.
    pub fn register_master(&mut self) -> SyncId {
        let id = SyncId::new(self.next_raw_id);
        self.next_raw_id += 1;
        self.entries.insert(id, Entry { is_master: true });
        self.created.insert(id);
        id
    }

    /// Client side: inserts a dummy under a SyncId chosen by the master.
    pub fn register_dummy(&mut self, sid: SyncId) -> Result<(), SyncError> {
        if self.entries.contains_key(&sid) {
            return Err(SyncError::AlreadyRegistered(sid));
        }
        self.entries.insert(sid, Entry { is_master: false });
        self.created.insert(sid);
        Ok(())
    }

    pub fn unregister(&mut self, sid: SyncId) {
        if self.entries.remove(&sid).is_some() {
            if self.created.remove(&sid) {
                // Created and destroyed within the same step: fully transient.
                self.updated.remove(&sid);
                return;
            }
            self.updated.remove(&sid);
            self.destroyed.insert(sid);
        }
    }

    pub fn get_mapping(&self, sid: SyncId) -> Option<bool> {
        self.entries.get(&sid).map(|e| e.is_master)
    }

    pub fn is_registered(&self, sid: SyncId) -> bool {
        self.entries.contains_key(&sid)
    }

    pub fn mark_created(&mut self, sid: SyncId) {
        self.created.insert(sid);
    }

    pub fn mark_updated(&mut self, sid: SyncId) {
        if !self.created.contains(&sid) {
            self.updated.insert(sid);
        }
    }

    pub fn mark_destroyed(&mut self, sid: SyncId) {
        self.unregister(sid);
    }

    /// All SyncIds currently registered, in registration order — used for
    /// complete-state sync on a new client joining.
    pub fn live_in_registration_order(&self) -> Vec<SyncId> {
        let mut ids: Vec<SyncId> = self.entries.keys().copied().collect();
        ids.sort_by_key(|id| id.raw());
        ids
    }

    /// Drains this step's change sets, clearing them for the next step.
    /// An object present in both `created` and `destroyed` is omitted
    /// from every outgoing set (transient birth-death).
    pub fn flush_state_updates(&mut self) -> ChangeSets {
        let mut created: Vec<SyncId> = self.created.drain().collect();
        let mut updated: Vec<SyncId> = self.updated.drain().collect();
        let mut destroyed: Vec<SyncId> = self.destroyed.drain().collect();
        created.sort_by_key(|id| id.raw());
        updated.sort_by_key(|id| id.raw());
        destroyed.sort_by_key(|id| id.raw());
        ChangeSets { created, updated, destroyed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_birth_death_is_suppressed() {
        let mut reg = Registry::new();
        let sid = reg.register_master();
        reg.unregister(sid);
        let sets = reg.flush_state_updates();
        assert!(sets.created.is_empty());
        assert!(sets.updated.is_empty());
        assert!(sets.destroyed.is_empty());
    }

    #[test]
    fn created_then_flushed_then_updated_is_a_normal_update() {
        let mut reg = Registry::new();
        let sid = reg.register_master();
        let sets = reg.flush_state_updates();
        assert_eq!(sets.created, vec![sid]);

        reg.mark_updated(sid);
        let sets = reg.flush_state_updates();
        assert_eq!(sets.updated, vec![sid]);
    }

    #[test]
    fn duplicate_dummy_registration_fails() {
        let mut reg = Registry::new();
        let sid = reg.register_master();
        assert!(reg.register_dummy(sid).is_err());
    }
}
