//! Master-to-dummy replication: turns a step's registry change sets into
//! per-recipient Create/Update/Destroy/Deactivate messages.

use hashbrown::{HashMap, HashSet};

use crate::error::SyncError;
use crate::filter::{FilterResult, SyncConfig};
use crate::flags::SyncFlags;
use crate::registry::ChangeSets;
use crate::sync_id::SyncId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Create,
    Update,
    Destroy,
    Deactivate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessage {
    pub sync_id: SyncId,
    pub kind: MessageKind,
    pub flags: SyncFlags,
    pub payload: Vec<u8>,
}

struct ReplicationSlot {
    deactivated: bool,
    last_full_state_step: i64,
}

impl ReplicationSlot {
    fn fresh() -> Self {
        Self { deactivated: false, last_full_state_step: i64::MIN }
    }
}

/// Drives master→dummy replication for a single step.
pub struct SyncEngine {
    config: SyncConfig,
    slots: HashMap<(SyncId, u32), ReplicationSlot>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config, slots: HashMap::new() }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one replication cycle: destroys, creates, diff/full updates,
    /// and the pacemaker sweep over every still-live object not already
    /// touched this step.
    #[allow(clippy::too_many_arguments)]
    pub fn run_step(
        &mut self,
        current_step: i64,
        changes: &ChangeSets,
        live_sync_ids: &[SyncId],
        clients: &[u32],
        mut filter: impl FnMut(SyncId, u32) -> FilterResult,
        mut full_state_of: impl FnMut(SyncId) -> Vec<u8>,
        mut diff_state_of: impl FnMut(SyncId) -> Option<Vec<u8>>,
        mut send: impl FnMut(u32, SyncMessage),
    ) -> Result<(), SyncError> {
        let touched: HashSet<SyncId> = changes
            .created
            .iter()
            .chain(changes.updated.iter())
            .chain(changes.destroyed.iter())
            .copied()
            .collect();

        for &client in clients {
            for &sid in &changes.destroyed {
                let key = (sid, client);
                let was_deactivated = self.slots.get(&key).map(|s| s.deactivated).unwrap_or(false);
                self.slots.remove(&key);
                if !was_deactivated {
                    send(
                        client,
                        SyncMessage {
                            sync_id: sid,
                            kind: MessageKind::Destroy,
                            flags: SyncFlags::empty(),
                            payload: Vec::new(),
                        },
                    );
                }
            }

            for &sid in &changes.created {
                let result = filter(sid, client);
                self.handle_filter_result(current_step, client, sid, result, true, &mut full_state_of, &mut diff_state_of, &mut send)?;
            }

            for &sid in &changes.updated {
                let result = filter(sid, client);
                self.handle_filter_result(current_step, client, sid, result, false, &mut full_state_of, &mut diff_state_of, &mut send)?;
            }

            for &sid in live_sync_ids {
                if touched.contains(&sid) {
                    continue;
                }
                let key = (sid, client);
                let deactivated = self.slots.get(&key).map(|s| s.deactivated).unwrap_or(false);
                if deactivated {
                    continue;
                }
                let last = self.slots.get(&key).map(|s| s.last_full_state_step).unwrap_or(i64::MIN);
                if current_step - last >= self.config.pacemaker_interval {
                    let payload = full_state_of(sid);
                    send(
                        client,
                        SyncMessage {
                            sync_id: sid,
                            kind: MessageKind::Update,
                            flags: SyncFlags::FULL_STATE | SyncFlags::PACEMAKER_PULSE,
                            payload,
                        },
                    );
                    self.slots.entry(key).or_insert_with(ReplicationSlot::fresh).last_full_state_step = current_step;
                }
            }
        }
        Ok(())
    }

    /// Complete-state sync for a client that just finished handshake:
    /// every live master, in registry order, as Create+Update(FULL_STATE).
    pub fn sync_new_client(
        &mut self,
        current_step: i64,
        client: u32,
        live_sync_ids_in_registration_order: &[SyncId],
        mut full_state_of: impl FnMut(SyncId) -> Vec<u8>,
        mut send: impl FnMut(u32, SyncMessage),
    ) {
        for &sid in live_sync_ids_in_registration_order {
            send(
                client,
                SyncMessage {
                    sync_id: sid,
                    kind: MessageKind::Create,
                    flags: SyncFlags::empty(),
                    payload: Vec::new(),
                },
            );
            let payload = full_state_of(sid);
            send(
                client,
                SyncMessage {
                    sync_id: sid,
                    kind: MessageKind::Update,
                    flags: SyncFlags::FULL_STATE,
                    payload,
                },
            );
            self.slots.insert(
                (sid, client),
                ReplicationSlot { deactivated: false, last_full_state_step: current_step },
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_filter_result(
        &mut self,
        current_step: i64,
        client: u32,
        sid: SyncId,
        result: FilterResult,
        is_create: bool,
        full_state_of: &mut impl FnMut(SyncId) -> Vec<u8>,
        diff_state_of: &mut impl FnMut(SyncId) -> Option<Vec<u8>>,
        send: &mut impl FnMut(u32, SyncMessage),
    ) -> Result<(), SyncError> {
        let key = (sid, client);
        match result {
            FilterResult::Skip => Ok(()),
            FilterResult::Deactivate => {
                // Create is sent unconditionally to every recipient regardless
                // of filtering; only the update side is gated.
                if is_create {
                    send(
                        client,
                        SyncMessage { sync_id: sid, kind: MessageKind::Create, flags: SyncFlags::empty(), payload: Vec::new() },
                    );
                }
                let already = self.slots.get(&key).map(|s| s.deactivated).unwrap_or(false);
                if !already {
                    send(
                        client,
                        SyncMessage {
                            sync_id: sid,
                            kind: MessageKind::Deactivate,
                            flags: SyncFlags::empty(),
                            payload: Vec::new(),
                        },
                    );
                }
                self.slots.entry(key).or_insert_with(ReplicationSlot::fresh).deactivated = true;
                Ok(())
            }
            FilterResult::FullSync => {
                self.send_eligible(current_step, client, sid, is_create, full_state_of, diff_state_of, send);
                Ok(())
            }
            FilterResult::FullSyncWithDelay(_extra_steps) => {
                if !self.config.allow_delay_override {
                    return Err(SyncError::DelayOverrideNotAllowed);
                }
                // The extra delay is applied by the receiving dummy's state
                // buffer; at the engine level this behaves like a normal send.
                self.send_eligible(current_step, client, sid, is_create, full_state_of, diff_state_of, send);
                Ok(())
            }
        }
    }

    /// An eligible recipient gets either a diff (if one is available and this
    /// isn't its first sync) or a forced full state, which also resets the
    /// pacemaker clock for that recipient.
    fn send_eligible(
        &mut self,
        current_step: i64,
        client: u32,
        sid: SyncId,
        is_create: bool,
        full_state_of: &mut impl FnMut(SyncId) -> Vec<u8>,
        diff_state_of: &mut impl FnMut(SyncId) -> Option<Vec<u8>>,
        send: &mut impl FnMut(u32, SyncMessage),
    ) {
        let key = (sid, client);
        if is_create {
            send(
                client,
                SyncMessage { sync_id: sid, kind: MessageKind::Create, flags: SyncFlags::empty(), payload: Vec::new() },
            );
        }

        let diff = if is_create { None } else { diff_state_of(sid) };
        match diff {
            Some(payload) => {
                send(client, SyncMessage { sync_id: sid, kind: MessageKind::Update, flags: SyncFlags::empty(), payload });
                self.slots.entry(key).or_insert_with(ReplicationSlot::fresh).deactivated = false;
            }
            None => {
                let payload = full_state_of(sid);
                send(client, SyncMessage { sync_id: sid, kind: MessageKind::Update, flags: SyncFlags::FULL_STATE, payload });
                let slot = self.slots.entry(key).or_insert_with(ReplicationSlot::fresh);
                slot.deactivated = false;
                slot.last_full_state_step = current_step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn create_and_deactivate_scenario() {
        let mut registry = Registry::new();
        let sid = registry.register_master();
        let changes = registry.flush_state_updates();
        assert_eq!(changes.created, vec![sid]);

        let mut engine = SyncEngine::new(SyncConfig::default());
        let mut sent: Vec<(u32, SyncMessage)> = Vec::new();

        engine
            .run_step(
                0,
                &changes,
                &[sid],
                &[0, 1],
                |_, client| if client == 1 { FilterResult::Deactivate } else { FilterResult::FullSync },
                |_| b"pos:100,100".to_vec(),
                |_| None,
                |client, msg| sent.push((client, msg)),
            )
            .unwrap();

        let client0_msgs: Vec<_> = sent.iter().filter(|(c, _)| *c == 0).collect();
        assert!(client0_msgs.iter().any(|(_, m)| m.kind == MessageKind::Create));
        assert!(client0_msgs
            .iter()
            .any(|(_, m)| m.kind == MessageKind::Update && m.payload == b"pos:100,100"));

        let client1_msgs: Vec<_> = sent.iter().filter(|(c, _)| *c == 1).collect();
        assert_eq!(client1_msgs.len(), 2, "a freshly created object still gets an unconditional Create");
        assert_eq!(client1_msgs[0].1.kind, MessageKind::Create);
        assert_eq!(client1_msgs[1].1.kind, MessageKind::Deactivate);

        // Next step: client 1 stays deactivated and receives nothing further,
        // even though the filter keeps returning Deactivate.
        sent.clear();
        let changes = ChangeSets { created: vec![], updated: vec![sid], destroyed: vec![] };
        engine
            .run_step(
                1,
                &changes,
                &[sid],
                &[0, 1],
                |_, client| if client == 1 { FilterResult::Deactivate } else { FilterResult::FullSync },
                |_| b"pos:101,100".to_vec(),
                |_| None,
                |client, msg| sent.push((client, msg)),
            )
            .unwrap();
        assert!(sent.iter().all(|(c, _)| *c != 1));
    }

    #[test]
    fn pacemaker_fires_for_untouched_diff_synced_objects() {
        let mut config = SyncConfig::default();
        config.pacemaker_interval = 5;
        let mut engine = SyncEngine::new(config);

        let sid = SyncId::new(1);
        let empty = ChangeSets::default();
        let mut last_flags = None;

        engine
            .run_step(
                0,
                &empty,
                &[sid],
                &[0],
                |_, _| FilterResult::FullSync,
                |_| b"full".to_vec(),
                |_| None,
                |_, msg| last_flags = Some(msg.flags),
            )
            .unwrap();
        assert_eq!(last_flags, Some(SyncFlags::FULL_STATE | SyncFlags::PACEMAKER_PULSE));

        last_flags = None;
        engine
            .run_step(
                4,
                &empty,
                &[sid],
                &[0],
                |_, _| FilterResult::FullSync,
                |_| b"full".to_vec(),
                |_| None,
                |_, msg| last_flags = Some(msg.flags),
            )
            .unwrap();
        assert_eq!(last_flags, None, "pacemaker interval has not elapsed yet");
    }

    #[test]
    fn full_sync_with_delay_requires_opt_in() {
        let mut engine = SyncEngine::new(SyncConfig::default());
        let sid = SyncId::new(1);
        let changes = ChangeSets { created: vec![sid], updated: vec![], destroyed: vec![] };
        let result = engine.run_step(
            0,
            &changes,
            &[sid],
            &[0],
            |_, _| FilterResult::FullSyncWithDelay(3),
            |_| Vec::new(),
            |_| None,
            |_, _| {},
        );
        assert!(matches!(result, Err(SyncError::DelayOverrideNotAllowed)));
    }
}
