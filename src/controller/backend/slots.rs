use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::debug;

use crate::controller::device::InstanceId;
use crate::controller::registry::MAX_DEVICES;

/// Slot and attach session of one connected pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub slot_index: usize,
    pub instance_id: InstanceId,
}

/// Hands out hardware slots for backends whose own pad ids are unbounded.
///
/// Every connected pad holds the lowest slot that was free when it connected
/// and keeps it until it disconnects.
#[derive(Debug)]
pub struct SlotAllocator<K> {
    sessions: HashMap<K, Session>,
}

impl<K> Default for SlotAllocator<K> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash + Debug> SlotAllocator<K> {
    /// Opens a session for `key`, or returns the one it already holds.
    /// `None` when all slots are taken.
    pub fn open(&mut self, key: K) -> Option<Session> {
        if let Some(session) = self.sessions.get(&key) {
            debug!("{:?} already holds slot {}", key, session.slot_index);
            return Some(*session);
        }

        let slot_index = (0..MAX_DEVICES).find(|slot| !self.is_taken(*slot))?;
        let session = Session {
            slot_index,
            instance_id: InstanceId::next(),
        };
        self.sessions.insert(key, session);
        Some(session)
    }

    /// Ends the session of `key` and frees its slot.
    pub fn close(&mut self, key: K) -> Option<Session> {
        self.sessions.remove(&key)
    }

    pub fn get(&self, key: K) -> Option<Session> {
        self.sessions.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn is_taken(&self, slot_index: usize) -> bool {
        self.sessions
            .values()
            .any(|session| session.slot_index == slot_index)
    }
}
