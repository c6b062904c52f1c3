//! Device Registry - slot arena and instance lookup behind a single lock
//!
//! The registry keeps two views of the connected devices:
//!
//! ```text
//! slots:            [ Some(dev#4) | None | Some(dev#9) | None | ... ]   (index = slot)
//! instance_to_slot: { #4 -> 0, #9 -> 2 }
//! ```
//!
//! Both are mutated only through [`RegistryState`], which callers reach by
//! locking the [`DeviceRegistry`]. The poll loop holds that lock for a whole
//! drain, so a reader on another thread either sees the registry before a
//! burst of hot-plug notifications or after it, never halfway through.
//!
//! Attach and detach are strict: bookkeeping mistakes come back as
//! [`RegistryError`]. Resolution is permissive: an event for an instance that
//! is already gone just resolves to `None`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::controller::device::{
    Device, DeviceDescriptor, DeviceInfo, InputDeviceEvent, InstanceId,
};

/// Number of hardware slots the registry can track at once.
pub const MAX_DEVICES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Slot index {slot_index} is outside of 0..{max}")]
    SlotOutOfRange { slot_index: usize, max: usize },

    #[error("Slot {slot_index} is already occupied by instance {occupant}")]
    AlreadyOccupied {
        slot_index: usize,
        occupant: InstanceId,
    },

    #[error("Instance {0} was never attached or is already detached")]
    UnknownInstance(InstanceId),

    #[error("Instance {instance_id} is already tracked in slot {slot_index}")]
    InstanceInUse {
        instance_id: InstanceId,
        slot_index: usize,
    },

    #[error("Registry lock poisoned: {0}")]
    Poisoned(String),
}

impl RegistryError {
    /// Errors that mean the notification source and the registry disagree.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RegistryError::SlotOutOfRange { .. }
                | RegistryError::UnknownInstance(_)
                | RegistryError::InstanceInUse { .. }
        )
    }
}

/// Settings applied to every device the registry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDefaults {
    pub dead_zone: i16,
    pub event_buffer: usize,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            dead_zone: 8000,
            event_buffer: 256,
        }
    }
}

/// Payload published when a device attaches.
#[derive(Debug)]
pub struct ConnectedDevice {
    pub info: DeviceInfo,
    pub events: mpsc::Receiver<InputDeviceEvent>,
}

/// Identity of a device that was just removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedDevice {
    pub slot_index: usize,
    pub instance_id: InstanceId,
}

/// Registry contents. Only reachable through [`DeviceRegistry::lock`].
#[derive(Debug)]
pub struct RegistryState {
    slots: [Option<Device>; MAX_DEVICES],
    instance_to_slot: HashMap<InstanceId, usize>,
    defaults: DeviceDefaults,
}

pub type RegistryGuard<'a> = MutexGuard<'a, RegistryState>;

impl RegistryState {
    fn new(defaults: DeviceDefaults) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            instance_to_slot: HashMap::new(),
            defaults,
        }
    }

    /// Creates a device in `slot_index` for a freshly reported attach.
    pub fn attach(
        &mut self,
        slot_index: usize,
        descriptor: DeviceDescriptor,
    ) -> Result<ConnectedDevice, RegistryError> {
        let slot = self
            .slots
            .get(slot_index)
            .ok_or(RegistryError::SlotOutOfRange {
                slot_index,
                max: MAX_DEVICES,
            })?;

        if let Some(occupant) = slot {
            return Err(RegistryError::AlreadyOccupied {
                slot_index,
                occupant: occupant.instance_id(),
            });
        }

        if let Some(&tracked_slot) = self.instance_to_slot.get(&descriptor.instance_id) {
            return Err(RegistryError::InstanceInUse {
                instance_id: descriptor.instance_id,
                slot_index: tracked_slot,
            });
        }

        let instance_id = descriptor.instance_id;
        let (device, events) = Device::open(
            slot_index,
            descriptor,
            self.defaults.dead_zone,
            self.defaults.event_buffer,
        );
        let info = device.info().clone();

        self.slots[slot_index] = Some(device);
        self.instance_to_slot.insert(instance_id, slot_index);

        info!(
            "Controller '{}' attached to slot {} (instance {})",
            info.name, slot_index, instance_id
        );
        Ok(ConnectedDevice { info, events })
    }

    /// Removes the device of `instance_id`.
    ///
    /// Returns `Ok(None)` when the slot is now held by a different instance.
    /// `attach` and `detach` always update both tables together, so through
    /// this API alone a stale detach of a removed instance surfaces as
    /// [`RegistryError::UnknownInstance`] instead; the occupant check only
    /// guards the slot against a mismatched table entry.
    pub fn detach(
        &mut self,
        instance_id: InstanceId,
    ) -> Result<Option<DetachedDevice>, RegistryError> {
        let slot_index = *self
            .instance_to_slot
            .get(&instance_id)
            .ok_or(RegistryError::UnknownInstance(instance_id))?;

        match &self.slots[slot_index] {
            Some(device) if device.instance_id() == instance_id => {}
            other => {
                debug!(
                    "Ignoring stale detach of {}: slot {} now holds {:?}",
                    instance_id,
                    slot_index,
                    other.as_ref().map(Device::instance_id)
                );
                return Ok(None);
            }
        }

        self.slots[slot_index] = None;
        self.instance_to_slot.remove(&instance_id);

        info!(
            "Controller instance {} removed from slot {}",
            instance_id, slot_index
        );
        Ok(Some(DetachedDevice {
            slot_index,
            instance_id,
        }))
    }

    /// Looks up the device of `instance_id`. Never fails.
    pub fn resolve(&self, instance_id: InstanceId) -> Option<&Device> {
        let slot_index = *self.instance_to_slot.get(&instance_id)?;
        self.slots[slot_index]
            .as_ref()
            .filter(|device| device.instance_id() == instance_id)
    }

    pub(crate) fn resolve_mut(&mut self, instance_id: InstanceId) -> Option<&mut Device> {
        let slot_index = *self.instance_to_slot.get(&instance_id)?;
        self.slots[slot_index]
            .as_mut()
            .filter(|device| device.instance_id() == instance_id)
    }

    /// Device info of every occupied slot, ordered by slot index.
    pub fn connected(&self) -> Vec<DeviceInfo> {
        self.slots
            .iter()
            .flatten()
            .map(|device| device.info().clone())
            .collect()
    }

    pub fn is_occupied(&self, slot_index: usize) -> bool {
        matches!(self.slots.get(slot_index), Some(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.instance_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_to_slot.is_empty()
    }

    /// Checks that both lookup tables describe the same set of devices.
    pub fn is_consistent(&self) -> bool {
        let occupied = self.slots.iter().flatten().count();
        if occupied != self.instance_to_slot.len() {
            return false;
        }

        self.slots.iter().enumerate().all(|(index, slot)| match slot {
            Some(device) => {
                device.slot_index() == index
                    && self.instance_to_slot.get(&device.instance_id()) == Some(&index)
            }
            None => !self.instance_to_slot.values().any(|&mapped| mapped == index),
        })
    }
}

/// Shared handle to the registry. Every access goes through one mutex.
#[derive(Debug)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new(defaults: DeviceDefaults) -> Self {
        debug!("Creating device registry with {:?}", defaults);
        Self {
            state: Mutex::new(RegistryState::new(defaults)),
        }
    }

    /// Enters the registry's critical section.
    pub fn lock(&self) -> Result<RegistryGuard<'_>, RegistryError> {
        self.state.lock().map_err(|e| {
            warn!("Device registry lock is poisoned: {}", e);
            RegistryError::Poisoned(e.to_string())
        })
    }

    /// Snapshot of the connected devices for consumers on other threads.
    pub fn connected(&self) -> Result<Vec<DeviceInfo>, RegistryError> {
        Ok(self.lock()?.connected())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DeviceDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn descriptor(raw: u64) -> DeviceDescriptor {
        DeviceDescriptor {
            instance_id: InstanceId::from_raw(raw),
            name: format!("Pad {raw}"),
        }
    }

    fn id(raw: u64) -> InstanceId {
        InstanceId::from_raw(raw)
    }

    #[test]
    fn attach_fills_both_tables() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();

        let connected = state.attach(0, descriptor(10)).unwrap();
        assert_eq!(connected.info.slot_index, 0);
        assert_eq!(connected.info.instance_id, id(10));
        assert_eq!(connected.info.dead_zone, 8000);

        assert!(state.is_occupied(0));
        assert_eq!(state.len(), 1);
        assert_eq!(state.resolve(id(10)).map(Device::slot_index), Some(0));
        assert!(state.is_consistent());
    }

    #[test]
    fn duplicate_attach_keeps_the_first_occupant() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        state.attach(0, descriptor(1)).unwrap();

        let err = state.attach(0, descriptor(2)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyOccupied {
                slot_index: 0,
                occupant: id(1),
            }
        );
        assert!(!err.is_protocol_violation());
        assert_eq!(state.resolve(id(1)).map(Device::instance_id), Some(id(1)));
        assert!(state.resolve(id(2)).is_none());
        assert_eq!(state.len(), 1);
        assert!(state.is_consistent());
    }

    #[test]
    fn attach_outside_the_slot_domain_fails_fast() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();

        let err = state.attach(MAX_DEVICES, descriptor(1)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::SlotOutOfRange {
                slot_index: MAX_DEVICES,
                max: MAX_DEVICES,
            }
        );
        assert!(err.is_protocol_violation());
        assert!(state.is_empty());
    }

    #[test]
    fn same_instance_in_two_slots_is_rejected() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        state.attach(1, descriptor(5)).unwrap();

        let err = state.attach(2, descriptor(5)).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(!state.is_occupied(2));
        assert!(state.is_consistent());
    }

    #[test]
    fn detach_frees_the_slot_and_closes_the_sink() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        let mut connected = state.attach(2, descriptor(3)).unwrap();

        let detached = state.detach(id(3)).unwrap();
        assert_eq!(
            detached,
            Some(DetachedDevice {
                slot_index: 2,
                instance_id: id(3),
            })
        );
        assert!(!state.is_occupied(2));
        assert!(state.is_empty());
        assert!(state.is_consistent());

        // Sender was dropped together with the device
        assert!(matches!(
            connected.events.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn unknown_detach_is_an_error_and_changes_nothing() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        state.attach(1, descriptor(1)).unwrap();

        let err = state.detach(id(99)).unwrap_err();
        assert_eq!(err, RegistryError::UnknownInstance(id(99)));
        assert!(err.is_protocol_violation());
        assert!(state.is_occupied(1));
        assert_eq!(state.resolve(id(1)).map(Device::slot_index), Some(1));
        assert!(state.is_consistent());
    }

    #[test]
    fn old_instance_cannot_evict_the_newer_occupant() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();

        state.attach(0, descriptor(1)).unwrap();
        state.detach(id(1)).unwrap();
        state.attach(0, descriptor(2)).unwrap();

        assert!(state.detach(id(1)).is_err());
        assert_eq!(state.resolve(id(2)).map(Device::slot_index), Some(0));
        assert!(state.is_consistent());
    }

    #[test]
    fn poisoned_lock_is_reported_not_propagated() {
        let registry = Arc::new(DeviceRegistry::default());
        registry.lock().unwrap().attach(0, descriptor(1)).unwrap();

        let crashing = Arc::clone(&registry);
        let result = std::thread::spawn(move || {
            let _guard = crashing.lock().unwrap();
            panic!("registry user crashed");
        })
        .join();
        assert!(result.is_err());

        assert!(matches!(registry.lock(), Err(RegistryError::Poisoned(_))));
        assert!(matches!(registry.connected(), Err(RegistryError::Poisoned(_))));
    }

    #[test]
    fn resolve_never_fails() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        assert!(state.resolve(id(0)).is_none());

        state.attach(4, descriptor(8)).unwrap();
        state.detach(id(8)).unwrap();
        assert!(state.resolve(id(8)).is_none());
        assert!(state.resolve(id(u64::MAX)).is_none());
    }

    #[test]
    fn connected_lists_devices_in_slot_order() {
        let registry = DeviceRegistry::default();
        {
            let mut state = registry.lock().unwrap();
            state.attach(5, descriptor(1)).unwrap();
            state.attach(0, descriptor(2)).unwrap();
            state.attach(MAX_DEVICES - 1, descriptor(3)).unwrap();
        }

        let slots: Vec<usize> = registry
            .connected()
            .unwrap()
            .iter()
            .map(|info| info.slot_index)
            .collect();
        assert_eq!(slots, vec![0, 5, MAX_DEVICES - 1]);
    }

    #[test]
    fn tables_stay_in_step_over_mixed_sequences() {
        let registry = DeviceRegistry::default();
        let mut state = registry.lock().unwrap();
        let mut next_raw = 100;
        let mut live: Vec<(usize, InstanceId)> = Vec::new();

        // Deterministic pseudo-random walk over attach/detach/duplicate/bogus
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;

            match seed % 4 {
                0 | 1 => {
                    let slot = (seed as usize / 4) % MAX_DEVICES;
                    let result = state.attach(slot, descriptor(next_raw));
                    if live.iter().any(|(s, _)| *s == slot) {
                        assert!(matches!(result, Err(RegistryError::AlreadyOccupied { .. })));
                    } else {
                        assert!(result.is_ok());
                        live.push((slot, id(next_raw)));
                    }
                    next_raw += 1;
                }
                2 if !live.is_empty() => {
                    let (slot, instance) = live.remove((seed as usize / 4) % live.len());
                    let detached = state.detach(instance).unwrap();
                    assert_eq!(detached.map(|d| d.slot_index), Some(slot));
                }
                _ => {
                    assert!(state.detach(id(u64::MAX - 1)).is_err());
                }
            }

            assert!(state.is_consistent());
            assert_eq!(state.len(), live.len());
            for slot in 0..MAX_DEVICES {
                assert_eq!(
                    state.is_occupied(slot),
                    live.iter().any(|(s, _)| *s == slot)
                );
            }
        }
    }
}
