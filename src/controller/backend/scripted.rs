use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{BackendError, InputBackend, RawNotification};
use crate::controller::device::{DeviceDescriptor, InstanceId};
use crate::controller::translator::{RawAxis, RawButton};
use crate::mapping_db::MappingDatabase;

/// Backend that replays notifications pushed through a [`ScriptHandle`].
///
/// Used for headless runs and for driving the poll loop in tests.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    queue: Arc<Mutex<VecDeque<RawNotification>>>,
}

/// Producer side of a [`ScriptedBackend`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    queue: Arc<Mutex<VecDeque<RawNotification>>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, ScriptHandle) {
        let backend = Self::default();
        let handle = ScriptHandle {
            queue: Arc::clone(&backend.queue),
        };
        (backend, handle)
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl ScriptHandle {
    pub fn push(&self, notification: RawNotification) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(notification),
            Err(e) => warn!("Script queue poisoned, dropping notification: {}", e),
        }
    }

    pub fn attach(&self, slot_index: usize, instance_id: InstanceId) {
        self.push(RawNotification::DeviceAdded {
            slot_index,
            descriptor: DeviceDescriptor {
                instance_id,
                name: format!("Scripted Pad {slot_index}"),
            },
        });
    }

    pub fn detach(&self, instance_id: InstanceId) {
        self.push(RawNotification::DeviceRemoved { instance_id });
    }

    pub fn button(&self, instance_id: InstanceId, button: RawButton, pressed: bool) {
        self.push(RawNotification::ButtonChanged {
            instance_id,
            button,
            pressed,
        });
    }

    pub fn axis(&self, instance_id: InstanceId, axis: RawAxis, value: i16) {
        self.push(RawNotification::AxisMoved {
            instance_id,
            axis,
            value,
        });
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

impl InputBackend for ScriptedBackend {
    fn initialize(mappings: &MappingDatabase) -> Result<Self, BackendError> {
        debug!(
            "Scripted backend ignores {} mappings from {}",
            mappings.len(),
            mappings.source()
        );
        Ok(Self::default())
    }

    fn poll(&mut self) -> Option<RawNotification> {
        self.queue.lock().ok()?.pop_front()
    }
}
