//! Device - one attached controller and its event sink
//!
//! A [`Device`] is owned by the registry for exactly one attach session. The
//! consumer side never holds the device itself; it receives a [`DeviceInfo`]
//! snapshot plus the receiving end of the device's event channel. When the
//! registry drops the device on detach, the sender goes with it and the
//! consumer's receiver ends.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::translator::{InputEventKind, RawAxis};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies a single attach session. Never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocates a fresh process-unique id.
    pub fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        InstanceId(raw)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the hardware source knows about a device at attach time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub instance_id: InstanceId,
    pub name: String,
}

/// Non-owning back-reference to the device an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub slot_index: usize,
    pub instance_id: InstanceId,
}

/// Snapshot of a device's identity and configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub slot_index: usize,
    pub instance_id: InstanceId,
    pub name: String,
    pub dead_zone: i16,
}

/// Normalized button transition delivered to a device's sink.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDeviceEvent {
    pub kind: InputEventKind,
    pub pressed: bool,
    pub owner: DeviceRef,
    pub timestamp: DateTime<Local>,
}

/// Side of an axis relative to its rest position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisDirection {
    Negative,
    Positive,
}

/// A dead-zone crossing on one side of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisTransition {
    pub axis: RawAxis,
    pub direction: AxisDirection,
    pub pressed: bool,
}

#[derive(Debug)]
pub struct Device {
    info: DeviceInfo,
    sink: mpsc::Sender<InputDeviceEvent>,
    axis_pressed: HashMap<(RawAxis, AxisDirection), bool>,
}

impl Device {
    /// Creates the device together with the receiving end of its sink.
    pub fn open(
        slot_index: usize,
        descriptor: DeviceDescriptor,
        dead_zone: i16,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<InputDeviceEvent>) {
        let (sink, events) = mpsc::channel(event_buffer.max(1));
        let info = DeviceInfo {
            slot_index,
            instance_id: descriptor.instance_id,
            name: descriptor.name,
            dead_zone,
        };
        debug!(
            "Opened device '{}' in slot {} as instance {}",
            info.name, slot_index, info.instance_id
        );

        (
            Self {
                info,
                sink,
                axis_pressed: HashMap::new(),
            },
            events,
        )
    }

    pub fn slot_index(&self) -> usize {
        self.info.slot_index
    }

    pub fn instance_id(&self) -> InstanceId {
        self.info.instance_id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef {
            slot_index: self.info.slot_index,
            instance_id: self.info.instance_id,
        }
    }

    /// Hands an event to the consumer. Returns `false` if it had to be dropped.
    pub fn insert(&self, event: InputDeviceEvent) -> bool {
        match self.sink.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event sink of device {} is full, dropping {:?}",
                    self.info.instance_id, event.kind
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    "Nobody listens to device {} anymore, dropping event",
                    self.info.instance_id
                );
                false
            }
        }
    }

    /// Feeds a raw axis value through the dead zone and reports every side of
    /// the axis whose pressed state changed.
    pub fn update_axis(&mut self, axis: RawAxis, value: i16) -> Vec<AxisTransition> {
        let magnitude = i32::from(value).abs();
        let pressed = magnitude > i32::from(self.info.dead_zone);

        let mut transitions = Vec::new();
        for direction in [AxisDirection::Negative, AxisDirection::Positive] {
            let on_this_side = match direction {
                AxisDirection::Negative => value < 0,
                AxisDirection::Positive => value > 0,
            };
            let now = pressed && on_this_side;
            let before = self
                .axis_pressed
                .insert((axis, direction), now)
                .unwrap_or(false);

            if before != now {
                transitions.push(AxisTransition {
                    axis,
                    direction,
                    pressed: now,
                });
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dead_zone: i16) -> (Device, mpsc::Receiver<InputDeviceEvent>) {
        let descriptor = DeviceDescriptor {
            instance_id: InstanceId::from_raw(7),
            name: "Test Pad".to_string(),
        };
        Device::open(3, descriptor, dead_zone, 4)
    }

    #[test]
    fn instance_ids_are_never_reused() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn delivers_into_sink() {
        let (device, mut events) = open(8000);
        let event = InputDeviceEvent {
            kind: InputEventKind::Start,
            pressed: true,
            owner: device.device_ref(),
            timestamp: Local::now(),
        };

        assert!(device.insert(event));
        let received = events.try_recv().unwrap();
        assert_eq!(received.kind, InputEventKind::Start);
        assert_eq!(received.owner.slot_index, 3);
        assert_eq!(received.owner.instance_id, InstanceId::from_raw(7));
    }

    #[test]
    fn full_sink_drops_instead_of_blocking() {
        let descriptor = DeviceDescriptor {
            instance_id: InstanceId::from_raw(1),
            name: "Tiny".to_string(),
        };
        let (device, _events) = Device::open(0, descriptor, 0, 1);
        let event = InputDeviceEvent {
            kind: InputEventKind::A,
            pressed: true,
            owner: device.device_ref(),
            timestamp: Local::now(),
        };

        assert!(device.insert(event.clone()));
        assert!(!device.insert(event));
    }

    #[test]
    fn axis_inside_dead_zone_is_released() {
        let (mut device, _events) = open(8000);
        assert!(device.update_axis(RawAxis::LEFT_X, 8000).is_empty());
        assert!(device.update_axis(RawAxis::LEFT_X, -7999).is_empty());
    }

    #[test]
    fn axis_crossing_reports_press_and_release() {
        let (mut device, _events) = open(8000);

        let pressed = device.update_axis(RawAxis::LEFT_Y, 20000);
        assert_eq!(
            pressed,
            vec![AxisTransition {
                axis: RawAxis::LEFT_Y,
                direction: AxisDirection::Positive,
                pressed: true,
            }]
        );

        // Repeated values past the threshold are not new transitions
        assert!(device.update_axis(RawAxis::LEFT_Y, 30000).is_empty());

        let released = device.update_axis(RawAxis::LEFT_Y, 100);
        assert_eq!(released.len(), 1);
        assert!(!released[0].pressed);
    }

    #[test]
    fn axis_flip_releases_one_side_and_presses_the_other() {
        let (mut device, _events) = open(8000);
        device.update_axis(RawAxis::RIGHT_X, i16::MAX);

        let flipped = device.update_axis(RawAxis::RIGHT_X, i16::MIN);
        assert_eq!(flipped.len(), 2);
        assert!(flipped.contains(&AxisTransition {
            axis: RawAxis::RIGHT_X,
            direction: AxisDirection::Negative,
            pressed: true,
        }));
        assert!(flipped.contains(&AxisTransition {
            axis: RawAxis::RIGHT_X,
            direction: AxisDirection::Positive,
            pressed: false,
        }));
    }
}
