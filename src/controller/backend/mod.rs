//! Hardware notification sources
//!
//! A backend turns whatever the platform reports into [`RawNotification`]s.
//! The poll loop only ever asks for the next pending notification and never
//! waits for one, so `poll` must return `None` immediately when nothing is
//! queued.

pub mod gilrs_backend;
pub mod scripted;
pub mod slots;

pub use gilrs_backend::GilrsBackend;
pub use scripted::{ScriptHandle, ScriptedBackend};
pub use slots::{Session, SlotAllocator};

use crate::controller::device::{DeviceDescriptor, InstanceId};
use crate::controller::translator::{RawAxis, RawButton};
use crate::mapping_db::MappingDatabase;

/// One hardware notification, as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNotification {
    /// A controller appeared in a hardware slot.
    DeviceAdded {
        slot_index: usize,
        descriptor: DeviceDescriptor,
    },
    /// The attach session `instance_id` ended.
    DeviceRemoved { instance_id: InstanceId },
    ButtonChanged {
        instance_id: InstanceId,
        button: RawButton,
        pressed: bool,
    },
    AxisMoved {
        instance_id: InstanceId,
        axis: RawAxis,
        value: i16,
    },
    HatMoved {
        instance_id: InstanceId,
        hat: u8,
        value: u8,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to initialize input subsystem: {0}")]
    InitializationError(String),

    #[error("Input subsystem rejected controller mappings: {0}")]
    MappingError(String),
}

/// Source of raw hardware notifications.
pub trait InputBackend: Send + 'static {
    /// Brings the input subsystem up with the given mapping database loaded.
    fn initialize(mappings: &MappingDatabase) -> Result<Self, BackendError>
    where
        Self: Sized;

    /// Next pending notification, or `None` if nothing is queued.
    fn poll(&mut self) -> Option<RawNotification>;

    /// Releases the input subsystem. The poll loop must be stopped first.
    fn shutdown(self)
    where
        Self: Sized,
    {
    }
}

/// Scales a normalized `[-1.0, 1.0]` axis value into the raw `i16` range.
pub fn axis_to_raw(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}
