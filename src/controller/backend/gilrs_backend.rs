use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs, GilrsBuilder};
use std::collections::VecDeque;
use tracing::{debug, error, info, trace, warn};

use super::{axis_to_raw, BackendError, InputBackend, RawNotification, SlotAllocator};
use crate::controller::device::{DeviceDescriptor, InstanceId};
use crate::controller::registry::MAX_DEVICES;
use crate::controller::translator::{RawAxis, RawButton};
use crate::mapping_db::MappingDatabase;

/// Backend reading gamepads through gilrs.
///
/// gilrs hands every new physical pad a new [`GamepadId`], so ids are not a
/// bounded slot domain. Each connect takes the lowest free slot and opens a new
/// attach session with its own [`InstanceId`]; the slot is freed on disconnect.
#[derive(Debug)]
pub struct GilrsBackend {
    gilrs: Gilrs,
    sessions: SlotAllocator<GamepadId>,
    pending: VecDeque<RawNotification>,
}

impl GilrsBackend {
    fn open_session(&mut self, id: GamepadId) -> Option<RawNotification> {
        let name = self.gilrs.gamepad(id).name().to_string();
        let Some(session) = self.sessions.open(id) else {
            warn!(
                "No free slot for gamepad {} ('{}'), all {} slots are taken",
                id, name, MAX_DEVICES
            );
            return None;
        };

        Some(RawNotification::DeviceAdded {
            slot_index: session.slot_index,
            descriptor: DeviceDescriptor {
                instance_id: session.instance_id,
                name,
            },
        })
    }

    fn convert_gilrs_event(&mut self, id: GamepadId, event: EventType) -> Option<RawNotification> {
        match event {
            EventType::Connected => self.open_session(id),
            EventType::Disconnected => match self.sessions.close(id) {
                Some(session) => Some(RawNotification::DeviceRemoved {
                    instance_id: session.instance_id,
                }),
                None => {
                    warn!("Disconnect for gamepad {} without a slot", id);
                    None
                }
            },
            EventType::ButtonPressed(button, _) => self.button(id, button, true),
            EventType::ButtonReleased(button, _) => self.button(id, button, false),
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
                self.axis(id, RawAxis::TRIGGER_LEFT, axis_to_raw(value))
            }
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                self.axis(id, RawAxis::TRIGGER_RIGHT, axis_to_raw(value))
            }
            EventType::AxisChanged(axis, value, _) => match map_axis(axis) {
                // gilrs reports stick-up as positive, the raw layout expects negative
                Some(raw @ (RawAxis::LEFT_Y | RawAxis::RIGHT_Y)) => {
                    self.axis(id, raw, axis_to_raw(-value))
                }
                Some(raw) => self.axis(id, raw, axis_to_raw(value)),
                None => {
                    trace!("Ignoring unsupported axis: {:?}", axis);
                    None
                }
            },
            other => {
                trace!("Unhandled gilrs event type: {:?}", other);
                None
            }
        }
    }

    fn session(&self, id: GamepadId) -> Option<InstanceId> {
        let instance_id = self.sessions.get(id).map(|session| session.instance_id);
        if instance_id.is_none() {
            debug!("Input from gamepad {} without an open session", id);
        }
        instance_id
    }

    fn button(&self, id: GamepadId, button: Button, pressed: bool) -> Option<RawNotification> {
        Some(RawNotification::ButtonChanged {
            instance_id: self.session(id)?,
            button: map_button(button),
            pressed,
        })
    }

    fn axis(&self, id: GamepadId, axis: RawAxis, value: i16) -> Option<RawNotification> {
        Some(RawNotification::AxisMoved {
            instance_id: self.session(id)?,
            axis,
            value,
        })
    }
}

impl InputBackend for GilrsBackend {
    fn initialize(mappings: &MappingDatabase) -> Result<Self, BackendError> {
        info!(
            "Initializing gilrs with {} controller mappings from {}",
            mappings.len(),
            mappings.source()
        );

        let gilrs = GilrsBuilder::new()
            .add_mappings(mappings.as_sdl_text())
            .build()
            .map_err(|e| {
                error!("Failed to initialize gilrs: {}", e);
                match e {
                    gilrs::Error::InvalidAxisToBtn => BackendError::MappingError(e.to_string()),
                    other => BackendError::InitializationError(other.to_string()),
                }
            })?;

        let mut backend = Self {
            gilrs,
            sessions: SlotAllocator::default(),
            pending: VecDeque::new(),
        };

        // Pads that were plugged in before startup
        let present: Vec<GamepadId> = backend
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, _)| id)
            .collect();
        info!("Found {} gamepads at startup", present.len());
        for id in present {
            if let Some(added) = backend.open_session(id) {
                backend.pending.push_back(added);
            }
        }

        Ok(backend)
    }

    fn poll(&mut self) -> Option<RawNotification> {
        if let Some(notification) = self.pending.pop_front() {
            return Some(notification);
        }

        while let Some(Event { id, event, time, .. }) = self.gilrs.next_event() {
            trace!("gilrs event {:?} from {} at {:?}", event, id, time);
            if let Some(notification) = self.convert_gilrs_event(id, event) {
                return Some(notification);
            }
        }
        None
    }

    fn shutdown(self) {
        info!(
            "Shutting down gilrs with {} open sessions",
            self.sessions.len()
        );
    }
}

fn map_button(button: Button) -> RawButton {
    match button {
        Button::South => RawButton::A,
        Button::East => RawButton::B,
        Button::West => RawButton::X,
        Button::North => RawButton::Y,
        Button::Select => RawButton::BACK,
        Button::Mode => RawButton::GUIDE,
        Button::Start => RawButton::START,
        Button::LeftThumb => RawButton::LEFT_STICK,
        Button::RightThumb => RawButton::RIGHT_STICK,
        Button::LeftTrigger => RawButton::LEFT_SHOULDER,
        Button::RightTrigger => RawButton::RIGHT_SHOULDER,
        Button::DPadUp => RawButton::DPAD_UP,
        Button::DPadDown => RawButton::DPAD_DOWN,
        Button::DPadLeft => RawButton::DPAD_LEFT,
        Button::DPadRight => RawButton::DPAD_RIGHT,
        _ => RawButton::UNMAPPED,
    }
}

fn map_axis(axis: Axis) -> Option<RawAxis> {
    match axis {
        Axis::LeftStickX => Some(RawAxis::LEFT_X),
        Axis::LeftStickY => Some(RawAxis::LEFT_Y),
        Axis::RightStickX => Some(RawAxis::RIGHT_X),
        Axis::RightStickY => Some(RawAxis::RIGHT_Y),
        Axis::LeftZ => Some(RawAxis::TRIGGER_LEFT),
        Axis::RightZ => Some(RawAxis::TRIGGER_RIGHT),
        _ => None,
    }
}
