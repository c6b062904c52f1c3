//! Controller subsystem: hot-plug tracking and event normalization
//!
//! 1. [`backend`] - Raw hardware notifications (gilrs, scripted)
//! 2. [`registry`] - Slot arena of attached devices behind one lock
//! 3. [`translator`] - Raw button codes to logical buttons
//! 4. [`poll_loop`] - Timed drain and dispatch
//! 5. [`startup`] - Mapping database and backend initialization
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Backend ──► Poll Loop ──► Registry ──► HotplugNotification
//!                          (drain)      (resolve) ──► Translator ──► Device sink
//! ```

pub mod backend;
pub mod device;
pub mod poll_loop;
pub mod registry;
pub mod startup;
pub mod translator;

pub use backend::{InputBackend, RawNotification};
pub use device::{DeviceInfo, DeviceRef, InputDeviceEvent, InstanceId};
pub use poll_loop::{HotplugNotification, PollLoop, PollLoopError, PollLoopHandle};
pub use registry::{ConnectedDevice, DeviceRegistry, RegistryError, MAX_DEVICES};
pub use startup::{InputStartup, InputSubsystem, StartupError};
pub use translator::{translate, InputEventKind, RawAxis, RawButton};
