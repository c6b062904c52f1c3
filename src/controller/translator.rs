//! Event Translator - raw button codes to abstract input kinds
//!
//! Raw codes follow the SDL game-controller button numbering, which is what the
//! bundled mapping database normalizes every pad to. Anything without an entry
//! (guide/home, paddles, vendor extras) becomes [`InputEventKind::Unknown`] and
//! is dropped by the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware button code as reported by the input backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawButton(pub u8);

impl RawButton {
    pub const A: RawButton = RawButton(0);
    pub const B: RawButton = RawButton(1);
    pub const X: RawButton = RawButton(2);
    pub const Y: RawButton = RawButton(3);
    pub const BACK: RawButton = RawButton(4);
    pub const GUIDE: RawButton = RawButton(5);
    pub const START: RawButton = RawButton(6);
    pub const LEFT_STICK: RawButton = RawButton(7);
    pub const RIGHT_STICK: RawButton = RawButton(8);
    pub const LEFT_SHOULDER: RawButton = RawButton(9);
    pub const RIGHT_SHOULDER: RawButton = RawButton(10);
    pub const DPAD_UP: RawButton = RawButton(11);
    pub const DPAD_DOWN: RawButton = RawButton(12);
    pub const DPAD_LEFT: RawButton = RawButton(13);
    pub const DPAD_RIGHT: RawButton = RawButton(14);

    /// Code used by backends for buttons outside the standard layout.
    pub const UNMAPPED: RawButton = RawButton(u8::MAX);
}

impl fmt::Display for RawButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "button#{}", self.0)
    }
}

/// Hardware axis code as reported by the input backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAxis(pub u8);

impl RawAxis {
    pub const LEFT_X: RawAxis = RawAxis(0);
    pub const LEFT_Y: RawAxis = RawAxis(1);
    pub const RIGHT_X: RawAxis = RawAxis(2);
    pub const RIGHT_Y: RawAxis = RawAxis(3);
    pub const TRIGGER_LEFT: RawAxis = RawAxis(4);
    pub const TRIGGER_RIGHT: RawAxis = RawAxis(5);
}

impl fmt::Display for RawAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis#{}", self.0)
    }
}

/// Logical buttons understood by the rest of the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputEventKind {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    Start,
    Select,
    L,
    R,
    L3,
    R3,
    Unknown,
}

impl InputEventKind {
    pub fn is_unknown(self) -> bool {
        self == InputEventKind::Unknown
    }
}

/// Maps a raw button code to its logical kind. Total over `u8`.
pub fn translate(button: RawButton) -> InputEventKind {
    match button {
        RawButton::A => InputEventKind::A,
        RawButton::B => InputEventKind::B,
        RawButton::X => InputEventKind::X,
        RawButton::Y => InputEventKind::Y,
        RawButton::BACK => InputEventKind::Select,
        RawButton::START => InputEventKind::Start,
        RawButton::DPAD_UP => InputEventKind::Up,
        RawButton::DPAD_DOWN => InputEventKind::Down,
        RawButton::DPAD_LEFT => InputEventKind::Left,
        RawButton::DPAD_RIGHT => InputEventKind::Right,
        RawButton::LEFT_SHOULDER => InputEventKind::L,
        RawButton::RIGHT_SHOULDER => InputEventKind::R,
        RawButton::LEFT_STICK => InputEventKind::L3,
        RawButton::RIGHT_STICK => InputEventKind::R3,
        // Guide is deliberately unmapped
        _ => InputEventKind::Unknown,
    }
}
