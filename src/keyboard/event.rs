//! Data types for keyboard interception.
//!
//! Defines the raw input decoded from the OS hook, the immutable event
//! record delivered to consumers, and the hook's per-event verdict.

use serde::{Deserialize, Serialize};

/// Virtual key code of the `A` key.
pub const VK_A: u32 = 0x41;

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyDirection {
    Down,
    Up,
}

impl KeyDirection {
    pub fn is_down(self) -> bool {
        matches!(self, KeyDirection::Down)
    }
}

/// Snapshot of modifier keys taken at dispatch time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        alt: false,
        ctrl: false,
        shift: false,
    };
}

/// One hardware key transition as decoded from the hook's input struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyInput {
    /// Windows virtual key code.
    pub key_code: u32,
    /// Hardware scan code.
    pub scan_code: u32,
    pub direction: KeyDirection,
    /// `true` for extended keys (right-side modifiers, arrows, numpad Enter).
    pub is_extended: bool,
}

impl RawKeyInput {
    pub fn key_down(key_code: u32, scan_code: u32) -> Self {
        Self {
            key_code,
            scan_code,
            direction: KeyDirection::Down,
            is_extended: false,
        }
    }

    pub fn key_up(key_code: u32, scan_code: u32) -> Self {
        Self {
            key_code,
            scan_code,
            direction: KeyDirection::Up,
            is_extended: false,
        }
    }

    pub fn extended(mut self) -> Self {
        self.is_extended = true;
        self
    }
}

/// Immutable record of one key transition, delivered to the consumer.
///
/// Serializes with camelCase field names (`keyCode`, `isKeyDown`, ...) so a
/// host runtime can forward it as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub key_code: u32,
    pub scan_code: u32,
    pub is_key_down: bool,
    pub is_extended: bool,
    pub is_alt_pressed: bool,
    pub is_ctrl_pressed: bool,
    pub is_shift_pressed: bool,
}

impl KeyEvent {
    /// Builds the event from decoded input and a modifier snapshot.
    pub fn new(input: RawKeyInput, modifiers: Modifiers) -> Self {
        Self {
            key_code: input.key_code,
            scan_code: input.scan_code,
            is_key_down: input.direction.is_down(),
            is_extended: input.is_extended,
            is_alt_pressed: modifiers.alt,
            is_ctrl_pressed: modifiers.ctrl,
            is_shift_pressed: modifiers.shift,
        }
    }

    pub fn direction(&self) -> KeyDirection {
        if self.is_key_down {
            KeyDirection::Down
        } else {
            KeyDirection::Up
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            alt: self.is_alt_pressed,
            ctrl: self.is_ctrl_pressed,
            shift: self.is_shift_pressed,
        }
    }
}

/// What the hook tells the OS to do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Hand the event to the next hook / default OS handling.
    PassThrough,
    /// Swallow the event; it does not propagate further.
    Consume,
}
