//! Last-known down/up state per virtual key.
//!
//! Written only from the hook dispatch path and cleared on uninstall. The
//! map is small (one entry per key ever seen) and the lock is uncontended in
//! practice: the only other writer is `clear`, which runs after the hook has
//! been deactivated.

use std::collections::HashMap;
use std::sync::Mutex;

/// Classification of a recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    /// Key went from up (or unseen) to down.
    Pressed,
    /// Key was already down; auto-repeat.
    Repeated,
    /// Key went up.
    Released,
}

#[derive(Debug, Default)]
pub struct KeyStateTracker {
    states: Mutex<HashMap<u32, bool>>,
}

impl KeyStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transition and reports whether it was a press, a repeat or
    /// a release.
    pub(crate) fn record(&self, key_code: u32, is_down: bool) -> KeyTransition {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let was_down = states.insert(key_code, is_down).unwrap_or(false);

        match (was_down, is_down) {
            (true, true) => KeyTransition::Repeated,
            (false, true) => KeyTransition::Pressed,
            (_, false) => KeyTransition::Released,
        }
    }

    /// Returns the last-known state of a key. Unseen keys are up.
    pub fn is_down(&self, key_code: u32) -> bool {
        self.states
            .lock()
            .map(|s| s.get(&key_code).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Returns the keys currently recorded as down, sorted.
    pub fn pressed_keys(&self) -> Vec<u32> {
        let Ok(states) = self.states.lock() else {
            return Vec::new();
        };
        let mut keys: Vec<u32> = states
            .iter()
            .filter_map(|(&code, &down)| down.then_some(code))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of keys observed since the last clear.
    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
