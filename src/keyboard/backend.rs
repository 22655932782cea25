//! OS registration seam for the keyboard hook.
//!
//! The hook manager talks to the operating system only through
//! [`HookBackend`]. The Windows implementation lives in
//! `winapi_utils::hooks`; other platforms get [`UnsupportedBackend`].

use crate::error::{HookError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque token for a live OS hook registration.
///
/// Not `Clone`: the hook manager holds the only instance, which is what
/// keeps a second registration from ever existing.
pub struct HookHandle {
    raw: isize,
    hook_type: &'static str,
}

impl HookHandle {
    /// Wraps a raw registration value. A zero value is never a live hook.
    pub fn new(raw: isize, hook_type: &'static str) -> Result<Self> {
        if raw == 0 {
            return Err(HookError::Registration(format!(
                "{hook_type}: OS returned a null hook handle"
            )));
        }
        Ok(Self { raw, hook_type })
    }

    pub fn raw(&self) -> isize {
        self.raw
    }

    pub fn is_live(&self) -> bool {
        self.raw != 0
    }
}

impl fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookHandle")
            .field("hook_type", &self.hook_type)
            .field("raw", &format_args!("{:#x}", self.raw))
            .finish()
    }
}

/// Registers and releases the OS-level keyboard hook.
pub trait HookBackend: Send + Sync {
    /// Registers the hook with the OS input subsystem.
    fn register(&self) -> Result<HookHandle>;

    /// Releases a registration previously returned by `register`.
    ///
    /// Must not return while the OS is still running the hook procedure for
    /// this registration; callers clear per-hook state right after.
    fn release(&self, handle: HookHandle) -> Result<()>;

    /// Whether this backend can register a hook at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Process-wide claim on a single OS hook.
///
/// Backends keep one of these in a `static` so that independent
/// [`HookBackend`] instances cannot register the same hook twice.
#[derive(Debug, Default)]
pub struct HookSlot {
    live: AtomicBool,
}

impl HookSlot {
    pub const fn new() -> Self {
        Self {
            live: AtomicBool::new(false),
        }
    }

    /// Claims the slot, failing if another registration already holds it.
    pub fn claim(&self, hook_type: &'static str) -> Result<()> {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                HookError::Registration(format!(
                    "a {hook_type} hook is already installed in this process"
                ))
            })
    }

    pub fn vacate(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_claimed(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Backend for platforms without a low-level keyboard hook.
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl HookBackend for UnsupportedBackend {
    fn register(&self) -> Result<HookHandle> {
        Err(HookError::Unsupported(
            "low-level keyboard hooks are only available on Windows",
        ))
    }

    fn release(&self, _handle: HookHandle) -> Result<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(windows)]
pub type PlatformBackend = crate::winapi_utils::KeyboardHookBackend;

#[cfg(not(windows))]
pub type PlatformBackend = UnsupportedBackend;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_rejected() {
        assert!(matches!(
            HookHandle::new(0, "keyboard_ll"),
            Err(HookError::Registration(_))
        ));

        let handle = HookHandle::new(0x2a, "keyboard_ll").unwrap();
        assert!(handle.is_live());
        assert_eq!(handle.raw(), 0x2a);
    }

    #[test]
    fn test_hook_slot_allows_one_claim() {
        let slot = HookSlot::new();

        slot.claim("keyboard_ll").unwrap();
        assert!(slot.is_claimed());
        assert!(matches!(
            slot.claim("keyboard_ll"),
            Err(HookError::Registration(_))
        ));

        slot.vacate();
        assert!(!slot.is_claimed());
        slot.claim("keyboard_ll").unwrap();
    }

    #[test]
    fn test_unsupported_backend() {
        let backend = UnsupportedBackend;
        assert!(!backend.is_available());
        assert!(matches!(backend.register(), Err(HookError::Unsupported(_))));
    }
}
