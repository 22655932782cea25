//! Hook lifecycle and the dispatch entry point.
//!
//! # Performance Critical
//!
//! [`HookManager::dispatch`] runs synchronously inside the OS input pipeline.
//! Any delay there causes system-wide input lag, so it only:
//! - reads the mode flags (atomics)
//! - updates the key state map
//! - does a non-blocking `try_send` into the event channel
//!
//! # States
//!
//! `Uninstalled -> Installed(active) -> Uninstalled`. Both transitions are
//! idempotent and serialised by the handle lock, so two concurrent installs
//! never register two hooks.
//!
//! Uninstall clears the active flag, then waits for dispatch calls that
//! already passed the flag check before releasing the hook and clearing key
//! state. No dispatch call touches key state or the channel after
//! `uninstall` returns.

use super::backend::{HookBackend, HookHandle};
use super::channel::EventChannel;
use super::event::{HookDecision, KeyEvent, Modifiers, RawKeyInput};
use super::key_state::KeyStateTracker;
use crate::error::{HookError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Owns the hook registration, the mode flags and key state.
///
/// Key state is only written by [`HookManager::dispatch`]; it is not
/// reachable from outside the crate:
///
/// ```compile_fail
/// use keyhook::keyboard::{EventChannel, HookManager, UnsupportedBackend};
///
/// let manager = HookManager::new(UnsupportedBackend, EventChannel::default());
/// manager.key_state().record(0x41, true);
/// ```
pub struct HookManager<B: HookBackend> {
    backend: B,
    handle: Mutex<Option<HookHandle>>,
    hook_active: AtomicBool,
    /// Dispatch calls currently between the active check and their return.
    in_flight: AtomicUsize,
    consume_mode: AtomicBool,
    key_state: KeyStateTracker,
    channel: EventChannel,
}

impl<B: HookBackend> HookManager<B> {
    pub fn new(backend: B, channel: EventChannel) -> Self {
        Self {
            backend,
            handle: Mutex::new(None),
            hook_active: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            consume_mode: AtomicBool::new(false),
            key_state: KeyStateTracker::new(),
            channel,
        }
    }

    /// Registers the keyboard hook. Succeeds without doing anything if a
    /// hook is already installed.
    pub fn install(&self) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            tracing::debug!("Keyboard hook already installed");
            return Ok(());
        }

        let registered = self.backend.register()?;
        tracing::info!(handle = ?registered, "Keyboard hook installed");
        *handle = Some(registered);
        self.hook_active.store(true, Ordering::Release);
        Ok(())
    }

    /// Releases the keyboard hook. Succeeds without doing anything if no
    /// hook is installed.
    ///
    /// Local state is reset even when the OS release fails.
    pub fn uninstall(&self) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        let Some(registered) = handle.take() else {
            tracing::debug!("Keyboard hook not installed");
            return Ok(());
        };

        // Dispatch calls that race with the release must see the hook as inactive.
        self.hook_active.store(false, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }

        let result = self.backend.release(registered);
        self.key_state.clear();

        match result {
            Ok(()) => {
                tracing::info!("Keyboard hook uninstalled");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Keyboard hook release failed; local state reset");
                Err(match e {
                    HookError::Release(_) => e,
                    other => HookError::Release(other.to_string()),
                })
            }
        }
    }

    /// Handles one key transition on the OS dispatch thread.
    ///
    /// `modifiers` is only sampled when the hook is active.
    pub fn dispatch(
        &self,
        input: RawKeyInput,
        modifiers: impl FnOnce() -> Modifiers,
    ) -> HookDecision {
        let _in_flight = InFlight::enter(&self.in_flight);
        self.dispatch_active(input, modifiers)
    }

    fn dispatch_active(
        &self,
        input: RawKeyInput,
        modifiers: impl FnOnce() -> Modifiers,
    ) -> HookDecision {
        if !self.hook_active.load(Ordering::SeqCst) {
            return HookDecision::PassThrough;
        }

        let transition = self
            .key_state
            .record(input.key_code, input.direction.is_down());
        let event = KeyEvent::new(input, modifiers());
        tracing::trace!(key_code = event.key_code, ?transition, "Key event");

        self.channel.send(event);

        if self.consume_mode.load(Ordering::Acquire) {
            HookDecision::Consume
        } else {
            HookDecision::PassThrough
        }
    }

    pub fn set_consume_mode(&self, enabled: bool) {
        let previous = self.consume_mode.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::info!(enabled, "Consume mode changed");
        }
    }

    pub fn consume_mode(&self) -> bool {
        self.consume_mode.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.hook_active.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(HookHandle::is_live))
            .unwrap_or(false)
    }

    pub(crate) fn key_state(&self) -> &KeyStateTracker {
        &self.key_state
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Counts a dispatch call for the duration of its scope, unwinding included.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
