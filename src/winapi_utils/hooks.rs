//! Windows low-level keyboard hook registration.
//!
//! The hook is installed on a dedicated `keyboard-hook` thread that pumps
//! messages for as long as the hook lives. Releasing it posts `WM_QUIT` to
//! that thread, which unhooks and hands the result back through its join
//! handle.
//!
//! Only one `WH_KEYBOARD_LL` hook may exist per process, however many
//! backends are constructed: every event from it is routed into the same
//! global context, so a second hook would dispatch each key twice.

use super::keyboard::keyboard_hook_proc;
use super::message_loop::{
    current_thread_id, ensure_message_queue, post_quit_message, run_message_loop,
};
use crate::error::{HookError, Result};
use crate::keyboard::backend::{HookBackend, HookHandle, HookSlot};
use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};
use windows::Win32::UI::WindowsAndMessaging::{
    SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL,
};

const HOOK_TYPE: &str = "keyboard_ll";
const HOOK_THREAD_NAME: &str = "keyboard-hook";

static KEYBOARD_HOOK_SLOT: HookSlot = HookSlot::new();

struct HookThread {
    thread_id: u32,
    join: JoinHandle<std::result::Result<(), String>>,
}

/// [`HookBackend`] backed by `SetWindowsHookExW(WH_KEYBOARD_LL)`.
#[derive(Default)]
pub struct KeyboardHookBackend {
    thread: Mutex<Option<HookThread>>,
}

impl HookBackend for KeyboardHookBackend {
    fn register(&self) -> Result<HookHandle> {
        KEYBOARD_HOOK_SLOT.claim(HOOK_TYPE)?;
        self.spawn_hook_thread().inspect_err(|_| KEYBOARD_HOOK_SLOT.vacate())
    }

    fn release(&self, handle: HookHandle) -> Result<()> {
        let hook_thread = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(hook_thread) = hook_thread else {
            return Err(HookError::Release(format!("{handle:?} has no hook thread")));
        };

        if let Err(e) = post_quit_message(hook_thread.thread_id, 0) {
            // The thread keeps running and still owns the slot; the manager has
            // already deactivated dispatch.
            return Err(HookError::Release(format!("could not stop hook thread: {e}")));
        }

        // The hook is gone once its thread has exited, whatever the unhook result.
        let joined = hook_thread.join.join();
        KEYBOARD_HOOK_SLOT.vacate();

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(HookError::Release(message)),
            Err(_) => Err(HookError::Release("hook thread panicked".into())),
        }
    }
}

impl KeyboardHookBackend {
    fn spawn_hook_thread(&self) -> Result<HookHandle> {
        let (ready_tx, ready_rx) =
            mpsc::sync_channel::<std::result::Result<(isize, u32), String>>(1);

        let join = thread::Builder::new()
            .name(HOOK_THREAD_NAME.to_string())
            .spawn(move || {
                ensure_message_queue();

                // The proc must stay fast: it only decodes input and calls try_send.
                let installed = unsafe {
                    SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0)
                };
                let hook = match installed {
                    Ok(hook) => hook,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok((hook.0 as isize, current_thread_id())));

                run_message_loop();

                let result = unsafe { UnhookWindowsHookEx(hook) };
                match result {
                    Ok(()) => {
                        tracing::info!(hook_type = HOOK_TYPE, "Hook uninstalled successfully");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(hook_type = HOOK_TYPE, error = ?e, "Failed to unhook");
                        Err(e.to_string())
                    }
                }
            })
            .map_err(|e| HookError::Registration(format!("failed to spawn hook thread: {e}")))?;

        let (raw, thread_id) = match ready_rx.recv() {
            Ok(Ok(registered)) => registered,
            Ok(Err(message)) => {
                let _ = join.join();
                return Err(HookError::Registration(message));
            }
            Err(_) => {
                let _ = join.join();
                return Err(HookError::Registration(
                    "hook thread exited before registering".into(),
                ));
            }
        };

        let handle = HookHandle::new(raw, HOOK_TYPE)?;
        tracing::info!(hook_type = HOOK_TYPE, thread_id, "Hook installed successfully");

        let previous = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(HookThread { thread_id, join });
        debug_assert!(previous.is_none(), "second keyboard hook thread registered");
        Ok(handle)
    }
}
