//! Low-level keyboard hook procedure.
//!
//! # Performance Critical
//!
//! [`keyboard_hook_proc`] executes synchronously in the Windows input
//! pipeline. Any delay here causes system-wide input lag. It must:
//! - Never block on the consumer
//! - Never perform I/O
//! - Never unwind across the FFI boundary
//! - Call `CallNextHookEx` for every event it does not swallow

use crate::keyboard::control::dispatch_os_event;
use crate::keyboard::event::{HookDecision, KeyDirection, Modifiers, RawKeyInput};
use std::panic::catch_unwind;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_MENU, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, HC_ACTION, KBDLLHOOKSTRUCT, LLKHF_EXTENDED, WM_KEYDOWN, WM_SYSKEYDOWN,
};

/// Decodes the hook's message and input struct.
pub fn decode_input(message: u32, info: &KBDLLHOOKSTRUCT) -> RawKeyInput {
    let direction = if message == WM_KEYDOWN || message == WM_SYSKEYDOWN {
        KeyDirection::Down
    } else {
        KeyDirection::Up
    };

    RawKeyInput {
        key_code: info.vkCode,
        scan_code: info.scanCode,
        direction,
        is_extended: info.flags.0 & LLKHF_EXTENDED.0 != 0,
    }
}

fn is_pressed(key: VIRTUAL_KEY) -> bool {
    // High bit set means the key is down right now
    unsafe { GetAsyncKeyState(key.0 as i32) < 0 }
}

/// Samples the current Alt/Ctrl/Shift state.
pub fn snapshot_modifiers() -> Modifiers {
    Modifiers {
        alt: is_pressed(VK_MENU),
        ctrl: is_pressed(VK_CONTROL),
        shift: is_pressed(VK_SHIFT),
    }
}

/// Low-level keyboard hook callback.
///
/// # Safety
/// Called by Windows on the hook thread with `lparam` pointing to a valid
/// `KBDLLHOOKSTRUCT` whenever `code == HC_ACTION`.
pub unsafe extern "system" fn keyboard_hook_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code == HC_ACTION as i32 && lparam.0 != 0 {
        let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        let input = decode_input(wparam.0 as u32, info);

        // A panic here would unwind into the OS; pass the event through instead.
        let decision = catch_unwind(|| dispatch_os_event(input, snapshot_modifiers))
            .unwrap_or(HookDecision::PassThrough);

        if decision == HookDecision::Consume {
            return LRESULT(1);
        }
    }

    CallNextHookEx(None, code, wparam, lparam)
}
