//! Windows message loop utilities.
//!
//! Low-level hooks are serviced through the message queue of the thread that
//! installed them, so the hook thread runs [`run_message_loop`] for as long
//! as the hook is registered.

use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WM_QUIT, WM_USER,
};

/// Returns the calling thread's Win32 thread ID.
pub fn current_thread_id() -> u32 {
    unsafe { GetCurrentThreadId() }
}

/// Forces creation of the calling thread's message queue.
///
/// `PostThreadMessageW` fails for a thread that has no queue yet, so the hook
/// thread calls this before reporting its ID to anyone who may post to it.
pub fn ensure_message_queue() {
    let mut msg = MSG::default();
    unsafe {
        let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
    }
}

/// Runs the message loop on the calling thread until `WM_QUIT` is received.
///
/// # Important
/// If this loop is blocked or too slow, Windows silently removes low-level
/// hooks installed by this thread.
pub fn run_message_loop() {
    let thread_id = current_thread_id();
    tracing::debug!(thread_id, "Message loop starting");

    let mut msg = MSG::default();

    unsafe {
        // GetMessageW returns:
        // - Positive: message retrieved
        // - 0: WM_QUIT received
        // - -1: error occurred
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    tracing::debug!(thread_id, "Message loop exited");
}

/// Posts `WM_QUIT` to the given thread's message loop.
pub fn post_quit_message(thread_id: u32, exit_code: i32) -> windows::core::Result<()> {
    let result = unsafe {
        PostThreadMessageW(
            thread_id,
            WM_QUIT,
            WPARAM(exit_code as usize),
            LPARAM(0),
        )
    };

    match &result {
        Ok(()) => tracing::debug!(exit_code, thread_id, "Posted quit message"),
        Err(e) => tracing::error!(?e, thread_id, "Failed to post quit message"),
    }
    result
}
