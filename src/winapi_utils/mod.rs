//! Safe wrappers around Windows API calls.
//!
//! This module provides the Win32 side of the keyboard hook: registration on
//! a message-pumping thread and the hook procedure itself.

pub mod hooks;
pub mod keyboard;
pub mod message_loop;

pub use hooks::*;
pub use keyboard::*;
pub use message_loop::*;
