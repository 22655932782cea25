//! keyhook - global low-level keyboard interception.
//!
//! Installs a system-wide keyboard hook, optionally swallows intercepted
//! keys, and delivers each key transition to a registered consumer without
//! ever blocking the OS input pipeline.

pub mod config;
pub mod error;
pub mod keyboard;
pub mod logging;

#[cfg(windows)]
pub mod winapi_utils;

pub use config::HookConfig;
pub use error::{HookError, Result};
pub use keyboard::{ChannelStats, HookDecision, KeyEvent};
