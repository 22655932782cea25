//! Global low-level keyboard interception.
//!
//! Events flow from the OS hook procedure into [`HookManager::dispatch`],
//! which records key state, hands an owned [`KeyEvent`] to the
//! [`EventChannel`] and tells the OS whether to swallow the event. The
//! consumer callback runs on its own dispatcher thread.

pub mod backend;
pub mod channel;
pub mod control;
pub mod event;
pub mod key_state;
pub mod manager;

pub use backend::*;
pub use channel::*;
pub use control::*;
pub use event::*;
pub use key_state::*;
pub use manager::*;
