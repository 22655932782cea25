//! Error types for the keyboard hook pipeline.

use thiserror::Error;

/// Errors surfaced by hook control calls.
///
/// Nothing in this enum ever crosses the OS callback boundary: the dispatch
/// path handles every failure by passing the event through.
#[derive(Debug, Error)]
pub enum HookError {
    /// The OS refused to register the hook (e.g. insufficient privilege).
    #[error("failed to register keyboard hook: {0}")]
    Registration(String),

    /// The OS refused to release the hook. Local state has been reset anyway.
    #[error("failed to release keyboard hook: {0}")]
    Release(String),

    /// The consumer dispatcher thread could not be started.
    #[error("failed to start consumer dispatcher: {0}")]
    Consumer(String),

    /// A control call received malformed input and made no state change.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A control call arrived before the process-wide context was initialised.
    #[error("keyboard hook context not initialised; call keyboard::init first")]
    NotReady,

    /// This platform has no low-level keyboard hook.
    #[error("platform not supported: {0}")]
    Unsupported(&'static str),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HookError>;
