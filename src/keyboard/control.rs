//! Public control surface.
//!
//! A single process-wide [`KeyboardHook`] context is created by [`init`] and
//! reached only through the functions below. Every function returns a plain
//! success flag for the host and logs the reason on failure; calls made
//! before [`init`] are rejected.

use super::backend::{HookBackend, PlatformBackend};
use super::channel::{ChannelStats, EventChannel};
use super::event::{HookDecision, KeyEvent, Modifiers, RawKeyInput};
use super::manager::HookManager;
use crate::config::HookConfig;
use crate::error::{HookError, Result};
use once_cell::sync::OnceCell;

/// The process-wide hook context on this platform.
pub type KeyboardHook = HookManager<PlatformBackend>;

/// Lazily initialised holder for a hook context.
pub struct ControlSurface<B: HookBackend> {
    context: OnceCell<HookManager<B>>,
}

impl<B: HookBackend> ControlSurface<B> {
    pub const fn new() -> Self {
        Self {
            context: OnceCell::new(),
        }
    }

    /// Creates the context if it does not exist yet. Later calls return the
    /// existing context and ignore their arguments.
    pub fn init_with(&self, backend: impl FnOnce() -> B, config: &HookConfig) -> &HookManager<B> {
        self.context.get_or_init(|| {
            let manager = HookManager::new(
                backend(),
                EventChannel::new(config.dispatcher_thread_name.clone()),
            );
            manager.set_consume_mode(config.consume_on_install);
            tracing::debug!(?config, "Keyboard hook context created");
            manager
        })
    }

    pub fn context(&self) -> Result<&HookManager<B>> {
        self.context.get().ok_or(HookError::NotReady)
    }

    pub fn install(&self) -> bool {
        report("install keyboard hook", self.context().and_then(|c| c.install()))
    }

    pub fn uninstall(&self) -> bool {
        report(
            "uninstall keyboard hook",
            self.context().and_then(|c| c.uninstall()),
        )
    }

    pub fn set_consume_mode(&self, enabled: bool) -> bool {
        report(
            "set consume mode",
            self.context().map(|c| c.set_consume_mode(enabled)),
        )
    }

    pub fn register_consumer<F>(&self, callback: F) -> bool
    where
        F: FnMut(KeyEvent) + Send + 'static,
    {
        self.register_consumer_opt(Some(callback))
    }

    /// Host-facing registration that rejects a missing callback.
    pub fn register_consumer_opt<F>(&self, callback: Option<F>) -> bool
    where
        F: FnMut(KeyEvent) + Send + 'static,
    {
        let result = self.context().and_then(|c| {
            let callback = callback.ok_or(HookError::InvalidArgument("callback must be provided"))?;
            c.channel().register_consumer(callback)
        });
        report("register key event consumer", result)
    }

    pub fn unregister_consumer(&self) {
        if let Ok(context) = self.context() {
            context.channel().unregister_consumer();
        }
    }

    /// Whether a hook can be installed here at all.
    pub fn is_available(&self) -> bool {
        self.context().is_ok_and(|c| c.backend().is_available())
    }

    pub fn is_installed(&self) -> bool {
        self.context().is_ok_and(|c| c.is_installed())
    }

    pub fn stats(&self) -> Option<ChannelStats> {
        self.context().ok().map(|c| c.channel().stats())
    }

    /// Unregisters the consumer and uninstalls the hook. Call before exit so
    /// no OS-level registration is left behind.
    pub fn teardown(&self) -> bool {
        let Ok(context) = self.context() else {
            return true;
        };
        context.channel().unregister_consumer();
        report("uninstall keyboard hook", context.uninstall())
    }

    /// Dispatch entry for the OS hook procedure. Passes the event through if
    /// the context does not exist.
    pub fn dispatch(
        &self,
        input: RawKeyInput,
        modifiers: impl FnOnce() -> Modifiers,
    ) -> HookDecision {
        match self.context.get() {
            Some(context) => context.dispatch(input, modifiers),
            None => HookDecision::PassThrough,
        }
    }
}

impl<B: HookBackend> Default for ControlSurface<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn report<T>(action: &str, result: Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e @ HookError::Release(_)) => {
            tracing::warn!(error = %e, "Failed to {}", action);
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to {}", action);
            false
        }
    }
}

// ============================================================================
// Process-wide context
// ============================================================================

static CONTEXT: ControlSurface<PlatformBackend> = ControlSurface::new();

/// Creates the process-wide context. Safe to call more than once.
pub fn init(config: &HookConfig) {
    CONTEXT.init_with(PlatformBackend::default, config);
}

/// Installs the global keyboard hook. `true` unless the OS refuses.
pub fn install() -> bool {
    CONTEXT.install()
}

/// Uninstalls the global keyboard hook. `true` unless the OS release fails;
/// local state is reset either way.
pub fn uninstall() -> bool {
    CONTEXT.uninstall()
}

/// Swallow (`true`) or pass through (`false`) every intercepted event.
pub fn set_consume_mode(enabled: bool) -> bool {
    CONTEXT.set_consume_mode(enabled)
}

/// Registers the key event consumer, replacing any previous one.
pub fn register_consumer<F>(callback: F) -> bool
where
    F: FnMut(KeyEvent) + Send + 'static,
{
    CONTEXT.register_consumer(callback)
}

/// Same as [`register_consumer`], but rejects `None`.
pub fn register_consumer_opt<F>(callback: Option<F>) -> bool
where
    F: FnMut(KeyEvent) + Send + 'static,
{
    CONTEXT.register_consumer_opt(callback)
}

pub fn unregister_consumer() {
    CONTEXT.unregister_consumer()
}

pub fn is_available() -> bool {
    CONTEXT.is_available()
}

pub fn is_installed() -> bool {
    CONTEXT.is_installed()
}

pub fn stats() -> Option<ChannelStats> {
    CONTEXT.stats()
}

pub fn teardown() -> bool {
    CONTEXT.teardown()
}

#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn dispatch_os_event(
    input: RawKeyInput,
    modifiers: impl FnOnce() -> Modifiers,
) -> HookDecision {
    CONTEXT.dispatch(input, modifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::backend::mock::MockBackend;
    use crate::keyboard::event::VK_A;
    use serial_test::serial;
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn ready_surface() -> ControlSurface<MockBackend> {
        let surface = ControlSurface::new();
        surface.init_with(MockBackend::default, &HookConfig::default());
        surface
    }

    #[test]
    fn test_calls_before_init_are_rejected() {
        let surface: ControlSurface<MockBackend> = ControlSurface::new();

        assert!(!surface.install());
        assert!(!surface.uninstall());
        assert!(!surface.set_consume_mode(true));
        assert!(!surface.register_consumer(|_| {}));
        assert!(!surface.is_installed());
        assert!(!surface.is_available());
        assert!(surface.stats().is_none());
        assert!(matches!(surface.context(), Err(HookError::NotReady)));
        assert_eq!(
            surface.dispatch(RawKeyInput::key_down(VK_A, 0), || Modifiers::NONE),
            HookDecision::PassThrough
        );
    }

    #[test]
    fn test_missing_callback_rejected_without_state_change() {
        let surface = ready_surface();
        assert!(surface.register_consumer(|_| {}));

        assert!(!surface.register_consumer_opt(None::<fn(KeyEvent)>));
        assert!(surface.context().unwrap().channel().has_consumer());
    }

    #[test]
    fn test_init_applies_config_once() {
        let surface: ControlSurface<MockBackend> = ControlSurface::new();
        let config = HookConfig {
            consume_on_install: true,
            ..HookConfig::default()
        };
        surface.init_with(MockBackend::default, &config);
        surface.init_with(MockBackend::default, &HookConfig::default());

        assert!(surface.context().unwrap().consume_mode());
    }

    #[test]
    fn test_full_scenario_through_surface() {
        let surface = ready_surface();
        let (tx, rx) = mpsc::channel();

        assert!(surface.install());
        assert!(surface.install());
        assert!(surface.is_installed());
        assert!(surface.register_consumer(move |event| tx.send(event).unwrap()));

        let decision = surface.dispatch(RawKeyInput::key_down(VK_A, 0x1E), || Modifiers::NONE);
        assert_eq!(decision, HookDecision::PassThrough);
        assert!(rx.recv_timeout(TIMEOUT).unwrap().is_key_down);

        assert!(surface.set_consume_mode(true));
        let decision = surface.dispatch(RawKeyInput::key_up(VK_A, 0x1E), || Modifiers::NONE);
        assert_eq!(decision, HookDecision::Consume);
        assert!(!rx.recv_timeout(TIMEOUT).unwrap().is_key_down);

        assert!(surface.teardown());
        assert!(!surface.is_installed());
        assert_eq!(surface.context().unwrap().backend().live_hooks(), 0);
    }

    #[test]
    fn test_second_registration_replaces_first() {
        let surface = ready_surface();
        let (first_tx, first_rx) = mpsc::channel();
        let (second_tx, second_rx) = mpsc::channel();
        surface.install();

        assert!(surface.register_consumer(move |e: KeyEvent| first_tx.send(e.key_code).unwrap()));
        assert!(surface.register_consumer(move |e: KeyEvent| second_tx.send(e.key_code).unwrap()));

        surface.dispatch(RawKeyInput::key_down(VK_A, 0), || Modifiers::NONE);
        assert_eq!(second_rx.recv_timeout(TIMEOUT).unwrap(), VK_A);
        assert!(first_rx.try_recv().is_err());
    }

    #[test]
    fn test_release_failure_reported_as_false() {
        let surface = ready_surface();
        surface.install();
        let context = surface.context().unwrap();
        context
            .backend()
            .fail_release
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(!surface.uninstall());
        assert!(!surface.is_installed());
        assert!(surface.uninstall());
    }

    #[cfg(not(windows))]
    #[test]
    #[serial]
    fn test_global_context_unavailable_off_windows() {
        init(&HookConfig::default());

        assert!(!is_available());
        assert!(!install());
        assert!(!is_installed());
        assert!(uninstall());
        assert!(set_consume_mode(false));
        assert!(teardown());
    }

    #[test]
    #[serial]
    fn test_global_consumer_registration() {
        init(&HookConfig::default());

        assert!(register_consumer(|_| {}));
        assert!(!register_consumer_opt(None::<fn(KeyEvent)>));
        unregister_consumer();
        assert!(stats().is_some());
    }
}
