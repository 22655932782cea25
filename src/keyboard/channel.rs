//! Hand-off from the hook dispatch context to the consumer callback.
//!
//! Each consumer registration owns a capacity-one queue and a dispatcher
//! thread that drains it. The dispatch path only ever calls `try_send`, so it
//! never waits on the consumer: when the dispatcher is busy and the single
//! slot is taken, the newest event is dropped and counted.
//!
//! # Lifecycle
//!
//! Replacing or unregistering a consumer revokes the old registration and
//! waits for any delivery already in progress to finish. Once that returns,
//! the old callback is never invoked again. A callback may replace or
//! unregister itself; in that case the wait is skipped (the current delivery
//! is the in-flight one) and the old dispatcher exits after it returns.

use super::event::KeyEvent;
use crate::error::{HookError, Result};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Events that may wait behind the one being delivered.
pub const CHANNEL_CAPACITY: usize = 1;

/// Consumer entry point. Runs on the registration's dispatcher thread.
pub type KeyEventCallback = Box<dyn FnMut(KeyEvent) + Send + 'static>;

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Events accepted into a consumer queue.
    pub queued: u64,
    /// Events the consumer callback returned from.
    pub delivered: u64,
    /// Events dropped because no consumer was registered.
    pub dropped_no_consumer: u64,
    /// Events dropped because the consumer queue was full.
    pub dropped_saturated: u64,
    /// Deliveries where the consumer callback panicked.
    pub consumer_panics: u64,
}

impl ChannelStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_no_consumer + self.dropped_saturated
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    dropped_no_consumer: AtomicU64,
    dropped_saturated: AtomicU64,
    consumer_panics: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_no_consumer: self.dropped_no_consumer.load(Ordering::Relaxed),
            dropped_saturated: self.dropped_saturated.load(Ordering::Relaxed),
            consumer_panics: self.consumer_panics.load(Ordering::Relaxed),
        }
    }

    fn flush(&self) -> ChannelStats {
        ChannelStats {
            queued: self.queued.swap(0, Ordering::Relaxed),
            delivered: self.delivered.swap(0, Ordering::Relaxed),
            dropped_no_consumer: self.dropped_no_consumer.swap(0, Ordering::Relaxed),
            dropped_saturated: self.dropped_saturated.swap(0, Ordering::Relaxed),
            consumer_panics: self.consumer_panics.swap(0, Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

struct Shared {
    revoked: AtomicBool,
    /// Held for the whole of each delivery; revocation takes it to wait out
    /// an in-flight call.
    callback: Mutex<Option<KeyEventCallback>>,
}

struct Registration {
    id: u64,
    tx: mpsc::Sender<KeyEvent>,
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl Registration {
    fn spawn(
        id: u64,
        callback: KeyEventCallback,
        counters: Arc<Counters>,
        thread_name: &str,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            revoked: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        });

        let thread_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_dispatcher(id, rx, thread_shared, counters))
            .map_err(|e| HookError::Consumer(e.to_string()))?;

        Ok(Self {
            id,
            tx,
            shared,
            dispatcher,
        })
    }

    /// Stops future deliveries and waits for an in-flight one to complete.
    fn revoke(self) {
        let Registration {
            id,
            tx,
            shared,
            dispatcher,
        } = self;

        shared.revoked.store(true, Ordering::Release);
        drop(tx);

        if dispatcher.thread().id() == thread::current().id() {
            // Called from inside the callback; the dispatcher exits once it returns.
            tracing::debug!(registration = id, "Consumer revoked from its own callback");
            return;
        }

        let callback = shared
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(callback);

        if dispatcher.join().is_err() {
            tracing::warn!(registration = id, "Consumer dispatcher thread panicked");
        }
        tracing::debug!(registration = id, "Consumer registration released");
    }
}

fn run_dispatcher(
    id: u64,
    mut rx: mpsc::Receiver<KeyEvent>,
    shared: Arc<Shared>,
    counters: Arc<Counters>,
) {
    tracing::debug!(registration = id, "Consumer dispatcher started");

    while let Some(event) = rx.blocking_recv() {
        let mut guard = shared.callback.lock().unwrap_or_else(|e| e.into_inner());
        if shared.revoked.load(Ordering::Acquire) {
            break;
        }
        let Some(callback) = guard.as_mut() else {
            break;
        };

        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                counters.consumer_panics.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(registration = id, "Consumer callback panicked");
            }
        }
    }

    tracing::debug!(registration = id, "Consumer dispatcher exited");
}

// ============================================================================
// Channel
// ============================================================================

/// Bounded, non-blocking, drop-newest event channel with a single consumer.
pub struct EventChannel {
    registration: RwLock<Option<Registration>>,
    counters: Arc<Counters>,
    next_id: AtomicU64,
    thread_name: String,
}

impl EventChannel {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            registration: RwLock::new(None),
            counters: Arc::new(Counters::default()),
            next_id: AtomicU64::new(1),
            thread_name: thread_name.into(),
        }
    }

    /// Attempts a non-blocking hand-off of `event` to the consumer.
    ///
    /// Returns `true` if the event was queued. Never blocks: if a
    /// registration change holds the lock, the event is dropped as saturated.
    pub fn send(&self, event: KeyEvent) -> bool {
        let guard = match self.registration.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.counters.dropped_saturated.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let Some(registration) = guard.as_ref() else {
            self.counters.dropped_no_consumer.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match registration.tx.try_send(event) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped_saturated.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped_no_consumer.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Registers `callback` as the consumer, replacing any existing one.
    ///
    /// When this returns, the previous callback will not be invoked again.
    pub fn register_consumer<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(KeyEvent) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration::spawn(
            id,
            Box::new(callback),
            Arc::clone(&self.counters),
            &self.thread_name,
        )?;

        let previous = self
            .registration
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(registration);

        if let Some(previous) = previous {
            tracing::info!(
                previous = previous.id,
                registration = id,
                "Replacing key event consumer"
            );
            previous.revoke();
        } else {
            tracing::info!(registration = id, "Key event consumer registered");
        }
        Ok(())
    }

    /// Stops future deliveries. A delivery already in progress completes.
    pub fn unregister_consumer(&self) {
        let previous = self
            .registration
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(previous) = previous {
            tracing::info!(registration = previous.id, "Key event consumer unregistered");
            previous.revoke();
        }
    }

    pub fn has_consumer(&self) -> bool {
        self.registration
            .read()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    /// Reads counters without resetting them.
    pub fn stats(&self) -> ChannelStats {
        self.counters.snapshot()
    }

    /// Atomically reads and resets all counters.
    pub fn flush_stats(&self) -> ChannelStats {
        self.counters.flush()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new("keyhook-dispatch")
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.unregister_consumer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::event::{Modifiers, RawKeyInput, VK_A};
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn key(code: u32) -> KeyEvent {
        KeyEvent::new(RawKeyInput::key_down(code, 0), Modifiers::NONE)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_send_without_consumer_drops_silently() {
        let channel = EventChannel::default();

        for i in 0..100 {
            assert!(!channel.send(key(i)));
        }

        let stats = channel.stats();
        assert_eq!(stats.dropped_no_consumer, 100);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.delivered, 0);
    }

    #[test]
    fn test_delivers_to_consumer() {
        let channel = EventChannel::default();
        let (tx, rx) = std_mpsc::channel();
        channel
            .register_consumer(move |event| tx.send(event).unwrap())
            .unwrap();

        assert!(channel.send(key(VK_A)));

        let received = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(received.key_code, VK_A);
        assert!(wait_for(|| channel.stats().delivered == 1));
    }

    #[test]
    fn test_saturation_drops_newest() {
        let channel = EventChannel::default();
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let (seen_tx, seen_rx) = std_mpsc::channel();

        channel
            .register_consumer(move |event| {
                started_tx.send(()).ok();
                release_rx.recv().ok();
                seen_tx.send(event.key_code).ok();
            })
            .unwrap();

        // First event is picked up by the dispatcher and blocks in the callback
        assert!(channel.send(key(1)));
        started_rx.recv_timeout(TIMEOUT).unwrap();

        // Second fills the single slot, third is dropped
        assert!(channel.send(key(2)));
        assert!(!channel.send(key(3)));
        assert_eq!(channel.stats().dropped_saturated, 1);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), 1);
        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), 2);
        assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_replacement_only_invokes_new_consumer() {
        let channel = EventChannel::default();
        let (first_tx, first_rx) = std_mpsc::channel();
        let (second_tx, second_rx) = std_mpsc::channel();

        channel
            .register_consumer(move |event| first_tx.send(event.key_code).unwrap())
            .unwrap();
        channel
            .register_consumer(move |event| second_tx.send(event.key_code).unwrap())
            .unwrap();

        for code in 0..5 {
            channel.send(key(code));
            assert_eq!(second_rx.recv_timeout(TIMEOUT).unwrap(), code);
        }
        assert!(first_rx.try_recv().is_err());
    }

    #[test]
    fn test_replacement_waits_for_in_flight_delivery() {
        let channel = Arc::new(EventChannel::default());
        let old_calls = Arc::new(AtomicU64::new(0));
        let (started_tx, started_rx) = std_mpsc::channel();

        let calls = Arc::clone(&old_calls);
        channel
            .register_consumer(move |_| {
                started_tx.send(()).ok();
                thread::sleep(Duration::from_millis(100));
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        channel.send(key(1));
        started_rx.recv_timeout(TIMEOUT).unwrap();
        // Queued behind the in-flight delivery
        channel.send(key(2));

        channel.register_consumer(|_| {}).unwrap();

        // In-flight delivery completed, queued one was never delivered to the old consumer
        let after_replace = old_calls.load(Ordering::SeqCst);
        assert_eq!(after_replace, 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(old_calls.load(Ordering::SeqCst), after_replace);
    }

    #[test]
    fn test_unregister_stops_deliveries() {
        let channel = EventChannel::default();
        let (tx, rx) = std_mpsc::channel();
        channel
            .register_consumer(move |event| tx.send(event.key_code).unwrap())
            .unwrap();
        assert!(channel.has_consumer());

        channel.unregister_consumer();
        assert!(!channel.has_consumer());

        assert!(!channel.send(key(VK_A)));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(channel.stats().dropped_no_consumer, 1);
    }

    #[test]
    fn test_consumer_can_unregister_itself() {
        let channel = Arc::new(EventChannel::default());
        let (tx, rx) = std_mpsc::channel();

        let inner = Arc::clone(&channel);
        channel
            .register_consumer(move |event| {
                inner.unregister_consumer();
                tx.send(event.key_code).ok();
            })
            .unwrap();

        channel.send(key(7));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 7);
        assert!(wait_for(|| !channel.has_consumer()));
    }

    #[test]
    fn test_consumer_panic_is_contained() {
        let channel = EventChannel::default();
        let (tx, rx) = std_mpsc::channel();
        channel
            .register_consumer(move |event| {
                if event.key_code == 1 {
                    panic!("consumer bug");
                }
                tx.send(event.key_code).unwrap();
            })
            .unwrap();

        channel.send(key(1));
        assert!(wait_for(|| channel.stats().consumer_panics == 1));

        channel.send(key(2));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 2);
    }

    #[test]
    fn test_flush_stats_resets() {
        let channel = EventChannel::default();
        channel.send(key(1));
        channel.send(key(2));

        let flushed = channel.flush_stats();
        assert_eq!(flushed.dropped(), 2);
        assert_eq!(channel.stats(), ChannelStats::default());
    }
}
