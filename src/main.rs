//! keyhook - global keyboard interception demo.
//!
//! Installs the low-level keyboard hook, logs every intercepted key and
//! periodically reports channel statistics. Press Ctrl+C to quit; the hook
//! is always uninstalled before the process exits.

use keyhook::keyboard;
use keyhook::logging::init_logging;
use keyhook::{HookConfig, KeyEvent};
use std::sync::mpsc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HookConfig::load()?;
    init_logging(&config.log_filter);

    keyboard::init(&config);

    if !keyboard::is_available() {
        tracing::warn!("Keyboard hook only works on Windows");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    })?;

    if !keyboard::register_consumer(log_key_event) {
        return Err("failed to register key event consumer".into());
    }

    if !keyboard::install() {
        keyboard::teardown();
        return Err("failed to install keyboard hook".into());
    }

    tracing::info!(
        consume = config.consume_on_install,
        config_path = ?HookConfig::config_path(),
        "Keyboard hook running; press Ctrl+C to exit"
    );

    let interval = Duration::from_secs(config.stats_interval_secs.max(1));
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(stats) = keyboard::stats() {
                    tracing::info!(
                        queued = stats.queued,
                        delivered = stats.delivered,
                        dropped = stats.dropped(),
                        "Channel stats"
                    );
                }
            }
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if !keyboard::teardown() {
        tracing::warn!("Keyboard hook release reported an error");
    }
    tracing::info!("keyhook exited");
    Ok(())
}

fn log_key_event(event: KeyEvent) {
    match serde_json::to_string(&event) {
        Ok(json) => tracing::info!(event = %json, "Key event"),
        Err(e) => tracing::warn!(?e, "Failed to serialize key event"),
    }
}
