//! Process-wide shutdown state.
//!
//! The Ctrl+C handler flips `SHUTDOWN` and notifies the host event loop, which
//! disposes every preview surface before the process exits.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::host::HostEvent;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Host event channel, registered once the host loop is running
static HOST_TX: OnceLock<mpsc::Sender<HostEvent>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before `register_host()`: exits immediately, nothing to dispose
/// - After `register_host()`: graceful shutdown through the host loop
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        match HOST_TX.get() {
            Some(tx) => {
                crate::log!("preview"; "shutting down...");
                // Handler runs on its own thread, outside the runtime.
                if tx.try_send(HostEvent::Shutdown).is_err() {
                    std::process::exit(0);
                }
            }
            None => std::process::exit(0),
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the host event channel for graceful shutdown
pub fn register_host(tx: mpsc::Sender<HostEvent>) {
    let _ = HOST_TX.set(tx);
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
