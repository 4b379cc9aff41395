use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge debouncer: only handles timing.
///
/// Every [`touch`](Self::touch) restarts the quiet window; the burst is
/// released once the window elapses with no further touches.
#[derive(Debug)]
pub(super) struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) const fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    pub(super) fn touch(&mut self) {
        self.last_event = Some(Instant::now());
    }

    pub(super) fn clear(&mut self) {
        self.last_event = None;
    }

    /// A burst is waiting for its quiet window.
    pub(super) const fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    pub(super) fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|last| last.elapsed() >= self.window)
    }

    /// Release the burst if its window has elapsed.
    pub(super) fn take_if_ready(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.last_event = None;
        true
    }

    /// Precise sleep duration until the burst can be released.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.window.saturating_sub(last_event.elapsed())
    }
}
