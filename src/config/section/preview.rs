//! `[preview]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [preview]
//! debounce_ms = 50                # Coalescing window for rapid edits
//! allow_multiple_panels = false   # Always open a new surface per document
//! open_automatically = false      # Preview dot files as soon as they open
//! ready_timeout_ms = 0            # 0 = wait for the ready handshake forever
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Longest accepted debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Preview surface behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Trailing-edge coalescing window in milliseconds. `0` renders every edit.
    pub debounce_ms: u64,

    /// When false, revealing a document re-focuses its existing surface.
    pub allow_multiple_panels: bool,

    /// Open a preview when a dot document is opened.
    pub open_automatically: bool,

    /// Bound on the ready handshake after creation. `0` waits forever.
    pub ready_timeout_ms: u64,
}

impl PreviewConfig {
    pub const DEBOUNCE_MS: FieldPath = FieldPath::new("preview.debounce_ms");
    pub const READY_TIMEOUT_MS: FieldPath = FieldPath::new("preview.ready_timeout_ms");

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        (self.ready_timeout_ms > 0).then(|| Duration::from_millis(self.ready_timeout_ms))
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            diag.error_with_hint(
                Self::DEBOUNCE_MS,
                format!("{}ms exceeds the {MAX_DEBOUNCE_MS}ms maximum", self.debounce_ms),
                "edits are coalesced; values around 50-300 feel live",
            );
        }
        if self.ready_timeout_ms > 0 && self.ready_timeout_ms < 100 {
            diag.warn(
                Self::READY_TIMEOUT_MS,
                "below 100ms; slow browsers may fail the ready handshake",
            );
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            allow_multiple_panels: false,
            open_automatically: false,
            ready_timeout_ms: 0,
        }
    }
}
