//! `[render]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [render]
//! command = ["dot"]       # Program and leading args; -K/-T are appended
//! layout = "dot"          # dot, neato, fdp, sfdp, circo, twopi, ...
//! format = "svg"          # svg, dot, canon, plain, json
//! timeout_ms = 10000      # Renders exceeding this report a timeout
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::render::{OutputFormat, RenderOptions};

/// Render engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Engine program followed by fixed leading arguments.
    pub command: Vec<String>,

    pub layout: String,

    pub format: OutputFormat,

    pub timeout_ms: u64,
}

impl RenderConfig {
    pub const COMMAND: FieldPath = FieldPath::new("render.command");
    pub const LAYOUT: FieldPath = FieldPath::new("render.layout");
    pub const TIMEOUT_MS: FieldPath = FieldPath::new("render.timeout_ms");

    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            layout: self.layout.clone(),
            format: self.format,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Expand `~`/env vars in the program and resolve relative program paths
    /// against the config root. Bare names are left for `PATH` lookup.
    pub fn normalize(&mut self, root: &Path) {
        let Some(program) = self.command.first_mut() else {
            return;
        };
        let expanded = shellexpand::full(program.as_str())
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| program.clone());
        let has_dir = expanded.contains(std::path::MAIN_SEPARATOR);
        *program = if has_dir && Path::new(&expanded).is_relative() {
            root.join(&expanded).to_string_lossy().into_owned()
        } else {
            expanded
        };
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        match self.command.first() {
            None => diag.error_with_hint(
                Self::COMMAND,
                "must name the render program",
                "command = [\"dot\"]",
            ),
            Some(program) if program.trim().is_empty() => {
                diag.error(Self::COMMAND, "program name is empty")
            }
            Some(_) => {}
        }
        if self.layout.trim().is_empty() {
            diag.error(Self::LAYOUT, "layout engine name is empty");
        }
        if self.timeout_ms == 0 {
            diag.error(Self::TIMEOUT_MS, "must be greater than zero");
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        let options = RenderOptions::default();
        Self {
            command: vec!["dot".to_string()],
            layout: options.layout,
            format: options.format,
            timeout_ms: options.timeout.as_millis() as u64,
        }
    }
}
