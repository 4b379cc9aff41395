//! Render engine seam.
//!
//! The layout engine is an external collaborator. From the coordinator's
//! point of view it is a pure function `render(source, options)` that
//! returns an artifact or a typed error, and it may be invoked concurrently
//! for different surfaces.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Future returned by [`RenderEngine::render`].
pub type RenderFuture = Pin<Box<dyn Future<Output = Result<Artifact, RenderError>> + Send>>;

/// An external rendering engine.
pub trait RenderEngine: Send + Sync + 'static {
    /// Render `source`. Must never block the caller and must report
    /// malformed input as [`RenderErrorKind::SyntaxError`].
    fn render(&self, source: String, options: &RenderOptions) -> RenderFuture;
}

/// Textual output formats supported by the preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    /// Canonical dot with layout attributes.
    Dot,
    /// Canonical dot without layout.
    Canon,
    Plain,
    Json,
}

impl OutputFormat {
    /// Value passed to the engine's `-T` flag.
    pub const fn as_flag(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Dot => "dot",
            Self::Canon => "canon",
            Self::Plain => "plain",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

/// Options forwarded to every render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Layout engine name (`dot`, `neato`, `fdp`, ...).
    pub layout: String,
    pub format: OutputFormat,
    /// Upper bound for one render; exceeded renders report `Timeout`.
    pub timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            layout: "dot".to_string(),
            format: OutputFormat::Svg,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Rendered output for one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub format: OutputFormat,
    pub body: String,
}

impl Artifact {
    pub fn new(format: OutputFormat, body: impl Into<String>) -> Self {
        Self {
            format,
            body: body.into(),
        }
    }
}

/// Why a render produced no artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderErrorKind {
    /// The engine did not answer within the configured bound.
    Timeout,
    /// The engine rejected the source.
    SyntaxError,
    /// The engine could not be started or failed for another reason.
    Engine,
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::SyntaxError => f.write_str("syntax error"),
            Self::Engine => f.write_str("engine error"),
        }
    }
}

/// Typed render failure, delivered to surfaces as a `renderResult`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {details}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub details: String,
    /// 1-based source line reported by the engine, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
            line: None,
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            RenderErrorKind::Timeout,
            format!("renderer did not respond within {}ms", limit.as_millis()),
        )
    }

    pub fn syntax(details: impl Into<String>) -> Self {
        let details = details.into();
        let line = parse_error_line(&details);
        Self {
            kind: RenderErrorKind::SyntaxError,
            details,
            line,
        }
    }

    pub fn engine(details: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::Engine, details)
    }
}

/// Extract `N` from engine messages like `syntax error in line N near ...`.
fn parse_error_line(details: &str) -> Option<u32> {
    let rest = &details[details.find("line ")? + "line ".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
