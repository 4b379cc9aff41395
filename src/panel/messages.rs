//! Host ↔ surface message vocabulary.
//!
//! ```text
//! surface ──ready──────────▶ host
//! surface ──searchRequest──▶ host
//! host ────renderRequest───▶ surface
//! host ────renderResult────▶ surface
//! host ────searchApply─────▶ surface
//! both ────custom──────────▶ both
//! ```
//!
//! Messages travel as JSON objects tagged by `type`. The surface id is never
//! part of the payload: each surface has its own channel, and delivery on one
//! channel is FIFO.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::{Artifact, RenderError};

/// Opaque surface identity, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Host → Surface
// =============================================================================

/// Messages sent to a surface's frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// A render for `generation` has started.
    #[serde(rename_all = "camelCase")]
    RenderRequest { generation: u64, source_text: String },

    /// Outcome of the render tagged `generation`. Exactly one of `artifact`
    /// or `error` is set, except on resync where a retained artifact travels
    /// alongside the error it is shown under.
    RenderResult {
        generation: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<Artifact>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RenderError>,
    },

    /// Highlight `term` in the rendered artifact.
    SearchApply { term: String },

    Custom { payload: Value },
}

impl HostMessage {
    pub fn render_result(generation: u64, outcome: Result<Artifact, RenderError>) -> Self {
        match outcome {
            Ok(artifact) => Self::RenderResult {
                generation,
                artifact: Some(artifact),
                error: None,
            },
            Err(error) => Self::RenderResult {
                generation,
                artifact: None,
                error: Some(error),
            },
        }
    }

    /// Short name for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RenderRequest { .. } => "renderRequest",
            Self::RenderResult { .. } => "renderResult",
            Self::SearchApply { .. } => "searchApply",
            Self::Custom { .. } => "custom",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Surface → Host
// =============================================================================

/// Messages received from a surface's frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceMessage {
    /// Frontend finished initializing. Sent once.
    Ready,

    /// User searched for `term` inside the surface.
    SearchRequest { term: String },

    Custom { payload: Value },
}

impl SurfaceMessage {
    /// Decode a frame from the frontend.
    ///
    /// Well-formed JSON that is not one of the known kinds is kept whole as
    /// [`SurfaceMessage::Custom`] so message handlers can still see it.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(serde_json::from_value(value.clone()).unwrap_or(Self::Custom { payload: value }))
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::SearchRequest { .. } => "searchRequest",
            Self::Custom { .. } => "custom",
        }
    }
}

/// What a transport reports about its surface.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Frontend attached; the surface now waits for `ready`.
    Connected,
    Message(SurfaceMessage),
    /// Frontend went away. Terminal.
    Closed { reason: Option<String> },
}

// =============================================================================
// Render bookkeeping
// =============================================================================

/// One render attempt. Lives only while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub surface_id: SurfaceId,
    pub source_text: String,
    pub generation: u64,
}

/// Engine outcome for a [`RenderRequest`], routed back to its surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub surface_id: SurfaceId,
    pub generation: u64,
    pub outcome: Result<Artifact, RenderError>,
}
