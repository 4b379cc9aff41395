//! Structural failures of the panel layer.
//!
//! Render failures are not here: they travel to the surface as
//! `renderResult` messages and never fail an operation.

use thiserror::Error;

use super::SurfaceId;

/// Channel to a surface is broken.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("surface channel closed")]
    Closed,

    #[error("failed to encode message")]
    Encode(#[from] serde_json::Error),

    #[error("surface channel I/O error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanelError {
    /// The surface could not be instantiated or never became ready.
    #[error("failed to create preview surface: {0}")]
    CreationFailed(String),

    /// The surface was closed; it accepts no further requests.
    #[error("preview surface {0} is disposed")]
    Disposed(SurfaceId),
}

impl PanelError {
    pub fn creation(reason: impl Into<String>) -> Self {
        Self::CreationFailed(reason.into())
    }
}
