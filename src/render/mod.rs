//! Render engine adapter.
//!
//! - `engine` - the `RenderEngine` seam, artifacts and typed errors
//! - `dot` - Graphviz process implementation with timeout enforcement

mod dot;
mod engine;

pub use dot::DotEngine;
pub use engine::{
    Artifact, OutputFormat, RenderEngine, RenderError, RenderErrorKind, RenderFuture,
    RenderOptions,
};
