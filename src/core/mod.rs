//! Core types shared across the codebase.

mod document;
mod state;

pub use document::{Document, DocumentId, is_dot_source};
pub use state::{is_shutdown, register_host, setup_shutdown_handler};
