//! Command-line interface module.

mod args;
pub mod preview;
pub mod render;

pub use args::{Cli, Commands, PreviewArgs, RenderArgs};
