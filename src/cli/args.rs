//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::render::OutputFormat;

/// dotview live graphviz preview CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Config file path (default: dotview.toml, searched upward)
    #[arg(short = 'C', long, default_value = "dotview.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open live previews for dot files and keep them in sync
    #[command(visible_alias = "p")]
    Preview {
        #[command(flatten)]
        args: PreviewArgs,
    },

    /// Render a dot file once and write the artifact
    #[command(visible_alias = "r")]
    Render {
        #[command(flatten)]
        args: RenderArgs,
    },
}

/// Preview command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Dot files to preview. Editors can also drive previews over stdin.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub files: Vec<PathBuf>,

    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long)]
    pub interface: Option<std::net::IpAddr>,

    /// Port number for the preview pages
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Watch files on disk and re-render on save
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub watch: Option<bool>,

    /// Open a new surface even if the document already has one
    #[arg(short = 'm', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub allow_multiple_panels: Option<bool>,

    /// Coalescing window for rapid edits, in milliseconds
    #[arg(short, long)]
    pub debounce: Option<u64>,

    /// Title of the preview surfaces
    #[arg(short, long)]
    pub title: Option<String>,

    /// Initial search/highlight term
    #[arg(short, long)]
    pub search: Option<String>,
}

/// Render command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// Dot file to render
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Write the artifact to a file instead of stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'T', long)]
    pub format: Option<OutputFormat>,

    /// Layout engine (dot, neato, fdp, ...)
    #[arg(short = 'K', long)]
    pub layout: Option<String>,

    /// Render timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
