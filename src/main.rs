//! dotview - live Graphviz previews that follow the sources you edit.

mod cli;
mod config;
mod core;
mod embed;
mod host;
mod logger;
mod panel;
mod render;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = Config::load(&cli)?;

    match &cli.command {
        Commands::Preview { args } => cli::preview::run_preview(args, &config),
        Commands::Render { args } => cli::render::run_render(args, &config),
    }
}
