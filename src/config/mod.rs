//! Configuration management for `dotview.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── preview    # [preview]
//! │   ├── render     # [render]
//! │   └── serve      # [serve]
//! ├── types/         # ConfigError, diagnostics, field paths
//! └── mod.rs         # Config (this file)
//! ```
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[preview]` | Debounce window, multiplicity policy, auto-open   |
//! | `[render]`  | Engine command, layout, output format, timeout    |
//! | `[serve]`   | Preview page server (interface, port, watch)      |
//!
//! The config file is optional: without one every section uses its defaults.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{PreviewConfig, RenderConfig, ServeConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::{
    cli::{Cli, Commands, PreviewArgs, RenderArgs},
    log,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing dotview.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path to the config file, empty when none was found
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,

    /// Preview surface behavior
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Render engine settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Preview page server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl Config {
    /// Load configuration from CLI arguments.
    ///
    /// Searches upward from cwd for the config file; falls back to defaults
    /// rooted at cwd when there is none.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
                config.config_path = path;
                config
            }
            None => Self {
                root: cwd,
                ..Self::default()
            },
        };

        crate::logger::set_verbose(cli.verbose);
        config.apply_command_options(cli);
        config.render.normalize(&config.root);
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Preview { args } => self.apply_preview_args(args),
            Commands::Render { args } => self.apply_render_args(args),
        }
    }

    /// Apply preview arguments from CLI.
    fn apply_preview_args(&mut self, args: &PreviewArgs) {
        Self::update_option(&mut self.serve.interface, args.interface.as_ref());
        Self::update_option(&mut self.serve.port, args.port.as_ref());
        Self::update_option(&mut self.serve.watch, args.watch.as_ref());
        Self::update_option(
            &mut self.preview.allow_multiple_panels,
            args.allow_multiple_panels.as_ref(),
        );
        Self::update_option(&mut self.preview.debounce_ms, args.debounce.as_ref());
    }

    /// Apply render arguments from CLI.
    fn apply_render_args(&mut self, args: &RenderArgs) {
        Self::update_option(&mut self.render.format, args.format.as_ref());
        Self::update_option(&mut self.render.layout, args.layout.as_ref());
        Self::update_option(&mut self.render.timeout_ms, args.timeout.as_ref());
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate configuration.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.preview.validate(&mut diag);
        self.render.validate(&mut diag);
        self.serve.validate(&mut diag);

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> Config {
    let (parsed, ignored) = Config::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.preview.debounce_ms, 50);
        assert!(!config.preview.allow_multiple_panels);
        assert_eq!(config.render.command, vec!["dot".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_collected() {
        let (_, ignored) =
            Config::parse_with_ignored("[preview]\ndebounce_ms = 10\nbogus = 1\n").unwrap();
        assert_eq!(ignored, vec!["preview.bogus".to_string()]);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::parse_with_ignored("[preview\n").is_err());
        assert!(Config::from_str("[render]\ntimeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_preview_args_override_config() {
        let cli = Cli::parse_from([
            "dotview", "preview", "--port", "7000", "--watch", "false", "-m", "-d", "120",
        ]);
        let mut config = test_parse_config("[serve]\nport = 6000\n[preview]\ndebounce_ms = 10");
        config.apply_command_options(&cli);

        assert_eq!(config.serve.port, 7000);
        assert!(!config.serve.watch);
        assert!(config.preview.allow_multiple_panels);
        assert_eq!(config.preview.debounce_ms, 120);
    }

    #[test]
    fn test_render_args_override_config() {
        let cli = Cli::parse_from(["dotview", "render", "g.dot", "-K", "circo", "--timeout", "99"]);
        let mut config = test_parse_config("[render]\nlayout = \"neato\"");
        config.apply_command_options(&cli);

        assert_eq!(config.render.layout, "circo");
        assert_eq!(config.render.timeout_ms, 99);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = test_parse_config(
            "[preview]\ndebounce_ms = 999999\n[render]\ncommand = []\ntimeout_ms = 0",
        );
        let err = config.validate().unwrap_err();
        let Some(ConfigError::Diagnostics(diag)) = err.downcast_ref::<ConfigError>() else {
            panic!("expected diagnostics, got {err}");
        };
        assert_eq!(diag.len(), 3);
    }
}
