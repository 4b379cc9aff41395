//! `dotview preview`: keep browser previews in sync until Ctrl+C.
//!
//! Wiring:
//!
//! ```text
//! PageServer (http)   WsSurfaceFactory (ws)
//!        └──── PanelRegistry ────┘
//!                   ▲
//!     stdin ─┐      │
//!   watcher ─┼──► Host
//!    Ctrl+C ─┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::PreviewArgs;
use crate::config::Config;
use crate::core::{Document, register_host};
use crate::host::fs::{FileWatcher, watch_dirs};
use crate::host::http::PageServer;
use crate::host::ws::WsSurfaceFactory;
use crate::host::{self, Host, HostEvent, PreviewCommand, stdin};
use crate::log;
use crate::panel::{PanelRegistry, RegistrySettings};
use crate::render::DotEngine;

pub fn run_preview(args: &PreviewArgs, config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(serve(args, config))
}

fn registry_settings(config: &Config) -> RegistrySettings {
    RegistrySettings {
        debounce: config.preview.debounce(),
        allow_multiple_panels: config.preview.allow_multiple_panels,
        ready_timeout: config.preview.ready_timeout(),
        render: config.render.options(),
    }
}

/// Absolute paths for the files given on the command line.
fn resolve_files(files: &[PathBuf], root: &Path) -> Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|file| {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                root.join(file)
            };
            path.canonicalize()
                .with_context(|| format!("cannot open {}", file.display()))
        })
        .collect()
}

async fn serve(args: &PreviewArgs, config: &Config) -> Result<()> {
    let engine = DotEngine::from_config(&config.render);
    if !engine.is_available() {
        log!("warning"; "`{}` not found on PATH, renders will fail", engine.program());
    }

    let cwd = std::env::current_dir().context("failed to get current working directory")?;
    let files = resolve_files(&args.files, &cwd)?;

    let pages = PageServer::bind(config.serve.interface, config.serve.port)?;
    let factory = WsSurfaceFactory::bind(
        config.serve.interface,
        pages.addr().port().saturating_add(1),
        pages.origin(),
    )?;
    let ws_port = factory.port();
    let registry = PanelRegistry::new(
        Arc::new(factory),
        Arc::new(engine),
        registry_settings(config),
    );
    let _page_thread = pages.spawn(registry.clone(), ws_port);
    log!("serve"; "previews at {}", pages.origin());

    let (host_tx, host_rx) = host::channel();
    register_host(host_tx.clone());

    if config.serve.watch {
        let dirs = watch_dirs(&files, &config.root);
        let watcher =
            FileWatcher::new(&dirs, host_tx.clone()).context("failed to start file watcher")?;
        tokio::spawn(watcher.run());
    }
    stdin::spawn(host_tx.clone());

    let mut host = Host::new(registry, config.preview.open_automatically, host_rx);
    for file in &files {
        let document = Document::read(file)?;
        let command = PreviewCommand {
            document: Some(document.clone()),
            title: args.title.clone(),
            search: args.search.clone(),
            ..PreviewCommand::default()
        };
        host.queue(HostEvent::Opened(document));
        // Auto-open already covers documents given up front.
        if !config.preview.open_automatically {
            host.queue(HostEvent::Preview(command));
        }
    }
    if files.is_empty() {
        log!("preview"; "waiting for editor commands on stdin");
    }
    drop(host_tx);

    host.run().await;
    pages.stop();
    Ok(())
}
