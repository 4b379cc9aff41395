//! `dotview render`: one-shot render through the configured engine.

use std::io::Write;

use anyhow::{Context, Result, bail};

use crate::cli::RenderArgs;
use crate::config::Config;
use crate::core::Document;
use crate::log;
use crate::render::{DotEngine, RenderEngine};

pub fn run_render(args: &RenderArgs, config: &Config) -> Result<()> {
    let document = Document::read(&args.file)?;
    let engine = DotEngine::from_config(&config.render);
    if !engine.is_available() {
        bail!("`{}` not found on PATH", engine.program());
    }

    let options = config.render.options();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let artifact = runtime
        .block_on(engine.render(document.text, &options))
        .with_context(|| format!("failed to render {}", args.file.display()))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &artifact.body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log!("render"; "wrote {} ({})", path.display(), artifact.format);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(artifact.body.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
