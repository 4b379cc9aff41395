//! Graphviz process adapter.
//!
//! Pipes the source into the configured command (default `dot`) with
//! `-K<layout> -T<format>` appended, and maps the process outcome to an
//! [`Artifact`] or a typed [`RenderError`].

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::engine::{Artifact, RenderEngine, RenderError, RenderFuture, RenderOptions};
use crate::config::RenderConfig;

/// Renders through an external Graphviz executable.
#[derive(Debug, Clone)]
pub struct DotEngine {
    /// Program followed by fixed leading arguments.
    command: Arc<[String]>,
}

impl DotEngine {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.command.clone())
    }

    /// Whether the program can be found on `PATH`.
    pub fn is_available(&self) -> bool {
        self.command
            .first()
            .is_some_and(|program| which::which(program).is_ok())
    }

    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }
}

impl RenderEngine for DotEngine {
    fn render(&self, source: String, options: &RenderOptions) -> RenderFuture {
        let command = Arc::clone(&self.command);
        let options = options.clone();
        Box::pin(async move {
            match tokio::time::timeout(options.timeout, run(&command, &source, &options)).await {
                Ok(outcome) => outcome,
                // kill_on_drop reaps the abandoned process
                Err(_) => Err(RenderError::timeout(options.timeout)),
            }
        })
    }
}

async fn run(
    command: &[String],
    source: &str,
    options: &RenderOptions,
) -> Result<Artifact, RenderError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| RenderError::engine("render command is empty"))?;

    let mut child = Command::new(program)
        .args(args)
        .arg(format!("-K{}", options.layout))
        .arg(format!("-T{}", options.format.as_flag()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RenderError::engine(format!("failed to start `{program}`: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RenderError::engine("renderer stdin unavailable"))?;

    // Feed stdin while draining stdout so large graphs cannot fill both pipes.
    let source = source.to_owned();
    let feed = async move {
        let result = stdin.write_all(source.as_bytes()).await;
        drop(stdin);
        result
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());

    let output =
        output.map_err(|e| RenderError::engine(format!("failed to wait for `{program}`: {e}")))?;
    let stderr = String::from_utf8_lossy(&output.stderr);

    if let Err(e) = fed {
        crate::debug!("render"; "renderer closed stdin early: {}", e);
    }

    if output.status.success() {
        return Ok(Artifact::new(
            options.format,
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ));
    }

    Err(classify_failure(&stderr, output.status))
}

/// Map a failed run to a typed error.
///
/// Graphviz reports parse failures as `Error: <stdin>: syntax error in line N ...`.
fn classify_failure(stderr: &str, status: ExitStatus) -> RenderError {
    let message = stderr.trim();
    if message.is_empty() {
        return RenderError::engine(format!("renderer exited with {status}"));
    }
    if message.to_ascii_lowercase().contains("syntax error") {
        RenderError::syntax(message)
    } else {
        RenderError::engine(message)
    }
}
