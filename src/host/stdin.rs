//! Editor commands as newline-delimited JSON on stdin.
//!
//! ```text
//! {"command":"open","document":{"uri":"file:///a.dot","text":"digraph {}","languageId":"dot"}}
//! {"command":"change","document":{"uri":"file:///a.dot","text":"digraph { a }"}}
//! {"command":"preview","uri":"file:///a.dot","search":"a"}
//! ```

use std::io::{BufRead, ErrorKind};

use serde::Deserialize;
use tokio::sync::mpsc;

use super::{HostEvent, PreviewCommand};
use crate::core::{Document, DocumentId};
use crate::{debug, log};

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Command {
    Open { document: Document },
    Change { document: Document },
    Save { document: Document },
    Close { uri: DocumentId },
    Focus { uri: DocumentId },
    Preview(PreviewCommand),
    Shutdown,
}

impl From<Command> for HostEvent {
    fn from(command: Command) -> Self {
        match command {
            Command::Open { document } => Self::Opened(document),
            Command::Change { document } => Self::Changed(document),
            Command::Save { document } => Self::Saved(document),
            Command::Close { uri } => Self::Closed(uri),
            Command::Focus { uri } => Self::Focused(uri),
            Command::Preview(command) => Self::Preview(command),
            Command::Shutdown => Self::Shutdown,
        }
    }
}

/// Parse one line; blank lines yield `None`.
fn parse_line(line: &str) -> Option<serde_json::Result<HostEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<Command>(line).map(HostEvent::from))
}

/// Read commands on a background thread until EOF or the host goes away.
///
/// EOF is not a shutdown: stdin may simply be unused.
pub fn spawn(host_tx: mpsc::Sender<HostEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        forward(stdin.lock(), &host_tx);
        debug!("stdin"; "closed");
    });
}

/// Forward every parsable line of `reader` to the host.
///
/// Lines that are not UTF-8 or not a command are logged and skipped; only
/// EOF, a read error or a closed host end the stream.
fn forward(mut reader: impl BufRead, host_tx: &mpsc::Sender<HostEvent>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("stdin"; "read failed: {}", e);
                break;
            }
        }
        let Ok(line) = std::str::from_utf8(&buf) else {
            log!("stdin"; "skipped line that is not valid UTF-8");
            continue;
        };
        match parse_line(line) {
            None => {}
            Some(Ok(event)) => {
                if host_tx.blocking_send(event).is_err() {
                    break;
                }
            }
            Some(Err(e)) => log!("stdin"; "invalid command: {}", e),
        }
    }
}
