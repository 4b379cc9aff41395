//! Editor host: turns document lifecycle events into surface operations.
//!
//! ```text
//! stdin / watcher / Ctrl+C ──HostEvent──► Host ──► PanelRegistry ──► surfaces
//!                                                        ▲
//!                       browser ◄──ws── WsSurfaceFactory ┘
//! ```
//!
//! The host loop never waits on a surface: previews are revealed on their
//! own tasks so a slow handshake cannot hold back edits to other documents.

pub mod fs;
pub mod http;
pub mod stdin;
mod workspace;
pub mod ws;

use std::collections::VecDeque;
use std::ops::ControlFlow;

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::core::{Document, DocumentId};
use crate::panel::{PanelRegistry, RevealCallback};
use crate::{debug, log};

pub use workspace::Workspace;

/// Capacity of the host event queue.
const EVENT_QUEUE: usize = 256;

/// Something that happened in the editor (or the process).
#[derive(Debug)]
pub enum HostEvent {
    Opened(Document),
    Changed(Document),
    Saved(Document),
    Closed(DocumentId),
    Focused(DocumentId),
    Preview(PreviewCommand),
    Shutdown,
}

/// Arguments of the "open preview" command.
///
/// Every field is optional: an empty command previews the active document.
#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewCommand {
    pub document: Option<Document>,
    /// Identity to bind, overriding the document's own.
    pub uri: Option<DocumentId>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub search: Option<String>,
    pub allow_multiple_panels: Option<bool>,
    #[serde(skip)]
    pub callback: Option<RevealCallback>,
}

impl std::fmt::Debug for PreviewCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewCommand")
            .field("document", &self.document.as_ref().map(|doc| &doc.id))
            .field("uri", &self.uri)
            .field("content", &self.content.as_ref().map(String::len))
            .field("title", &self.title)
            .field("search", &self.search)
            .field("allow_multiple_panels", &self.allow_multiple_panels)
            .finish_non_exhaustive()
    }
}

pub fn channel() -> (mpsc::Sender<HostEvent>, mpsc::Receiver<HostEvent>) {
    mpsc::channel(EVENT_QUEUE)
}

pub struct Host {
    registry: PanelRegistry,
    workspace: Workspace,
    /// Open a preview whenever a Graphviz document is opened.
    open_automatically: bool,
    /// Handled before anything on `events`.
    queued: VecDeque<HostEvent>,
    events: mpsc::Receiver<HostEvent>,
}

impl Host {
    pub fn new(
        registry: PanelRegistry,
        open_automatically: bool,
        events: mpsc::Receiver<HostEvent>,
    ) -> Self {
        Self {
            registry,
            workspace: Workspace::default(),
            open_automatically,
            queued: VecDeque::new(),
            events,
        }
    }

    /// Queue an event to handle once [`run`](Self::run) starts.
    ///
    /// Unbounded, so startup can hand over any number of documents before
    /// the loop drains the event channel.
    pub fn queue(&mut self, event: HostEvent) {
        self.queued.push_back(event);
    }

    /// Run until `Shutdown` or every sender is gone, then dispose all surfaces.
    pub async fn run(mut self) {
        let mut stopped = false;
        while let Some(event) = self.queued.pop_front() {
            if self.handle(event).is_break() {
                stopped = true;
                break;
            }
        }
        while !stopped && let Some(event) = self.events.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
        self.registry.shutdown().await;
        debug!("host"; "stopped");
    }

    fn handle(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::Opened(document) => self.on_opened(document),
            HostEvent::Changed(document) | HostEvent::Saved(document) => {
                self.render_bound(&document);
                self.workspace.update(document);
            }
            HostEvent::Closed(id) => {
                // Surfaces outlive their document; the user closes them.
                self.workspace.close(&id);
            }
            HostEvent::Focused(id) => self.workspace.focus(&id),
            HostEvent::Preview(command) => self.preview(command),
            HostEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn on_opened(&mut self, document: Document) {
        // Watchers report atomic saves as creations.
        if self.workspace.contains(&document.id) {
            self.render_bound(&document);
            self.workspace.update(document);
            return;
        }

        let auto = self.open_automatically && document.is_previewable();
        self.workspace.open(document.clone());
        if auto {
            self.preview(PreviewCommand {
                document: Some(document),
                ..PreviewCommand::default()
            });
        }
    }

    /// Re-render the newest surface bound to `document`, if any.
    fn render_bound(&self, document: &Document) {
        if !document.is_previewable() {
            return;
        }
        let Some(panel) = self.registry.get_panel(&document.id) else {
            return;
        };
        if let Err(e) = panel.request_render(document.text.clone()) {
            debug!("host"; "skipped render for {}: {}", document.id, e);
        }
    }

    fn preview(&self, command: PreviewCommand) {
        let (identity, options) = self.workspace.resolve_preview(command);
        let registry = self.registry.clone();
        tokio::spawn(async move {
            match registry.reveal_or_create(identity, options).await {
                Ok(handle) => debug!("host"; "surface {} is ready", handle.id()),
                Err(e) => log!("preview"; "{}", e),
            }
        });
    }
}
