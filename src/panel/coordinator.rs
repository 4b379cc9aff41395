//! Render coordinator: one actor task per surface.
//!
//! ```text
//! SurfaceHandle ──SurfaceCmd──┐
//! Transport ──TransportEvent──┼──▶ SurfaceActor ──render──▶ RenderEngine
//! engine task ──RenderResult──┘         │                        │
//!                                       └──HostMessage──▶ frontend
//! ```
//!
//! Every request is tagged with the next generation. Edits are coalesced
//! with a trailing-edge debounce, at most one render per surface is in
//! flight, and a result is delivered only if its generation is still the
//! newest one issued. Superseded renders are never cancelled, their results
//! are dropped on arrival.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::PanelError;
use super::debounce::Debouncer;
use super::messages::{RenderRequest, RenderResult, SurfaceId, SurfaceMessage, TransportEvent};
use super::surface::{PreviewSurface, ReadyState};
use super::TransportError;
use crate::core::DocumentId;
use crate::render::{RenderEngine, RenderOptions};
use crate::{debug, log};

/// Called once when a surface is disposed, before anything else observes it.
pub(super) type DisposeHook = Arc<dyn Fn(SurfaceId) + Send + Sync>;

// =============================================================================
// Message handling override
// =============================================================================

/// Whether a [`MessageHandler`] consumed a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Skip default handling.
    Handled,
    /// Continue with default handling.
    Default,
}

/// Caller-installed hook that sees every inbound message first.
///
/// The `ready` handshake is always completed regardless of the returned
/// disposition; the surface could not become usable otherwise.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, message: &SurfaceMessage, surface: &SurfaceHandle) -> Disposition;
}

impl<F> MessageHandler for F
where
    F: FnMut(&SurfaceMessage, &SurfaceHandle) -> Disposition + Send + 'static,
{
    fn handle(&mut self, message: &SurfaceMessage, surface: &SurfaceHandle) -> Disposition {
        self(message, surface)
    }
}

// =============================================================================
// Commands
// =============================================================================

enum SurfaceCmd {
    RequestRender(String),
    /// Seed content; rendered without debounce once ready.
    WaitingForRendering(String),
    SetSearch(Option<String>),
    PostCustom(Value),
    SetMessageHandler(Box<dyn MessageHandler>),
    Reveal,
    Dispose,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable handle to a live surface. All operations are non-blocking.
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: SurfaceId,
    title: String,
    document: Option<DocumentId>,
    cmd_tx: mpsc::UnboundedSender<SurfaceCmd>,
    state: Arc<watch::Sender<ReadyState>>,
    on_dispose: DisposeHook,
}

impl SurfaceHandle {
    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn document(&self) -> Option<&DocumentId> {
        self.inner.document.as_ref()
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.inner.state.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        self.ready_state() == ReadyState::Disposed
    }

    /// Schedule a debounced render of `text`.
    pub fn request_render(&self, text: impl Into<String>) -> Result<(), PanelError> {
        self.send(SurfaceCmd::RequestRender(text.into()))
    }

    /// Content to render as soon as the surface is ready, or right away if
    /// it already is.
    pub fn set_waiting_for_rendering(&self, text: impl Into<String>) -> Result<(), PanelError> {
        self.send(SurfaceCmd::WaitingForRendering(text.into()))
    }

    /// Set or clear the highlight term.
    pub fn set_search(&self, term: Option<String>) -> Result<(), PanelError> {
        self.send(SurfaceCmd::SetSearch(term))
    }

    /// Send a caller-defined `custom` message to the frontend.
    pub fn post_message(&self, payload: Value) -> Result<(), PanelError> {
        self.send(SurfaceCmd::PostCustom(payload))
    }

    /// Install a handler that sees inbound messages before default handling.
    pub fn set_message_handler(&self, handler: impl MessageHandler) -> Result<(), PanelError> {
        self.send(SurfaceCmd::SetMessageHandler(Box::new(handler)))
    }

    /// Bring the surface to front and resend its current content.
    pub fn reveal(&self) -> Result<(), PanelError> {
        self.send(SurfaceCmd::Reveal)
    }

    /// Close the surface. The registry forgets it before this returns.
    pub fn dispose(&self) {
        let first = self.inner.state.send_if_modified(|state| {
            if *state == ReadyState::Disposed {
                return false;
            }
            *state = ReadyState::Disposed;
            true
        });
        if first {
            (self.inner.on_dispose)(self.inner.id);
            let _ = self.inner.cmd_tx.send(SurfaceCmd::Dispose);
        }
    }

    /// Resolve once the handshake completed.
    pub async fn wait_ready(&self) -> Result<(), PanelError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ReadyState::Ready | ReadyState::Disposed))
            .await
            .map(|s| *s)
            .unwrap_or(ReadyState::Disposed);
        match state {
            ReadyState::Ready => Ok(()),
            _ => Err(PanelError::Disposed(self.id())),
        }
    }

    /// Resolve once the surface is disposed.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == ReadyState::Disposed).await;
    }

    fn send(&self, cmd: SurfaceCmd) -> Result<(), PanelError> {
        if self.is_disposed() {
            return Err(PanelError::Disposed(self.id()));
        }
        self.inner
            .cmd_tx
            .send(cmd)
            .map_err(|_| PanelError::Disposed(self.id()))
    }
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("id", &self.inner.id)
            .field("title", &self.inner.title)
            .field("state", &self.ready_state())
            .finish()
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Everything needed to start a surface actor.
pub(super) struct SurfaceSpawn {
    pub surface: PreviewSurface,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub engine: Arc<dyn RenderEngine>,
    pub options: RenderOptions,
    pub debounce: Duration,
    pub on_dispose: DisposeHook,
}

/// Start the actor owning `spawn.surface`. Must be called inside a runtime.
pub(super) fn spawn_surface(spawn: SurfaceSpawn) -> (SurfaceHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    let state = Arc::new(watch::Sender::new(spawn.surface.ready_state()));

    let handle = SurfaceHandle {
        inner: Arc::new(HandleInner {
            id: spawn.surface.id(),
            title: spawn.surface.title().to_string(),
            document: spawn.surface.bound_document().cloned(),
            cmd_tx,
            state: Arc::clone(&state),
            on_dispose: Arc::clone(&spawn.on_dispose),
        }),
    };

    let actor = SurfaceActor {
        surface: spawn.surface,
        handle: handle.clone(),
        cmd_rx,
        events: spawn.events,
        result_tx,
        result_rx,
        engine: spawn.engine,
        options: spawn.options,
        debouncer: Debouncer::new(spawn.debounce),
        in_flight: None,
        handler: None,
        state,
        on_dispose: spawn.on_dispose,
    };

    let task = tokio::spawn(actor.run());
    (handle, task)
}

struct SurfaceActor {
    surface: PreviewSurface,
    /// Passed to message handlers.
    handle: SurfaceHandle,
    cmd_rx: mpsc::UnboundedReceiver<SurfaceCmd>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    result_tx: mpsc::UnboundedSender<RenderResult>,
    result_rx: mpsc::UnboundedReceiver<RenderResult>,
    engine: Arc<dyn RenderEngine>,
    options: RenderOptions,
    debouncer: Debouncer,
    /// Generation of the render currently running, if any.
    in_flight: Option<u64>,
    handler: Option<Box<dyn MessageHandler>>,
    state: Arc<watch::Sender<ReadyState>>,
    on_dispose: DisposeHook,
}

impl SurfaceActor {
    async fn run(mut self) {
        let id = self.surface.id();
        debug!("panel"; "surface {} started", id);

        while !self.surface.is_disposed() {
            tokio::select! {
                biased;
                Some(cmd) = self.cmd_rx.recv() => self.on_command(cmd),
                event = self.events.recv() => {
                    let event = event.unwrap_or(TransportEvent::Closed {
                        reason: Some("transport dropped".into()),
                    });
                    self.on_event(event);
                }
                Some(result) = self.result_rx.recv() => self.on_result(result),
                _ = tokio::time::sleep(self.debouncer.sleep_duration()), if self.debouncer.is_pending() => {
                    if self.debouncer.take_if_ready() {
                        self.dispatch();
                    }
                }
            }
            self.publish_state();
        }

        debug!("panel"; "surface {} stopped", id);
    }

    fn on_command(&mut self, cmd: SurfaceCmd) {
        match cmd {
            SurfaceCmd::RequestRender(text) => match self.surface.request_render(text) {
                Some(generation) => {
                    debug!("panel"; "surface {} queued generation {}", self.surface.id(), generation);
                    self.debouncer.touch();
                }
                None => debug!("panel"; "surface {} buffered content until ready", self.surface.id()),
            },
            SurfaceCmd::WaitingForRendering(text) => {
                if self.surface.request_render(text).is_some() {
                    self.debouncer.clear();
                    self.dispatch();
                }
            }
            SurfaceCmd::SetSearch(term) => {
                let result = self.surface.set_search(term);
                self.check(result);
            }
            SurfaceCmd::PostCustom(payload) => {
                let result = self.surface.send_custom(payload);
                self.check(result);
            }
            SurfaceCmd::SetMessageHandler(handler) => self.handler = Some(handler),
            SurfaceCmd::Reveal => {
                let result = self.surface.resync();
                self.check(result);
            }
            SurfaceCmd::Dispose => self.dispose("disposed by host"),
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.surface.on_connected(),
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Closed { reason } => {
                self.dispose(reason.as_deref().unwrap_or("closed by frontend"));
            }
        }
    }

    fn on_message(&mut self, message: SurfaceMessage) {
        if let Some(mut handler) = self.handler.take() {
            let disposition = handler.handle(&message, &self.handle);
            self.handler = Some(handler);
            if disposition == Disposition::Handled && message != SurfaceMessage::Ready {
                return;
            }
        }

        match message {
            SurfaceMessage::Ready => match self.surface.mark_ready() {
                Ok(true) => {
                    debug!("panel"; "surface {} ready", self.surface.id());
                    self.debouncer.clear();
                    self.dispatch();
                }
                Ok(false) => debug!("panel"; "surface {} sent ready twice", self.surface.id()),
                Err(e) => self.transport_failed(&e),
            },
            SurfaceMessage::SearchRequest { term } => self.surface.store_search(term),
            SurfaceMessage::Custom { .. } => {
                debug!("panel"; "surface {} ignored unhandled custom message", self.surface.id());
            }
        }
    }

    fn on_result(&mut self, result: RenderResult) {
        if self.in_flight == Some(result.generation) {
            self.in_flight = None;
        }

        if !self.surface.is_current(result.generation) {
            debug!(
                "panel";
                "surface {} dropped stale generation {} (current {})",
                result.surface_id,
                result.generation,
                self.surface.issued_generation()
            );
        } else {
            report(&self.surface, &result);
            let applied = self.surface.apply_result(result.generation, result.outcome);
            self.check(applied);
        }

        if !self.debouncer.is_pending() {
            self.dispatch();
        }
    }

    /// Start a render of the pending content unless one is already running.
    fn dispatch(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        match self.surface.begin_render() {
            Ok(Some(request)) => self.start_render(request),
            Ok(None) => {}
            Err(e) => self.transport_failed(&e),
        }
    }

    fn start_render(&mut self, request: RenderRequest) {
        let RenderRequest {
            surface_id,
            source_text,
            generation,
        } = request;
        self.in_flight = Some(generation);

        let engine = Arc::clone(&self.engine);
        let options = self.options.clone();
        let result_tx = self.result_tx.clone();
        tokio::spawn(async move {
            let outcome = engine.render(source_text, &options).await;
            // Receiver gone means the surface was disposed meanwhile.
            let _ = result_tx.send(RenderResult {
                surface_id,
                generation,
                outcome,
            });
        });
    }

    fn check<T>(&mut self, result: Result<T, TransportError>) {
        if let Err(e) = result {
            self.transport_failed(&e);
        }
    }

    fn transport_failed(&mut self, error: &TransportError) {
        log!("panel"; "surface {} lost its channel: {}", self.surface.id(), error);
        self.dispose("transport failure");
    }

    fn dispose(&mut self, reason: &str) {
        if !self.surface.dispose() {
            return;
        }
        // Publish Disposed before unregistering (see `PanelRegistry::create`).
        self.state.send_replace(ReadyState::Disposed);
        (self.on_dispose)(self.surface.id());
        self.in_flight = None;
        self.debouncer.clear();
        debug!("panel"; "surface {} disposed: {}", self.surface.id(), reason);
    }

    fn publish_state(&self) {
        let next = self.surface.ready_state();
        self.state.send_if_modified(|state| {
            if *state == ReadyState::Disposed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

/// Terminal status line for a delivered result.
fn report(surface: &PreviewSurface, result: &RenderResult) {
    match &result.outcome {
        Ok(_) => crate::logger::status_success(&format!("rendered {}", surface.title())),
        Err(e) => crate::logger::status_error(&format!("{} failed", surface.title()), &e.to_string()),
    }
}
