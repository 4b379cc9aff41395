//! Per-surface state machine.
//!
//! ```text
//! Created ──connected──▶ AwaitingReady ──ready──▶ Ready ⟲
//!    │                        │                     │
//!    └────────────────────────┴─────────────────────┴──▶ Disposed
//! ```
//!
//! Before `Ready` nothing is pushed to the frontend: render requests only
//! replace `pending_content`, and the search term waits. The `ready`
//! handshake flushes both.
//!
//! A `PreviewSurface` is owned by exactly one coordinator task and is never
//! shared.

use serde::Serialize;

use super::TransportError;
use super::messages::{HostMessage, RenderRequest, SurfaceId};
use super::transport::Transport;
use crate::core::DocumentId;
use crate::render::{Artifact, RenderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadyState {
    Created,
    AwaitingReady,
    Ready,
    Disposed,
}

impl ReadyState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingReady => "awaiting ready",
            Self::Ready => "ready",
            Self::Disposed => "disposed",
        }
    }
}

pub struct PreviewSurface {
    id: SurfaceId,
    bound_document: Option<DocumentId>,
    title: String,
    /// Most recently requested text not yet handed to the engine.
    pending_content: Option<String>,
    /// Highest generation assigned so far.
    issued_generation: u64,
    last_applied_generation: u64,
    search_term: Option<String>,
    /// Retained across error results so the frontend can be resynced.
    last_artifact: Option<Artifact>,
    last_error: Option<RenderError>,
    ready_state: ReadyState,
    transport: Box<dyn Transport>,
}

impl PreviewSurface {
    pub fn new(
        id: SurfaceId,
        bound_document: Option<DocumentId>,
        title: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            bound_document,
            title: title.into(),
            pending_content: None,
            issued_generation: 0,
            last_applied_generation: 0,
            search_term: None,
            last_artifact: None,
            last_error: None,
            ready_state: ReadyState::Created,
            transport,
        }
    }

    pub const fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn bound_document(&self) -> Option<&DocumentId> {
        self.bound_document.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn pending_content(&self) -> Option<&str> {
        self.pending_content.as_deref()
    }

    pub const fn issued_generation(&self) -> u64 {
        self.issued_generation
    }

    pub const fn last_applied_generation(&self) -> u64 {
        self.last_applied_generation
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    pub fn last_artifact(&self) -> Option<&Artifact> {
        self.last_artifact.as_ref()
    }

    pub fn last_error(&self) -> Option<&RenderError> {
        self.last_error.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_state == ReadyState::Ready
    }

    pub fn is_disposed(&self) -> bool {
        self.ready_state == ReadyState::Disposed
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Transport reports the frontend attached.
    pub fn on_connected(&mut self) {
        if self.ready_state == ReadyState::Created {
            self.ready_state = ReadyState::AwaitingReady;
        }
    }

    /// Complete the handshake.
    ///
    /// Pushes the buffered search term and, when content is buffered, assigns
    /// it a generation so the caller can dispatch it right away. Returns
    /// `false` if the surface was not waiting for the handshake.
    pub fn mark_ready(&mut self) -> Result<bool, TransportError> {
        if !matches!(
            self.ready_state,
            ReadyState::Created | ReadyState::AwaitingReady
        ) {
            return Ok(false);
        }
        self.ready_state = ReadyState::Ready;

        if let Some(term) = self.search_term.clone() {
            self.transport.send(&HostMessage::SearchApply { term })?;
        }
        if self.pending_content.is_some() {
            self.issued_generation += 1;
        }
        Ok(true)
    }

    /// Terminal. Drops buffered work and closes the transport.
    ///
    /// Returns `false` if the surface was already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.ready_state = ReadyState::Disposed;
        self.pending_content = None;
        self.last_artifact = None;
        self.last_error = None;
        self.transport.dispose();
        true
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Record `text` as the content to render next (last write wins).
    ///
    /// Returns the generation assigned to it, or `None` if the surface is not
    /// ready yet and the text was only buffered.
    pub fn request_render(&mut self, text: String) -> Option<u64> {
        if self.is_disposed() {
            return None;
        }
        self.pending_content = Some(text);
        if !self.is_ready() {
            return None;
        }
        self.issued_generation += 1;
        Some(self.issued_generation)
    }

    /// Take the pending content as a render attempt tagged with the current
    /// generation, and announce it to the frontend.
    pub fn begin_render(&mut self) -> Result<Option<RenderRequest>, TransportError> {
        if !self.is_ready() {
            return Ok(None);
        }
        let Some(source_text) = self.pending_content.take() else {
            return Ok(None);
        };

        let request = RenderRequest {
            surface_id: self.id,
            source_text,
            generation: self.issued_generation,
        };
        self.transport.send(&HostMessage::RenderRequest {
            generation: request.generation,
            source_text: request.source_text.clone(),
        })?;
        Ok(Some(request))
    }

    /// Whether `generation` is the newest one issued.
    pub const fn is_current(&self, generation: u64) -> bool {
        generation == self.issued_generation
    }

    /// Deliver an engine outcome. Results older than the last applied one are
    /// ignored; errors keep the last good artifact.
    ///
    /// Returns whether the result was applied.
    pub fn apply_result(
        &mut self,
        generation: u64,
        outcome: Result<Artifact, RenderError>,
    ) -> Result<bool, TransportError> {
        if self.is_disposed() || generation < self.last_applied_generation {
            return Ok(false);
        }

        self.transport
            .send(&HostMessage::render_result(generation, outcome.clone()))?;

        self.last_applied_generation = generation;
        match outcome {
            Ok(artifact) => {
                self.last_artifact = Some(artifact);
                self.last_error = None;
            }
            Err(error) => self.last_error = Some(error),
        }
        Ok(true)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Set the highlight term from the host side. Sent immediately when
    /// ready, otherwise held until the handshake. `None` clears it.
    pub fn set_search(&mut self, term: Option<String>) -> Result<(), TransportError> {
        self.search_term = term.filter(|t| !t.is_empty());
        if self.is_ready() {
            let term = self.search_term.clone().unwrap_or_default();
            self.transport.send(&HostMessage::SearchApply { term })?;
        }
        Ok(())
    }

    /// Remember a term the user searched for inside the surface.
    pub fn store_search(&mut self, term: String) {
        self.search_term = Some(term).filter(|t| !t.is_empty());
    }

    // =========================================================================
    // Misc
    // =========================================================================

    /// Bring the surface to front and re-send what it should be showing.
    pub fn resync(&mut self) -> Result<(), TransportError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.transport.reveal();
        if !self.is_ready() {
            return Ok(());
        }

        if self.last_applied_generation > 0 {
            self.transport.send(&HostMessage::RenderResult {
                generation: self.last_applied_generation,
                artifact: self.last_artifact.clone(),
                error: self.last_error.clone(),
            })?;
        }
        if let Some(term) = self.search_term.clone() {
            self.transport.send(&HostMessage::SearchApply { term })?;
        }
        Ok(())
    }

    pub fn send_custom(&mut self, payload: serde_json::Value) -> Result<(), TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Closed);
        }
        self.transport.send(&HostMessage::Custom { payload })
    }
}

impl std::fmt::Debug for PreviewSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSurface")
            .field("id", &self.id)
            .field("bound_document", &self.bound_document)
            .field("ready_state", &self.ready_state)
            .field("issued_generation", &self.issued_generation)
            .field("last_applied_generation", &self.last_applied_generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::testing::{Outbox, RecordingTransport};
    use crate::render::OutputFormat;

    fn surface() -> (PreviewSurface, Outbox) {
        let outbox = Outbox::default();
        let transport = RecordingTransport::new(outbox.clone());
        let surface = PreviewSurface::new(
            SurfaceId(1),
            Some(DocumentId::new("file:///a.dot")),
            "a.dot",
            Box::new(transport),
        );
        (surface, outbox)
    }

    fn svg(body: &str) -> Result<Artifact, RenderError> {
        Ok(Artifact::new(OutputFormat::Svg, body))
    }

    #[test]
    fn test_requests_before_ready_are_buffered() {
        let (mut s, outbox) = surface();
        s.on_connected();
        assert_eq!(s.ready_state(), ReadyState::AwaitingReady);

        assert_eq!(s.request_render("one".into()), None);
        assert_eq!(s.request_render("two".into()), None);
        assert_eq!(s.issued_generation(), 0);
        assert_eq!(s.begin_render().unwrap(), None);
        assert!(outbox.messages().is_empty());

        assert!(s.mark_ready().unwrap());
        assert_eq!(s.issued_generation(), 1);
        let request = s.begin_render().unwrap().unwrap();
        assert_eq!(request.source_text, "two");
        assert_eq!(request.generation, 1);
        assert_eq!(outbox.kinds(), vec!["renderRequest"]);
    }

    #[test]
    fn test_ready_flushes_search_first() {
        let (mut s, outbox) = surface();
        s.set_search(Some("node".into())).unwrap();
        assert!(outbox.messages().is_empty());

        s.mark_ready().unwrap();
        assert_eq!(
            outbox.messages(),
            vec![HostMessage::SearchApply {
                term: "node".into()
            }]
        );
        assert!(!s.mark_ready().unwrap());
    }

    #[test]
    fn test_generations_strictly_increase() {
        let (mut s, _) = surface();
        s.mark_ready().unwrap();
        let a = s.request_render("a".into()).unwrap();
        let b = s.request_render("b".into()).unwrap();
        assert!(b > a);
        assert!(s.is_current(b));
        assert!(!s.is_current(a));
    }

    #[test]
    fn test_older_result_never_applied() {
        let (mut s, outbox) = surface();
        s.mark_ready().unwrap();
        s.request_render("a".into());
        s.request_render("b".into());

        assert!(s.apply_result(2, svg("b")).unwrap());
        assert!(!s.apply_result(1, svg("a")).unwrap());
        assert_eq!(s.last_applied_generation(), 2);
        assert_eq!(s.last_artifact().unwrap().body, "b");
        assert_eq!(outbox.render_results().len(), 1);
    }

    #[test]
    fn test_error_keeps_last_artifact() {
        let (mut s, _) = surface();
        s.mark_ready().unwrap();
        s.request_render("good".into());
        s.apply_result(1, svg("good")).unwrap();
        s.request_render("bad".into());
        s.apply_result(2, Err(RenderError::syntax("syntax error in line 1")))
            .unwrap();

        assert_eq!(s.last_artifact().unwrap().body, "good");
        assert!(s.last_error().is_some());
        assert_eq!(s.last_applied_generation(), 2);
    }

    #[test]
    fn test_resync_resends_last_result_and_search() {
        let (mut s, outbox) = surface();
        s.mark_ready().unwrap();
        s.request_render("x".into());
        s.apply_result(1, svg("x")).unwrap();
        s.store_search("x".into());
        outbox.clear();

        s.resync().unwrap();
        assert_eq!(outbox.reveals(), 1);
        assert_eq!(outbox.kinds(), vec!["renderResult", "searchApply"]);
    }

    #[test]
    fn test_dispose_is_terminal() {
        let (mut s, outbox) = surface();
        s.mark_ready().unwrap();
        s.request_render("x".into());

        assert!(s.dispose());
        assert!(!s.dispose());
        assert!(outbox.is_disposed());
        assert_eq!(s.pending_content(), None);
        assert_eq!(s.request_render("y".into()), None);
        assert!(!s.apply_result(1, svg("x")).unwrap());
        assert!(!s.mark_ready().unwrap());
        assert!(s.send_custom(serde_json::json!({})).is_err());
    }

    #[test]
    fn test_send_failure_surfaces_as_error() {
        let (mut s, outbox) = surface();
        s.mark_ready().unwrap();
        outbox.break_channel();
        s.request_render("x".into());
        assert!(matches!(s.begin_render(), Err(TransportError::Closed)));
    }
}
