//! In-memory test doubles for the panel layer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::messages::{HostMessage, SurfaceId, SurfaceMessage, TransportEvent};
use super::transport::{SurfaceChannel, SurfaceFactory, Transport};
use super::{PanelError, TransportError};
use crate::render::{Artifact, RenderEngine, RenderError, RenderFuture, RenderOptions};

// =============================================================================
// Transport
// =============================================================================

/// Everything a [`RecordingTransport`] was asked to do.
#[derive(Clone, Default)]
pub(crate) struct Outbox {
    messages: Arc<Mutex<Vec<HostMessage>>>,
    disposed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    reveals: Arc<AtomicUsize>,
}

impl Outbox {
    pub(crate) fn messages(&self) -> Vec<HostMessage> {
        self.messages.lock().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<&'static str> {
        self.messages.lock().iter().map(HostMessage::kind).collect()
    }

    /// `(generation, artifact body, error)` of every delivered result.
    pub(crate) fn render_results(&self) -> Vec<(u64, Option<String>, Option<RenderError>)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|msg| match msg {
                HostMessage::RenderResult {
                    generation,
                    artifact,
                    error,
                } => Some((
                    *generation,
                    artifact.as_ref().map(|a| a.body.clone()),
                    error.clone(),
                )),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.messages.lock().clear();
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn reveals(&self) -> usize {
        self.reveals.load(Ordering::SeqCst)
    }

    /// Make every following send fail.
    pub(crate) fn break_channel(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct RecordingTransport {
    outbox: Outbox,
}

impl RecordingTransport {
    pub(crate) fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, message: &HostMessage) -> Result<(), TransportError> {
        if self.outbox.broken.load(Ordering::SeqCst) || self.outbox.is_disposed() {
            return Err(TransportError::Closed);
        }
        // Round-trip through JSON like a real channel would.
        let wire = message.to_json()?;
        let decoded: HostMessage = serde_json::from_str(&wire)?;
        self.outbox.messages.lock().push(decoded);
        Ok(())
    }

    fn reveal(&mut self) {
        self.outbox.reveals.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&mut self) {
        self.outbox.disposed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Frontend side of a test surface.
#[derive(Clone)]
pub(crate) struct Frontend {
    pub(crate) outbox: Outbox,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Frontend {
    pub(crate) fn connect(&self) {
        let _ = self.events.send(TransportEvent::Connected);
    }

    pub(crate) fn ready(&self) {
        self.send(SurfaceMessage::Ready);
    }

    pub(crate) fn send(&self, message: SurfaceMessage) {
        let _ = self.events.send(TransportEvent::Message(message));
    }

    pub(crate) fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed {
            reason: Some("closed by test".into()),
        });
    }
}

#[derive(Default)]
pub(crate) struct ChannelFactory {
    frontends: Mutex<FxHashMap<SurfaceId, Frontend>>,
    /// Complete the handshake as soon as the surface is created.
    auto_ready: bool,
    fail: AtomicBool,
}

impl ChannelFactory {
    pub(crate) fn auto_ready() -> Self {
        Self {
            auto_ready: true,
            ..Self::default()
        }
    }

    pub(crate) fn manual() -> Self {
        Self::default()
    }

    pub(crate) fn fail_creation(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn frontend(&self, id: SurfaceId) -> Frontend {
        self.frontends
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no surface {id}"))
    }

    pub(crate) fn created(&self) -> usize {
        self.frontends.lock().len()
    }
}

impl SurfaceFactory for ChannelFactory {
    fn create(&self, id: SurfaceId, _title: &str) -> Result<SurfaceChannel, PanelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PanelError::creation("factory refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Outbox::default();
        let frontend = Frontend {
            outbox: outbox.clone(),
            events: tx,
        };
        if self.auto_ready {
            frontend.connect();
            frontend.ready();
        }
        self.frontends.lock().insert(id, frontend);

        Ok(SurfaceChannel::new(RecordingTransport::new(outbox), rx))
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Engine double: echoes the source into an SVG body after a scripted delay.
///
/// Sources that do not end in `}` are reported as syntax errors.
#[derive(Clone, Default)]
pub(crate) struct ScriptedEngine {
    calls: Arc<Mutex<Vec<String>>>,
    /// Per-call delays, consumed in call order. Missing entries use `delay`.
    delays: Arc<Mutex<VecDeque<Duration>>>,
    delay: Duration,
}

impl ScriptedEngine {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn push_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.delays.lock().extend(delays);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl RenderEngine for ScriptedEngine {
    fn render(&self, source: String, options: &RenderOptions) -> RenderFuture {
        self.calls.lock().push(source.clone());
        let delay = self.delays.lock().pop_front().unwrap_or(self.delay);
        let format = options.format;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if source.trim_end().ends_with('}') {
                Ok(Artifact::new(format, format!("<svg>{source}</svg>")))
            } else {
                Err(RenderError::syntax("syntax error in line 1"))
            }
        })
    }
}
