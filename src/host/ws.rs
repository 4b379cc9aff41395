//! WebSocket surfaces: one browser page per preview surface.
//!
//! Each surface gets a slot keyed by its id. The page served at
//! `/surface/<id>` connects back to `ws://<host>:<port>/surface/<id>`,
//! claims the slot, and from then on a dedicated thread pumps frames both
//! ways. Host messages queue in the slot until the page connects.

use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

use crate::core::is_shutdown;
use crate::panel::{
    HostMessage, PanelError, SurfaceChannel, SurfaceFactory, SurfaceId, SurfaceMessage,
    Transport, TransportError, TransportEvent,
};
use crate::{debug, log};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Live surfaces one server will hand out.
const MAX_SURFACES: usize = 64;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const ACCEPT_INTERVAL: Duration = Duration::from_millis(100);

enum Outbound {
    Text(String),
    Close,
}

struct Slot {
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Taken by the first connection that claims the slot.
    outbound: Option<Receiver<Outbound>>,
}

type Slots = Arc<Mutex<FxHashMap<SurfaceId, Slot>>>;

pub struct WsSurfaceFactory {
    slots: Slots,
    port: u16,
    /// Origin of the page server, for the URLs we print.
    page_origin: String,
}

impl WsSurfaceFactory {
    /// Bind the socket server (retrying successive ports) and start accepting.
    pub fn bind(interface: IpAddr, base_port: u16, page_origin: String) -> Result<Self> {
        let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let slots = Slots::default();
        let accept_slots = Arc::clone(&slots);
        std::thread::spawn(move || accept_loop(&listener, &accept_slots));

        debug!("ws"; "listening on {}:{}", interface, port);
        Ok(Self {
            slots,
            port,
            page_origin,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn page_url(&self, id: SurfaceId) -> String {
        format!("{}/surface/{}", self.page_origin, id.0)
    }
}

impl SurfaceFactory for WsSurfaceFactory {
    fn create(&self, id: SurfaceId, title: &str) -> Result<SurfaceChannel, PanelError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = channel::unbounded();

        {
            let mut slots = self.slots.lock();
            if slots.len() >= MAX_SURFACES {
                return Err(PanelError::creation(format!(
                    "too many open previews (limit {MAX_SURFACES})"
                )));
            }
            slots.insert(
                id,
                Slot {
                    events: events_tx,
                    outbound: Some(outbound_rx),
                },
            );
        }

        let page_url = self.page_url(id);
        log!("preview"; "{} → {}", title, page_url);

        let transport = WsTransport {
            id,
            outbound: outbound_tx,
            slots: Arc::clone(&self.slots),
            page_url,
        };
        Ok(SurfaceChannel::new(transport, events_rx))
    }
}

struct WsTransport {
    id: SurfaceId,
    outbound: Sender<Outbound>,
    slots: Slots,
    page_url: String,
}

impl Transport for WsTransport {
    fn send(&mut self, message: &HostMessage) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.outbound
            .send(Outbound::Text(json))
            .map_err(|_| TransportError::Closed)
    }

    /// Browsers cannot be raised from here; point the user at the page.
    fn reveal(&mut self) {
        log!("preview"; "surface {} → {}", self.id, self.page_url);
    }

    fn dispose(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
        self.slots.lock().remove(&self.id);
    }
}

// =============================================================================
// Socket threads
// =============================================================================

fn accept_loop(listener: &TcpListener, slots: &Slots) {
    while !is_shutdown() {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("ws"; "connection from {}", addr);
                // Blocking for the handshake
                let _ = stream.set_nonblocking(false);
                let slots = Arc::clone(slots);
                std::thread::spawn(move || attach(stream, &slots));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_INTERVAL);
            }
            Err(e) => {
                log!("ws"; "accept error: {}", e);
                std::thread::sleep(ACCEPT_INTERVAL);
            }
        }
    }
}

/// `/surface/<id>` → id
fn parse_surface_path(path: &str) -> Option<SurfaceId> {
    let id = path.strip_prefix("/surface/")?.trim_end_matches('/');
    id.parse().ok().map(SurfaceId)
}

/// Claim the unclaimed slot for `path`, if there is one.
fn claim(
    slots: &Slots,
    path: &str,
) -> Option<(SurfaceId, mpsc::UnboundedSender<TransportEvent>, Receiver<Outbound>)> {
    let id = parse_surface_path(path)?;
    let mut slots = slots.lock();
    let slot = slots.get_mut(&id)?;
    let outbound = slot.outbound.take()?;
    Some((id, slot.events.clone(), outbound))
}

fn attach(stream: TcpStream, slots: &Slots) {
    let mut claimed = None;
    let handshake = tungstenite::accept_hdr(stream, |request: &Request, response: Response| {
        match claim(slots, request.uri().path()) {
            Some(slot) => {
                claimed = Some(slot);
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some("no such surface".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    })
    .map_err(|e| e.to_string());

    let Some((id, events, outbound)) = claimed else {
        debug!("ws"; "rejected connection");
        return;
    };
    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            log!("ws"; "handshake failed: {}", e);
            let _ = events.send(TransportEvent::Closed { reason: Some(e) });
            return;
        }
    };

    // Non-blocking for polling reads
    let _ = ws.get_ref().set_nonblocking(true);
    debug!("ws"; "surface {} connected", id);
    if events.send(TransportEvent::Connected).is_err() {
        return;
    }
    pump(ws, &events, &outbound);
}

enum Pumped {
    /// Frontend went away.
    Closed(Option<String>),
    /// Host disposed the surface.
    Disposed,
}

/// Move frames both ways until either side closes.
fn pump(
    mut ws: WebSocket<TcpStream>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: &Receiver<Outbound>,
) {
    let outcome = loop {
        if let Some(outcome) = flush_outbound(&mut ws, outbound) {
            break outcome;
        }

        match ws.read() {
            Ok(Message::Text(text)) => match SurfaceMessage::from_json(&text) {
                Ok(message) => {
                    if events.send(TransportEvent::Message(message)).is_err() {
                        break Pumped::Disposed;
                    }
                }
                Err(e) => debug!("ws"; "ignoring malformed frame: {}", e),
            },
            Ok(Message::Close(frame)) => {
                break Pumped::Closed(frame.map(|frame| frame.reason.as_str().to_owned()));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => break Pumped::Closed(Some(e.to_string())),
        }
    };

    match outcome {
        Pumped::Closed(reason) => {
            let _ = events.send(TransportEvent::Closed { reason });
        }
        Pumped::Disposed => {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
    }
}

/// Send queued host messages. `Some` ends the connection.
fn flush_outbound(
    ws: &mut WebSocket<TcpStream>,
    outbound: &Receiver<Outbound>,
) -> Option<Pumped> {
    loop {
        match outbound.try_recv() {
            Ok(Outbound::Text(text)) => {
                // A would-block write stays buffered until the next flush.
                match ws.write(Message::Text(text.into())) {
                    Ok(()) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Some(Pumped::Closed(Some(e.to_string()))),
                }
            }
            Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => {
                return Some(Pumped::Disposed);
            }
            Err(TryRecvError::Empty) => break,
        }
    }

    match ws.flush() {
        Ok(()) => None,
        Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => None,
        Err(e) => Some(Pumped::Closed(Some(e.to_string()))),
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
