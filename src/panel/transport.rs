//! Transport capability between the host and one surface frontend.
//!
//! The concrete channel (a WebSocket, an in-process queue in tests) is
//! supplied by the application through a [`SurfaceFactory`]. The core only
//! needs to send, to bring the surface to front, and to close it; inbound
//! traffic arrives as [`TransportEvent`]s on the channel's receiver.

use tokio::sync::mpsc;

use super::messages::{HostMessage, SurfaceId, TransportEvent};
use super::{PanelError, TransportError};

/// Outbound half of a surface channel.
pub trait Transport: Send + 'static {
    /// Queue `message` for the frontend. Delivery is FIFO per transport.
    fn send(&mut self, message: &HostMessage) -> Result<(), TransportError>;

    /// Bring the surface to front. No-op where the host has no notion of focus.
    fn reveal(&mut self) {}

    /// Close the channel. Called exactly once, when the surface is disposed.
    fn dispose(&mut self);
}

/// A freshly instantiated surface channel.
pub struct SurfaceChannel {
    pub transport: Box<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SurfaceChannel {
    pub fn new(
        transport: impl Transport,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            events,
        }
    }
}

/// Instantiates surfaces on behalf of the registry.
pub trait SurfaceFactory: Send + Sync + 'static {
    /// Fails with [`PanelError::CreationFailed`] when the host cannot provide
    /// another surface (resource exhaustion, transport setup failure).
    fn create(&self, id: SurfaceId, title: &str) -> Result<SurfaceChannel, PanelError>;
}
