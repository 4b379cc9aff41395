//! Preview panel orchestration.
//!
//! ```text
//! host event ─▶ PanelRegistry ─▶ SurfaceHandle ─▶ SurfaceActor ─▶ RenderEngine
//!                   (lookup)        (command)      (debounce,       (external)
//!                                                   generations)
//!                                                      │
//!                                         Transport ◀──┘ HostMessage
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Host ↔ surface message vocabulary
//! - `transport` - Transport capability and surface factory seam
//! - `surface` - Per-surface state machine
//! - `coordinator` - Per-surface actor and its handle
//! - `registry` - Document → surface directory

mod coordinator;
mod debounce;
mod error;
mod messages;
mod registry;
mod surface;
mod transport;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use coordinator::{Disposition, MessageHandler, SurfaceHandle};
pub use error::{PanelError, TransportError};
pub use messages::{
    HostMessage, RenderRequest, RenderResult, SurfaceId, SurfaceMessage, TransportEvent,
};
pub use registry::{
    PanelRegistry, RegistrySettings, RevealCallback, RevealOptions, SurfaceSummary,
};
pub use surface::{PreviewSurface, ReadyState};
pub use transport::{SurfaceChannel, SurfaceFactory, Transport};
