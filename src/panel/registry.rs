//! Process-wide directory of live preview surfaces.
//!
//! Maps a document identity to the surfaces bound to it (in creation order)
//! and owns the policy for reusing them. Constructed once by the host and
//! passed where needed; cloning shares the same directory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::PanelError;
use super::coordinator::{DisposeHook, SurfaceHandle, SurfaceSpawn, spawn_surface};
use super::messages::SurfaceId;
use super::surface::{PreviewSurface, ReadyState};
use super::transport::SurfaceFactory;
use crate::core::DocumentId;
use crate::render::{RenderEngine, RenderOptions};
use crate::{debug, log};

/// How long `shutdown` waits for surface tasks to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Invoked once with the created or revealed surface.
pub type RevealCallback = Box<dyn FnOnce(&SurfaceHandle) + Send>;

/// Registry-wide settings.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub debounce: Duration,
    pub allow_multiple_panels: bool,
    /// Bound on the ready handshake; `None` waits forever.
    pub ready_timeout: Option<Duration>,
    pub render: RenderOptions,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            allow_multiple_panels: false,
            ready_timeout: None,
            render: RenderOptions::default(),
        }
    }
}

/// Options for [`PanelRegistry::reveal_or_create`].
#[derive(Default)]
pub struct RevealOptions {
    /// Seeds the first render without waiting for an edit.
    pub content: Option<String>,
    pub title: Option<String>,
    pub search: Option<String>,
    /// Overrides [`RegistrySettings::allow_multiple_panels`].
    pub allow_multiple_panels: Option<bool>,
    pub callback: Option<RevealCallback>,
}

impl std::fmt::Debug for RevealOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealOptions")
            .field("content", &self.content.as_ref().map(String::len))
            .field("title", &self.title)
            .field("search", &self.search)
            .field("allow_multiple_panels", &self.allow_multiple_panels)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Listing entry for a live surface.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceSummary {
    pub id: SurfaceId,
    pub title: String,
    pub document: Option<DocumentId>,
    pub state: ReadyState,
}

#[derive(Clone)]
pub struct PanelRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    factory: Arc<dyn SurfaceFactory>,
    engine: Arc<dyn RenderEngine>,
    settings: RegistrySettings,
    next_id: AtomicU64,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    surfaces: FxHashMap<SurfaceId, Entry>,
    /// Creation order; the last live id is the one `get_panel` returns.
    by_document: FxHashMap<DocumentId, Vec<SurfaceId>>,
}

struct Entry {
    handle: SurfaceHandle,
    task: JoinHandle<()>,
}

impl RegistryState {
    fn insert(&mut self, handle: SurfaceHandle, task: JoinHandle<()>) {
        if let Some(document) = handle.document() {
            self.by_document
                .entry(document.clone())
                .or_default()
                .push(handle.id());
        }
        self.surfaces.insert(handle.id(), Entry { handle, task });
    }

    /// Most recently created surface bound to `document` that is still live.
    fn live_bound(&self, document: &DocumentId) -> Option<SurfaceHandle> {
        self.by_document
            .get(document)?
            .iter()
            .rev()
            .filter_map(|id| self.surfaces.get(id))
            .map(|entry| &entry.handle)
            .find(|handle| !handle.is_disposed())
            .cloned()
    }

    fn remove(&mut self, id: SurfaceId) -> Option<Entry> {
        let entry = self.surfaces.remove(&id)?;
        if let Some(document) = entry.handle.document()
            && let Some(ids) = self.by_document.get_mut(document)
        {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_document.remove(document);
            }
        }
        Some(entry)
    }
}

impl PanelRegistry {
    pub fn new(
        factory: Arc<dyn SurfaceFactory>,
        engine: Arc<dyn RenderEngine>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                engine,
                settings,
                next_id: AtomicU64::new(1),
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    /// Most recently created live surface bound to `document`.
    pub fn get_panel(&self, document: &DocumentId) -> Option<SurfaceHandle> {
        let state = self.shared.state.lock();
        let id = state.by_document.get(document)?.last()?;
        state.surfaces.get(id).map(|entry| entry.handle.clone())
    }

    pub fn get(&self, id: SurfaceId) -> Option<SurfaceHandle> {
        let state = self.shared.state.lock();
        state.surfaces.get(&id).map(|entry| entry.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live surfaces ordered by id.
    pub fn surfaces(&self) -> Vec<SurfaceSummary> {
        let state = self.shared.state.lock();
        let mut list: Vec<_> = state
            .surfaces
            .values()
            .map(|entry| SurfaceSummary {
                id: entry.handle.id(),
                title: entry.handle.title().to_string(),
                document: entry.handle.document().cloned(),
                state: entry.handle.ready_state(),
            })
            .collect();
        list.sort_by_key(|summary| summary.id);
        list
    }

    /// Reuse the surface bound to `document`, or create a new one.
    ///
    /// Reuse happens only when multiple panels are not allowed and a bound
    /// surface exists; it is brought to front. A new surface is seeded with
    /// `content` and `search` before its frontend can speak, bound to
    /// `document` if given, and handed to `callback`. Either way the call
    /// resolves once the surface has completed the ready handshake.
    pub async fn reveal_or_create(
        &self,
        document: Option<DocumentId>,
        options: RevealOptions,
    ) -> Result<SurfaceHandle, PanelError> {
        let allow_multiple = options
            .allow_multiple_panels
            .unwrap_or(self.shared.settings.allow_multiple_panels);

        let existing = match (&document, allow_multiple) {
            (Some(document), false) => self.get_panel(document),
            _ => None,
        };

        let handle = match existing {
            Some(handle) => {
                debug!("panel"; "revealing surface {}", handle.id());
                Self::seed_existing(&handle, options)?;
                handle
            }
            None => self.create(document, options, allow_multiple)?,
        };

        self.await_ready(&handle).await?;
        Ok(handle)
    }

    fn seed_existing(handle: &SurfaceHandle, options: RevealOptions) -> Result<(), PanelError> {
        handle.reveal()?;
        if let Some(content) = options.content {
            handle.set_waiting_for_rendering(content)?;
        }
        if options.search.is_some() {
            handle.set_search(options.search)?;
        }
        if let Some(callback) = options.callback {
            callback(handle);
        }
        Ok(())
    }

    fn create(
        &self,
        document: Option<DocumentId>,
        options: RevealOptions,
        allow_multiple: bool,
    ) -> Result<SurfaceHandle, PanelError> {
        let RevealOptions {
            content,
            title,
            search,
            callback,
            ..
        } = options;
        let id = SurfaceId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let title = title.unwrap_or_else(|| default_title(document.as_ref()));

        let channel = self.shared.factory.create(id, &title)?;

        let mut surface = PreviewSurface::new(id, document, title, channel.transport);
        if let Some(content) = &content {
            surface.request_render(content.clone());
        }
        // Not ready yet, so this only buffers and cannot fail.
        let _ = surface.set_search(search.clone());

        let (handle, task) = spawn_surface(SurfaceSpawn {
            surface,
            events: channel.events,
            engine: Arc::clone(&self.shared.engine),
            options: self.shared.settings.render.clone(),
            debounce: self.shared.settings.debounce,
            on_dispose: self.dispose_hook(),
        });

        // Lookup and insert share one critical section so concurrent reveals
        // of the same document agree on a single surface.
        let winner = {
            let mut state = self.shared.state.lock();
            let bound = match (handle.document(), allow_multiple) {
                (Some(document), false) => state.live_bound(document),
                _ => None,
            };
            if bound.is_none() {
                state.insert(handle.clone(), task);
                // The frontend may have closed before we got here.
                if handle.is_disposed() {
                    state.remove(id);
                }
            }
            bound
        };

        if let Some(winner) = winner {
            debug!("panel"; "surface {} lost to {}, revealing that instead", id, winner.id());
            handle.dispose();
            Self::seed_existing(&winner, RevealOptions {
                content,
                search,
                callback,
                ..RevealOptions::default()
            })?;
            return Ok(winner);
        }
        log!("preview"; "opened surface {} ({})", id, handle.title());

        if let Some(callback) = callback {
            callback(&handle);
        }
        Ok(handle)
    }

    async fn await_ready(&self, handle: &SurfaceHandle) -> Result<(), PanelError> {
        let outcome = match self.shared.settings.ready_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle.wait_ready()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    handle.dispose();
                    return Err(PanelError::creation(format!(
                        "surface {} did not become ready within {}ms",
                        handle.id(),
                        limit.as_millis()
                    )));
                }
            },
            None => handle.wait_ready().await,
        };
        outcome.map_err(|_| {
            PanelError::creation(format!("surface {} closed before it was ready", handle.id()))
        })
    }

    /// Registry entries are removed synchronously with disposal.
    fn dispose_hook(&self) -> DisposeHook {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |id| {
            if let Some(shared) = shared.upgrade() {
                // Dropping the JoinHandle detaches the task; it exits on its own.
                let removed = shared.state.lock().remove(id);
                if removed.is_some() {
                    debug!("panel"; "unregistered surface {}", id);
                }
            }
        })
    }

    /// Dispose every surface and wait briefly for their tasks to finish.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = {
            let mut state = self.shared.state.lock();
            state.by_document.clear();
            state.surfaces.drain().map(|(_, entry)| entry).collect()
        };
        if entries.is_empty() {
            return;
        }

        debug!("panel"; "disposing {} surfaces", entries.len());
        let tasks: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                entry.handle.dispose();
                entry.task
            })
            .collect();

        let join_all = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, join_all).await.is_err() {
            debug!("panel"; "some surfaces did not stop in time");
        }
    }
}

fn default_title(document: Option<&DocumentId>) -> String {
    match document {
        Some(document) => format!("Preview {}", document.display_name()),
        None => "Graphviz Preview".to_string(),
    }
}
