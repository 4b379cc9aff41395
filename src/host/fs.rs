//! File watcher for previews driven from the command line.
//!
//! ```text
//! notify → Debouncer (timing + dedup) → route → HostEvent
//! ```
//!
//! Without an editor, the file system stands in for document events: a
//! write is a save, a new file is an open, a deletion is a close.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::HostEvent;
use crate::core::{Document, DocumentId, is_dot_source};
use crate::{debug, log};

const DEBOUNCE_MS: u64 = 100;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

pub struct FileWatcher {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must be kept alive
    _watcher: RecommendedWatcher,
    host_tx: mpsc::Sender<HostEvent>,
    debouncer: Debouncer,
}

impl FileWatcher {
    /// Start watching `dirs` right away; events buffer until `run`.
    pub fn new(dirs: &[PathBuf], host_tx: mpsc::Sender<HostEvent>) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for dir in dirs {
            if dir.is_dir() {
                watcher.watch(dir, RecursiveMode::NonRecursive)?;
                debug!("watch"; "watching {}", dir.display());
            }
        }

        Ok(Self {
            notify_rx,
            _watcher: watcher,
            host_tx,
            debouncer: Debouncer::new(),
        })
    }

    pub async fn run(self) {
        let Self {
            notify_rx,
            _watcher,
            host_tx,
            mut debouncer,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    let Some(changes) = debouncer.take_if_ready() else {
                        continue;
                    };
                    for event in route(changes) {
                        if host_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Directories to watch for the given source files.
pub fn watch_dirs(files: &[PathBuf], fallback: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = files
        .iter()
        .filter_map(|file| file.parent().map(Path::to_path_buf))
        .collect();
    if dirs.is_empty() {
        dirs.push(fallback.to_path_buf());
    }
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Turn debounced changes into document events, Graphviz sources only.
fn route(changes: FxHashMap<PathBuf, ChangeKind>) -> Vec<HostEvent> {
    let mut changes: Vec<_> = changes.into_iter().collect();
    changes.sort_by(|a, b| a.0.cmp(&b.0));

    changes
        .into_iter()
        .filter(|(path, _)| is_dot_source("", &path.to_string_lossy()))
        .filter_map(|(path, kind)| match kind {
            ChangeKind::Removed => Some(HostEvent::Closed(DocumentId::from_path(&path))),
            ChangeKind::Created | ChangeKind::Modified => match Document::read(&path) {
                Ok(document) if kind == ChangeKind::Created => Some(HostEvent::Opened(document)),
                Ok(document) => Some(HostEvent::Saved(document)),
                Err(e) => {
                    debug!("watch"; "{:#}", e);
                    None
                }
            },
        })
        .collect()
}

/// Pure debouncer: only handles timing and event deduplication.
struct Debouncer {
    /// Path → ChangeKind (dedup via key uniqueness)
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Remove + Create/Modify → Create/Modify (file was restored)
    /// - Modify + Remove → Remove (file was deleted)
    /// - Create + Remove → nothing (file came and went)
    /// - otherwise the first event wins
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }

            match (self.changes.get(path).copied(), kind) {
                (None, _) => {
                    debug!("watch"; "event {}: {}", kind.label(), path.display());
                    self.changes.insert(path.clone(), kind);
                }
                (Some(ChangeKind::Removed), ChangeKind::Created | ChangeKind::Modified) => {
                    self.changes.insert(path.clone(), kind);
                }
                (Some(ChangeKind::Modified), ChangeKind::Removed) => {
                    self.changes.insert(path.clone(), ChangeKind::Removed);
                }
                (Some(ChangeKind::Created), ChangeKind::Removed) => {
                    self.changes.remove(path);
                }
                _ => continue,
            }
            self.last_event = Some(Instant::now());
        }
    }

    fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|last| last.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
            && !self.changes.is_empty()
    }

    fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.changes))
    }

    /// Precise sleep duration until the burst can be released.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        Duration::from_millis(DEBOUNCE_MS)
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
