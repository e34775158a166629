use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use notify::{
    Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::{Inner, Library, LibraryError};

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last relevant event before rebuilding.
    pub debounce: Duration,
    /// `None` uses the platform's native notifications.
    pub poll_interval: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchState {
    #[default]
    Idle,
    Watching,
    ChangeDetected,
    Rebuilding,
}

enum ActiveWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl ActiveWatcher {
    fn watch(&mut self, path: &std::path::Path) -> notify::Result<()> {
        match self {
            ActiveWatcher::Native(watcher) => watcher.watch(path, RecursiveMode::NonRecursive),
            ActiveWatcher::Poll(watcher) => watcher.watch(path, RecursiveMode::NonRecursive),
        }
    }
}

/// Live watches for one snapshot's sidecars. Dropping it closes the event
/// channel, which ends its loop.
pub(crate) struct SidecarWatcher {
    _watcher: ActiveWatcher,
}

#[derive(Default)]
pub(crate) struct WatchSlot {
    pub(crate) options: Option<WatchOptions>,
    pub(crate) watcher: Option<SidecarWatcher>,
    pub(crate) state: WatchState,
}

impl Library {
    /// Starts watching the sidecars of the current snapshot. Every later
    /// rebuild re-arms the watches against its own sidecar set.
    pub fn watch(&self, options: WatchOptions) -> Result<(), LibraryError> {
        self.inner.watch.lock().options = Some(options);
        self.arm_watcher()
    }

    pub fn unwatch(&self) {
        let mut slot = self.inner.watch.lock();
        slot.options = None;
        slot.watcher = None;
        slot.state = WatchState::Idle;
    }

    pub fn watch_state(&self) -> WatchState {
        self.inner.watch.lock().state
    }

    pub(crate) fn suspend_watcher(&self) {
        let mut slot = self.inner.watch.lock();
        if slot.options.is_some() {
            slot.watcher = None;
            slot.state = WatchState::Rebuilding;
        }
    }

    pub(crate) fn arm_watcher(&self) -> Result<(), LibraryError> {
        let Some(options) = self.inner.watch.lock().options else {
            return Ok(());
        };

        let snapshot = self.snapshot();
        let baseline: HashMap<PathBuf, Option<SystemTime>> = snapshot
            .sidecar_paths()
            .map(|path| (path.to_path_buf(), modified(path)))
            .collect();

        let (tx, rx) = mpsc::unbounded_channel::<Event>();
        let handler = move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        };
        let mut watcher = match options.poll_interval {
            Some(interval) => ActiveWatcher::Poll(PollWatcher::new(
                handler,
                NotifyConfig::default().with_poll_interval(interval),
            )?),
            None => ActiveWatcher::Native(RecommendedWatcher::new(
                handler,
                NotifyConfig::default(),
            )?),
        };

        // Folders rather than files, so sidecars replaced by rename are still seen.
        for path in baseline.keys() {
            if let Some(folder) = path.parent() {
                if let Err(err) = watcher.watch(folder) {
                    warn!("Failed to watch {}: {}", folder.display(), err);
                }
            }
        }

        info!(
            "Watching {} sidecars (generation {}, debounce {}ms)",
            baseline.len(),
            snapshot.generation(),
            options.debounce.as_millis()
        );

        {
            let mut slot = self.inner.watch.lock();
            if slot.options.is_none() {
                return Ok(());
            }
            slot.watcher = Some(SidecarWatcher { _watcher: watcher });
            slot.state = WatchState::Watching;
        }

        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(watch_loop(inner, rx, baseline, options.debounce));
        Ok(())
    }
}

async fn watch_loop(
    inner: Weak<Inner>,
    mut rx: UnboundedReceiver<Event>,
    baseline: HashMap<PathBuf, Option<SystemTime>>,
    debounce: Duration,
) {
    loop {
        let event = match rx.recv().await {
            Some(event) => event,
            None => return,
        };
        if !sidecar_changed(&event, &baseline) {
            continue;
        }

        let Some(library) = upgrade(&inner) else {
            return;
        };
        library.inner.watch.lock().state = WatchState::ChangeDetected;
        debug!("Sidecar change detected: {:?}", event.paths);
        drop(library);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                maybe_event = rx.recv() => {
                    if maybe_event.is_none() {
                        return;
                    }
                }
            }
        }

        let Some(library) = upgrade(&inner) else {
            return;
        };
        info!("Sidecar edited externally; rebuilding library");
        match library.rescan().await {
            Ok(snapshot) => info!(
                "Auto-rebuild complete: {} albums, {} tracks",
                snapshot.len(),
                snapshot.track_count()
            ),
            Err(err) => warn!("Auto-rebuild failed: {}", err),
        }
        // The rebuild armed a fresh watcher with its own loop.
        return;
    }
}

fn upgrade(inner: &Weak<Inner>) -> Option<Library> {
    inner.upgrade().map(|inner| Library { inner })
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// True when the event touches a known sidecar whose mtime moved past the
/// one observed when the watch was armed, or which can no longer be read.
fn sidecar_changed(event: &Event, baseline: &HashMap<PathBuf, Option<SystemTime>>) -> bool {
    if !is_relevant_event(event) {
        return false;
    }
    event.paths.iter().any(|path| match baseline.get(path) {
        None => false,
        Some(seen) => match (modified(path), seen) {
            (Some(now), Some(seen)) => now > *seen,
            (Some(_), None) => true,
            (None, _) => true,
        },
    })
}

fn modified(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
