use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use common::Album;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub mod artwork;
pub mod probe;
pub mod reconcile;
pub mod scan;
pub mod sidecar;
mod watch;

pub use probe::{LocalProbe, MediaProbe};
pub use scan::{scan, scan_with_report, ScanReport};
pub use watch::{WatchOptions, WatchState};

use watch::WatchSlot;

pub const DEFAULT_SIDECAR_NAME: &str = "album.json";
pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;
const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    /// File name of the per-album JSON record.
    pub sidecar_name: String,
    /// Album folders indexed at the same time.
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            sidecar_name: DEFAULT_SIDECAR_NAME.to_string(),
            concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }
}

/// One immutable rebuild of the library. Replaced wholesale, never patched;
/// hold album paths across rebuilds, not references into an old snapshot.
#[derive(Debug, Default)]
pub struct LibrarySnapshot {
    generation: u64,
    albums: Vec<Album>,
    by_path: HashMap<PathBuf, usize>,
}

impl LibrarySnapshot {
    pub fn new(generation: u64, albums: Vec<Album>) -> Self {
        let by_path = albums
            .iter()
            .enumerate()
            .map(|(idx, album)| (album.path.clone(), idx))
            .collect();
        Self {
            generation,
            albums,
            by_path,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn lookup(&self, path: &Path) -> Option<&Album> {
        self.by_path.get(path).map(|idx| &self.albums[*idx])
    }

    pub fn sidecar_paths(&self) -> impl Iterator<Item = &Path> {
        self.albums.iter().map(|album| album.sidecar_path.as_path())
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.albums
            .iter()
            .map(|album| album.resolved_tracks.len())
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryStatus {
    Idle,
    Unconfigured,
    Scanning { started: SystemTime },
    Ready { albums: usize, tracks: usize },
    Error(String),
}

/// Shared handle to the in-memory library. Cheap to clone.
#[derive(Clone)]
pub struct Library {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    roots: Vec<PathBuf>,
    options: ScanOptions,
    probe: Arc<dyn MediaProbe>,
    snapshot: RwLock<Arc<LibrarySnapshot>>,
    generation: AtomicU64,
    status: RwLock<LibraryStatus>,
    events: broadcast::Sender<Arc<LibrarySnapshot>>,
    pub(crate) watch: Mutex<WatchSlot>,
}

impl Library {
    pub fn new(roots: Vec<PathBuf>, options: ScanOptions) -> Self {
        Self::with_probe(roots, options, Arc::new(LocalProbe))
    }

    pub fn with_probe(
        roots: Vec<PathBuf>,
        options: ScanOptions,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                roots,
                options,
                probe,
                snapshot: RwLock::new(Arc::new(LibrarySnapshot::empty())),
                generation: AtomicU64::new(0),
                status: RwLock::new(LibraryStatus::Idle),
                events,
                watch: Mutex::new(WatchSlot::default()),
            }),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.inner.roots
    }

    pub fn status(&self) -> LibraryStatus {
        self.inner.status.read().clone()
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> Arc<LibrarySnapshot> {
        self.inner.snapshot.read().clone()
    }

    pub fn lookup_by_path(&self, path: &Path) -> Option<Album> {
        self.inner.snapshot.read().lookup(path).cloned()
    }

    /// Receives every snapshot published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LibrarySnapshot>> {
        self.inner.events.subscribe()
    }

    /// Rebuilds the whole library from the configured roots and publishes it,
    /// unless a rebuild that started later has already published.
    pub async fn rescan(&self) -> Result<Arc<LibrarySnapshot>, LibraryError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if self.inner.roots.is_empty() {
            error!("No library roots configured");
            self.inner.publish(generation, Vec::new());
            *self.inner.status.write() = LibraryStatus::Unconfigured;
            return Err(LibraryError::NoRoots);
        }

        self.suspend_watcher();
        *self.inner.status.write() = LibraryStatus::Scanning {
            started: SystemTime::now(),
        };

        let report = scan_with_report(
            &self.inner.roots,
            &self.inner.options,
            self.inner.probe.clone(),
        )
        .await;
        let all_missing = report.missing_roots.len() == self.inner.roots.len();
        let failed_folders = report.failed_folders;

        let Some(snapshot) = self.inner.publish(generation, report.albums) else {
            info!("Discarding rebuild {}; a newer one already published", generation);
            return Ok(self.snapshot());
        };

        let status = if all_missing {
            LibraryStatus::Error("no library root is reachable".to_string())
        } else {
            LibraryStatus::Ready {
                albums: snapshot.len(),
                tracks: snapshot.track_count(),
            }
        };
        *self.inner.status.write() = status;
        info!(
            "Library rebuild {} complete: {} albums, {} tracks, {} folders skipped",
            generation,
            snapshot.len(),
            snapshot.track_count(),
            failed_folders
        );

        if let Err(err) = self.arm_watcher() {
            warn!("Failed to re-arm sidecar watcher: {}", err);
            self.inner.watch.lock().state = WatchState::Idle;
        }
        Ok(snapshot)
    }
}

impl Inner {
    fn publish(&self, generation: u64, albums: Vec<Album>) -> Option<Arc<LibrarySnapshot>> {
        let snapshot = Arc::new(LibrarySnapshot::new(generation, albums));
        {
            let mut current = self.snapshot.write();
            if current.generation() >= generation {
                return None;
            }
            *current = snapshot.clone();
        }
        let _ = self.events.send(snapshot.clone());
        Some(snapshot)
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Watch(notify::Error),
    Join(tokio::task::JoinError),
    NoRoots,
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
            LibraryError::Watch(err) => write!(f, "watch error: {}", err),
            LibraryError::Join(err) => write!(f, "task error: {}", err),
            LibraryError::NoRoots => write!(f, "no library roots configured"),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

impl From<notify::Error> for LibraryError {
    fn from(err: notify::Error) -> Self {
        LibraryError::Watch(err)
    }
}

impl From<tokio::task::JoinError> for LibraryError {
    fn from(err: tokio::task::JoinError) -> Self {
        LibraryError::Join(err)
    }
}
