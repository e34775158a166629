use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{sort_by_leading_number, Album, SidecarRecord};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::probe::MediaProbe;
use crate::sidecar::{self, LoadedSidecar};
use crate::{artwork, reconcile, LibraryError, ScanOptions};

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "aac", "alac", "flac", "ogg", "m4a", "m4p", "movpkg",
];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const TEXT_EXTENSION: &str = "txt";

/// A directory that directly holds at least one audio file.
#[derive(Clone, Debug, Default)]
pub struct AlbumFolder {
    pub path: PathBuf,
    pub audio_files: Vec<PathBuf>,
    pub image_files: Vec<PathBuf>,
    pub text_files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub albums: Vec<Album>,
    pub missing_roots: Vec<PathBuf>,
    pub failed_folders: usize,
}

enum FileKind {
    Audio,
    Image,
    Text,
}

fn classify(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Image)
    } else if ext == TEXT_EXTENSION {
        Some(FileKind::Text)
    } else {
        None
    }
}

/// Walks `root` and returns every album folder in traversal order. Nested
/// album folders are reported independently. Blocking.
pub fn collect_album_folders(root: &Path) -> Vec<AlbumFolder> {
    let mut folders: Vec<AlbumFolder> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            index.insert(path.to_path_buf(), folders.len());
            folders.push(AlbumFolder {
                path: path.to_path_buf(),
                ..AlbumFolder::default()
            });
            continue;
        }
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let Some(slot) = path.parent().and_then(|parent| index.get(parent)) else {
            continue;
        };
        let folder = &mut folders[*slot];
        match classify(path) {
            Some(FileKind::Audio) => folder.audio_files.push(path.to_path_buf()),
            Some(FileKind::Image) => folder.image_files.push(path.to_path_buf()),
            Some(FileKind::Text) => folder.text_files.push(path.to_path_buf()),
            None => {}
        }
    }

    folders.retain(|folder| !folder.audio_files.is_empty());
    for folder in &mut folders {
        sort_by_leading_number(&mut folder.audio_files, |path| {
            path.file_name().and_then(|name| name.to_str()).unwrap_or("")
        });
    }
    folders
}

pub async fn scan(
    roots: &[PathBuf],
    options: &ScanOptions,
    probe: Arc<dyn MediaProbe>,
) -> Vec<Album> {
    scan_with_report(roots, options, probe).await.albums
}

/// Full rebuild over `roots`. Missing roots and failing folders are logged
/// and counted; everything else still lands in the report.
pub async fn scan_with_report(
    roots: &[PathBuf],
    options: &ScanOptions,
    probe: Arc<dyn MediaProbe>,
) -> ScanReport {
    let mut report = ScanReport::default();
    let mut folders = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        let root_path = match tokio::fs::canonicalize(root).await {
            Ok(path) => path,
            Err(err) => {
                error!("Library root {} is unavailable: {}", root.display(), err);
                report.missing_roots.push(root.clone());
                continue;
            }
        };
        let walk_root = root_path.clone();
        match tokio::task::spawn_blocking(move || collect_album_folders(&walk_root)).await {
            Ok(found) => {
                info!(
                    "Found {} album folders under {}",
                    found.len(),
                    root_path.display()
                );
                for folder in found {
                    if seen.insert(folder.path.clone()) {
                        folders.push(folder);
                    } else {
                        warn!(
                            "{} is reachable from more than one root; indexing it once",
                            folder.path.display()
                        );
                    }
                }
            }
            Err(err) => error!("Walk of {} failed: {}", root_path.display(), err),
        }
    }

    let concurrency = options.concurrency.max(1);
    let mut results = stream::iter(folders.into_iter().map(|folder| {
        let probe = probe.clone();
        let sidecar_name = options.sidecar_name.clone();
        let path = folder.path.clone();
        async move {
            let outcome = tokio::spawn(index_folder(folder, sidecar_name, probe)).await;
            (path, outcome)
        }
    }))
    .buffered(concurrency);

    while let Some((path, outcome)) = results.next().await {
        match outcome {
            Ok(Ok(album)) => report.albums.push(album),
            Ok(Err(err)) => {
                warn!("Skipping album folder {}: {}", path.display(), err);
                report.failed_folders += 1;
            }
            Err(err) => {
                error!("Indexing task for {} failed: {}", path.display(), err);
                report.failed_folders += 1;
            }
        }
    }

    report
}

/// Loads the sidecar, reconciles tracks, resolves artwork and writes the
/// record back when it changed.
pub async fn index_folder(
    folder: AlbumFolder,
    sidecar_name: String,
    probe: Arc<dyn MediaProbe>,
) -> Result<Album, LibraryError> {
    let sidecar_path = folder.path.join(&sidecar_name);
    let LoadedSidecar { record, raw } = sidecar::load_or_create(&folder, &sidecar_path).await?;
    let SidecarRecord {
        track_list,
        mut description,
    } = record;

    let reconciled = reconcile::reconcile(track_list, &folder.audio_files, probe.clone()).await;
    let artwork = artwork::resolve(
        &folder.image_files,
        description.cover.as_deref(),
        description.color.as_deref(),
        probe,
    )
    .await;
    description.cover = artwork.cover;
    description.color = Some(artwork.color);

    let record = SidecarRecord {
        track_list: reconciled.declared,
        description,
    };
    sidecar::persist(&sidecar_path, &record, raw.as_deref()).await;

    let name = folder
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.path.to_string_lossy().into_owned());
    debug!(
        "Indexed {} ({} of {} tracks playable)",
        folder.path.display(),
        reconciled.resolved.len(),
        record.track_list.len()
    );

    Ok(Album {
        path: folder.path,
        name,
        description: record.description,
        declared_tracks: record.track_list,
        resolved_tracks: reconciled.resolved,
        sidecar_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn only_folders_with_audio_qualify() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Artist/Album/10 Ten.mp3"));
        touch(&root.join("Artist/Album/2 Two.FLAC"));
        touch(&root.join("Artist/Album/Bonus.ogg"));
        touch(&root.join("Artist/Album/cover.jpg"));
        touch(&root.join("Artist/Album/Genre.txt"));
        touch(&root.join("Artist/Album/notes.pdf"));
        touch(&root.join("Artist/Album/.01 hidden.mp3"));
        touch(&root.join("Artist/Album/Disc 2/01 Deep.m4a"));
        touch(&root.join("Artist/Scans/front.png"));
        touch(&root.join("Artist/Forks/._01 Song.mp3"));

        let folders = collect_album_folders(root);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].path, root.join("Artist/Album"));
        assert_eq!(
            names(&folders[0].audio_files),
            vec!["2 Two.FLAC", "10 Ten.mp3", "Bonus.ogg"]
        );
        assert_eq!(names(&folders[0].image_files), vec!["cover.jpg"]);
        assert_eq!(names(&folders[0].text_files), vec!["Genre.txt"]);
        assert_eq!(folders[1].path, root.join("Artist/Album/Disc 2"));
    }

    #[test]
    fn audio_at_the_root_counts() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("single.wav"));
        let folders = collect_album_folders(dir.path());
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].path, dir.path());
    }
}
