use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{normalize_title, sort_by_leading_number, DeclaredTrack, ResolvedTrack};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::probe::MediaProbe;

/// An audio file that exists on disk, with its probed duration.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbedFile {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciled {
    pub declared: Vec<DeclaredTrack>,
    pub resolved: Vec<ResolvedTrack>,
}

/// Probes every file concurrently, then matches the declared list against
/// whatever still exists.
pub async fn reconcile(
    declared: Vec<DeclaredTrack>,
    audio_files: &[PathBuf],
    probe: Arc<dyn MediaProbe>,
) -> Reconciled {
    let probes = audio_files
        .iter()
        .map(|path| probe_file(path.clone(), probe.clone()));
    let files = join_all(probes).await.into_iter().flatten().collect();
    match_tracks(declared, files)
}

async fn probe_file(path: PathBuf, probe: Arc<dyn MediaProbe>) -> Option<ProbedFile> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return None,
        Err(err) => {
            debug!("Audio file {} vanished: {}", path.display(), err);
            return None;
        }
    }

    let target = path.clone();
    let duration_seconds =
        match tokio::task::spawn_blocking(move || probe.probe_audio(&target)).await {
            Ok(Ok(info)) => info.duration_secs,
            Ok(Err(err)) => {
                debug!("No duration for {}: {}", path.display(), err);
                0.0
            }
            Err(err) => {
                warn!("Probe task for {} failed: {}", path.display(), err);
                0.0
            }
        };

    Some(ProbedFile {
        path,
        duration_seconds,
    })
}

/// Matches declared entries to files by normalized title.
///
/// The first file claiming a key wins it; later files with the same key are
/// ignored for this pass. Each file resolves at most one declared entry, so a
/// repeated declared title stays unresolved. Files no entry asks for are
/// appended to the declared list. Both lists come back ordered by leading
/// track number.
pub fn match_tracks(mut declared: Vec<DeclaredTrack>, files: Vec<ProbedFile>) -> Reconciled {
    let mut by_key: HashMap<String, ProbedFile> = HashMap::with_capacity(files.len());
    let mut file_order = Vec::with_capacity(files.len());
    for file in files {
        let key = normalize_title(&file_stem(&file.path));
        if by_key.contains_key(&key) {
            debug!(
                "{} shares the title key {:?} with an earlier file; skipping",
                file.path.display(),
                key
            );
            continue;
        }
        file_order.push(key.clone());
        by_key.insert(key, file);
    }

    sort_by_leading_number(&mut declared, |track| track.title.as_str());

    let mut resolved = Vec::with_capacity(declared.len());
    for track in &declared {
        if let Some(file) = by_key.remove(&normalize_title(&track.title)) {
            resolved.push(ResolvedTrack {
                title: track.title.trim().to_string(),
                path: file.path,
                duration_seconds: file.duration_seconds,
            });
        }
    }

    for key in file_order {
        let Some(file) = by_key.remove(&key) else {
            continue;
        };
        // Keeps the file's numbering so the entry sorts among the declared ones.
        let title = file_stem(&file.path).trim().to_string();
        debug!("Adopting undeclared track {}", file.path.display());
        declared.push(DeclaredTrack::new(title.clone()));
        resolved.push(ResolvedTrack {
            title,
            path: file.path,
            duration_seconds: file.duration_seconds,
        });
    }

    sort_by_leading_number(&mut declared, |track| track.title.as_str());
    sort_by_leading_number(&mut resolved, |track| track.title.as_str());

    Reconciled { declared, resolved }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::{AudioProbe, MetadataError};

    fn file(name: &str, duration_seconds: f64) -> ProbedFile {
        ProbedFile {
            path: PathBuf::from("/music/Album").join(name),
            duration_seconds,
        }
    }

    fn titles(resolved: &[ResolvedTrack]) -> Vec<&str> {
        resolved.iter().map(|track| track.title.as_str()).collect()
    }

    #[test]
    fn resolved_order_is_numeric() {
        let declared = vec![
            DeclaredTrack::new("10. Outro"),
            DeclaredTrack::new("2. Intro"),
            DeclaredTrack::new("1. Hello"),
        ];
        let files = vec![
            file("Outro.mp3", 1.0),
            file("Intro.mp3", 2.0),
            file("Hello.mp3", 3.0),
        ];
        let result = match_tracks(declared, files);
        assert_eq!(
            titles(&result.resolved),
            vec!["1. Hello", "2. Intro", "10. Outro"]
        );
        assert_eq!(result.declared[0].title, "1. Hello");
        assert_eq!(result.resolved[2].duration_seconds, 1.0);
    }

    #[test]
    fn unmatched_entries_stay_declared() {
        let declared = vec![
            DeclaredTrack {
                title: "1. Hello".to_string(),
                rating: 9,
            },
            DeclaredTrack {
                title: "2. Missing".to_string(),
                rating: 2,
            },
        ];
        let result = match_tracks(declared, vec![file("01 Hello.flac", 0.0)]);
        assert_eq!(titles(&result.resolved), vec!["1. Hello"]);
        assert_eq!(result.declared.len(), 2);
        assert_eq!(result.declared[1].title, "2. Missing");
        assert_eq!(result.declared[1].rating, 2);
    }

    #[test]
    fn cleaned_title_is_trimmed() {
        let result = match_tracks(
            vec![DeclaredTrack::new("  Hello  ")],
            vec![file("01 Hello.mp3", 0.0)],
        );
        assert_eq!(titles(&result.resolved), vec!["Hello"]);
    }

    #[test]
    fn duplicate_titles_resolve_once() {
        let declared = vec![DeclaredTrack::new("1. Song"), DeclaredTrack::new("2. Song")];
        let files = vec![file("01 Song.mp3", 1.0), file("02 Song.mp3", 2.0)];
        let result = match_tracks(declared, files);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.resolved[0].path, PathBuf::from("/music/Album/01 Song.mp3"));
        assert_eq!(result.declared.len(), 2);
    }

    #[test]
    fn undeclared_files_are_adopted() {
        let declared = vec![DeclaredTrack::new("1. Hello")];
        let files = vec![file("01 Hello.mp3", 1.0), file("02 - Bonus.mp3", 2.0)];
        let result = match_tracks(declared, files);
        assert_eq!(titles(&result.resolved), vec!["1. Hello", "02 - Bonus"]);
        assert_eq!(result.declared[1], DeclaredTrack::new("02 - Bonus"));
    }

    #[test]
    fn adopted_tracks_sort_by_their_file_number() {
        let declared = vec![DeclaredTrack::new("1. Intro"), DeclaredTrack::new("4. Finale")];
        let files = vec![
            file("01 Intro.mp3", 1.0),
            file("03 Middle.mp3", 2.0),
            file("04 Finale.mp3", 3.0),
        ];
        let result = match_tracks(declared, files);
        assert_eq!(
            titles(&result.resolved),
            vec!["1. Intro", "03 Middle", "4. Finale"]
        );
        assert_eq!(result.declared[1].title, "03 Middle");
    }

    struct FailingProbe;

    impl MediaProbe for FailingProbe {
        fn probe_audio(&self, _path: &Path) -> Result<AudioProbe, MetadataError> {
            Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no tags",
            )))
        }

        fn dominant_color(&self, _path: &Path) -> Result<[u8; 3], MetadataError> {
            Err(MetadataError::EmptyImage)
        }
    }

    #[tokio::test]
    async fn probe_failures_default_to_zero_and_missing_files_drop() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("01 Hello.mp3");
        std::fs::write(&present, b"not really audio").unwrap();
        let gone = dir.path().join("02 World.mp3");

        let result = reconcile(
            vec![DeclaredTrack::new("Hello"), DeclaredTrack::new("World")],
            &[present.clone(), gone],
            Arc::new(FailingProbe),
        )
        .await;

        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.resolved[0].path, present);
        assert_eq!(result.resolved[0].duration_seconds, 0.0);
        assert_eq!(result.declared.len(), 2);
    }
}
