use std::path::Path;

use common::{
    strip_track_number, AlbumDescription, DeclaredTrack, Favourite, SidecarRecord, DEFAULT_RATING,
    MAX_RATING,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::artwork::normalize_hex_color;
use crate::scan::AlbumFolder;
use crate::LibraryError;

const PLACEHOLDER_VALUES: &[&str] = &["unknown", "n/a", "0000"];
const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";

/// A sidecar record plus the bytes it was read from, if any.
#[derive(Debug)]
pub struct LoadedSidecar {
    pub record: SidecarRecord,
    pub raw: Option<Vec<u8>>,
}

/// Reads the folder's sidecar, or derives a fresh record when it is missing
/// or malformed. Only an unreadable (not absent) file is an error.
pub async fn load_or_create(
    folder: &AlbumFolder,
    sidecar_path: &Path,
) -> Result<LoadedSidecar, LibraryError> {
    let defaults = default_record(folder).await;
    let raw = match tokio::fs::read(sidecar_path).await {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(err.into()),
    };

    let record = match raw.as_deref() {
        Some(bytes) => match parse_record(bytes, &defaults) {
            Some(record) => record,
            None => {
                warn!(
                    "Malformed sidecar {}; rebuilding it from defaults",
                    sidecar_path.display()
                );
                defaults
            }
        },
        None => {
            debug!("Creating sidecar {}", sidecar_path.display());
            defaults
        }
    };

    Ok(LoadedSidecar { record, raw })
}

/// Record inferred from the folder layout and its `.txt` companions.
pub async fn default_record(folder: &AlbumFolder) -> SidecarRecord {
    let name = folder
        .path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
    let author = folder
        .path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let mut description = AlbumDescription::named(&name, &author);
    if let Some(author) = read_override(folder, "author.txt").await {
        description.author = author;
    }
    if let Some(genre) = read_override(folder, "genre.txt").await {
        description.genre = genre;
    }
    if let Some(year) = read_override(folder, "year.txt").await {
        description.year = year;
    }
    if let Some(color) = read_override(folder, "color.txt").await {
        description.color = normalize_hex_color(&color);
    }

    let track_list = folder
        .audio_files
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            DeclaredTrack::new(strip_track_number(&stem))
        })
        .collect();

    SidecarRecord {
        track_list,
        description,
    }
}

async fn read_override(folder: &AlbumFolder, file_name: &str) -> Option<String> {
    let path = folder.text_files.iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().eq_ignore_ascii_case(file_name))
            .unwrap_or(false)
    })?;
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) => {
            debug!("Ignoring unreadable {}: {}", path.display(), err);
            return None;
        }
    };
    let value = contents.trim();
    if value.is_empty() || is_placeholder(value) {
        return None;
    }
    Some(value.to_string())
}

pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    PLACEHOLDER_VALUES
        .iter()
        .any(|placeholder| value.eq_ignore_ascii_case(placeholder))
}

/// Validates a sidecar against the expected shape, filling gaps from
/// `defaults`. Returns `None` when the document is not JSON or its top level,
/// `trackList` or `description` has the wrong type.
pub fn parse_record(bytes: &[u8], defaults: &SidecarRecord) -> Option<SidecarRecord> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let object = value.as_object()?;

    let track_list = match object.get("trackList") {
        None | Some(Value::Null) => defaults.track_list.clone(),
        Some(Value::Array(items)) => items.iter().filter_map(coerce_track).collect(),
        Some(_) => return None,
    };
    let description = match object.get("description") {
        None | Some(Value::Null) => defaults.description.clone(),
        Some(Value::Object(fields)) => coerce_description(fields, &defaults.description),
        Some(_) => return None,
    };

    Some(SidecarRecord {
        track_list,
        description,
    })
}

fn coerce_track(value: &Value) -> Option<DeclaredTrack> {
    match value {
        Value::String(title) => Some(DeclaredTrack::new(title.clone())),
        Value::Object(fields) => {
            let title = fields.get("title")?.as_str()?.to_string();
            let rating = fields
                .get("rating")
                .and_then(coerce_rating)
                .unwrap_or(DEFAULT_RATING);
            Some(DeclaredTrack { title, rating })
        }
        other => {
            debug!("Dropping malformed track entry {}", other);
            None
        }
    }
}

fn coerce_description(fields: &Map<String, Value>, defaults: &AlbumDescription) -> AlbumDescription {
    let text = |key: &str, fallback: &String| -> String {
        match fields.get(key) {
            Some(Value::String(value)) => value.clone(),
            Some(Value::Number(value)) => value.to_string(),
            _ => fallback.clone(),
        }
    };

    let color = match fields.get("color") {
        Some(Value::String(value)) => normalize_hex_color(value),
        Some(Value::Null) => None,
        _ => defaults.color.clone(),
    };
    let cover = match fields.get("cover") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        _ => None,
    };
    let favourite = match fields.get("favourite") {
        Some(Value::Bool(false)) => Favourite::No,
        Some(Value::Bool(true)) => Favourite::Since(0),
        Some(Value::Number(value)) => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .map(Favourite::Since)
            .unwrap_or(defaults.favourite),
        _ => defaults.favourite,
    };

    AlbumDescription {
        name: text("name", &defaults.name),
        author: text("author", &defaults.author),
        label: text("label", &defaults.label),
        description: text("description", &defaults.description),
        year: text("year", &defaults.year),
        genre: text("genre", &defaults.genre),
        color,
        rating: fields
            .get("rating")
            .and_then(coerce_rating)
            .unwrap_or(defaults.rating),
        cover,
        copyright_free: fields
            .get("copyrightFree")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.copyright_free),
        favourite,
    }
}

fn coerce_rating(value: &Value) -> Option<u8> {
    let rating = value.as_f64()?;
    if !rating.is_finite() {
        return None;
    }
    Some(rating.round().clamp(0.0, f64::from(MAX_RATING)) as u8)
}

pub fn encode_record(record: &SidecarRecord) -> Result<Vec<u8>, LibraryError> {
    Ok(serde_json::to_vec_pretty(record)?)
}

/// Writes `record` unless the file already holds exactly these bytes.
/// Returns whether a write happened; failures are logged, never raised.
pub async fn persist(path: &Path, record: &SidecarRecord, previous: Option<&[u8]>) -> bool {
    let bytes = match encode_record(record) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Failed to encode sidecar {}: {}", path.display(), err);
            return false;
        }
    };
    if previous == Some(bytes.as_slice()) {
        return false;
    }
    match tokio::fs::write(path, &bytes).await {
        Ok(()) => {
            debug!("Wrote sidecar {}", path.display());
            true
        }
        Err(err) => {
            warn!("Failed to write sidecar {}: {}", path.display(), err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn folder_at(path: PathBuf, audio: &[&str], texts: &[&str]) -> AlbumFolder {
        AlbumFolder {
            audio_files: audio.iter().map(|name| path.join(name)).collect(),
            image_files: Vec::new(),
            text_files: texts.iter().map(|name| path.join(name)).collect(),
            path,
        }
    }

    #[tokio::test]
    async fn defaults_come_from_folder_names_and_text_files() {
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Some Artist").join("First Light");
        fs::create_dir_all(&album_dir).unwrap();
        fs::write(album_dir.join("Genre.txt"), "Ambient\n").unwrap();
        fs::write(album_dir.join("Year.txt"), "0000").unwrap();
        fs::write(album_dir.join("Author.txt"), "N/A").unwrap();
        fs::write(album_dir.join("color.txt"), "1a2b3c").unwrap();

        let folder = folder_at(
            album_dir,
            &["01 Hello.mp3", "02. World.flac"],
            &["Genre.txt", "Year.txt", "Author.txt", "color.txt"],
        );
        let record = default_record(&folder).await;

        assert_eq!(record.description.name, "First Light");
        assert_eq!(record.description.author, "Some Artist");
        assert_eq!(record.description.genre, "Ambient");
        assert_eq!(record.description.year, "");
        assert_eq!(record.description.color.as_deref(), Some("#1A2B3C"));
        assert_eq!(
            record.track_list,
            vec![DeclaredTrack::new("Hello"), DeclaredTrack::new("World")]
        );
        assert!(record.track_list.iter().all(|t| t.rating == 5));
    }

    #[test]
    fn placeholders_are_case_insensitive() {
        assert!(is_placeholder("Unknown"));
        assert!(is_placeholder(" n/A "));
        assert!(is_placeholder("0000"));
        assert!(!is_placeholder("1999"));
    }

    #[test]
    fn partial_documents_are_filled_from_defaults() {
        let mut defaults = SidecarRecord {
            track_list: vec![DeclaredTrack::new("Hello")],
            description: AlbumDescription::named("Album", "Artist"),
        };
        defaults.description.genre = "Jazz".to_string();

        let json = br#"{
            "trackList": [
                {"title": "2. Intro", "rating": 12},
                "1. Plain",
                {"rating": 3},
                42
            ],
            "description": {"name": "Renamed", "year": 1999, "rating": "bad", "favourite": 1700000000}
        }"#;
        let record = parse_record(json, &defaults).unwrap();

        assert_eq!(
            record.track_list,
            vec![
                DeclaredTrack {
                    title: "2. Intro".to_string(),
                    rating: 10
                },
                DeclaredTrack::new("1. Plain"),
            ]
        );
        assert_eq!(record.description.name, "Renamed");
        assert_eq!(record.description.author, "Artist");
        assert_eq!(record.description.genre, "Jazz");
        assert_eq!(record.description.year, "1999");
        assert_eq!(record.description.rating, 5);
        assert_eq!(record.description.favourite, Favourite::Since(1_700_000_000));
    }

    #[test]
    fn wrong_shapes_are_treated_as_absent() {
        let defaults = SidecarRecord {
            track_list: Vec::new(),
            description: AlbumDescription::named("Album", "Artist"),
        };
        assert!(parse_record(b"{ not json", &defaults).is_none());
        assert!(parse_record(b"[1, 2]", &defaults).is_none());
        assert!(parse_record(br#"{"trackList": "oops"}"#, &defaults).is_none());
        assert!(parse_record(br#"{"description": []}"#, &defaults).is_none());
        assert!(parse_record(b"{}", &defaults).is_some());
    }

    #[tokio::test]
    async fn persist_skips_identical_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("album.json");
        let record = SidecarRecord {
            track_list: vec![DeclaredTrack::new("Hello")],
            description: AlbumDescription::named("Album", "Artist"),
        };

        assert!(persist(&path, &record, None).await);
        let written = fs::read(&path).unwrap();
        assert!(!persist(&path, &record, Some(&written)).await);

        let text = String::from_utf8(written).unwrap();
        assert!(text.contains("\"trackList\""));
        assert!(text.contains("\"copyrightFree\": false"));
        assert!(text.contains("\"favourite\": false"));
    }

    #[tokio::test]
    async fn write_failures_are_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("album.json");
        let record = SidecarRecord {
            track_list: Vec::new(),
            description: AlbumDescription::named("Album", "Artist"),
        };
        assert!(!persist(&path, &record, None).await);
    }

    #[tokio::test]
    async fn malformed_sidecar_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist").join("Album");
        fs::create_dir_all(&album_dir).unwrap();
        let sidecar = album_dir.join("album.json");
        fs::write(&sidecar, b"{\"trackList\": [").unwrap();

        let folder = folder_at(album_dir, &["01 Hello.mp3"], &[]);
        let loaded = load_or_create(&folder, &sidecar).await.unwrap();
        assert_eq!(loaded.record.track_list, vec![DeclaredTrack::new("Hello")]);
        assert!(loaded.raw.is_some());
    }
}
