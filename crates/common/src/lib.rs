use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_RATING: u8 = 5;
pub const MAX_RATING: u8 = 10;

/// One library entry: a folder that directly contains audio files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub path: PathBuf,
    pub name: String,
    pub description: AlbumDescription,
    pub declared_tracks: Vec<DeclaredTrack>,
    pub resolved_tracks: Vec<ResolvedTrack>,
    pub sidecar_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDescription {
    pub name: String,
    pub author: String,
    pub label: String,
    pub description: String,
    pub year: String,
    pub genre: String,
    pub color: Option<String>,
    pub rating: u8,
    pub cover: Option<String>,
    pub copyright_free: bool,
    pub favourite: Favourite,
}

impl AlbumDescription {
    pub fn named(name: &str, author: &str) -> Self {
        Self {
            name: name.to_string(),
            author: author.to_string(),
            label: String::new(),
            description: String::new(),
            year: String::new(),
            genre: String::new(),
            color: None,
            rating: DEFAULT_RATING,
            cover: None,
            copyright_free: false,
            favourite: Favourite::No,
        }
    }
}

/// A track as authored in the sidecar file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTrack {
    pub title: String,
    pub rating: u8,
}

impl DeclaredTrack {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rating: DEFAULT_RATING,
        }
    }
}

/// A declared track matched to a playable file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTrack {
    pub title: String,
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Persisted shape of a sidecar file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    pub track_list: Vec<DeclaredTrack>,
    pub description: AlbumDescription,
}

/// `false` on disk, or the timestamp at which the album was marked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FavouriteRepr", into = "FavouriteRepr")]
pub enum Favourite {
    #[default]
    No,
    Since(u64),
}

impl Favourite {
    pub fn is_set(self) -> bool {
        matches!(self, Favourite::Since(_))
    }

    pub fn sort_key(self) -> Option<u64> {
        match self {
            Favourite::No => None,
            Favourite::Since(stamp) => Some(stamp),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum FavouriteRepr {
    Flag(bool),
    Stamp(u64),
}

impl From<FavouriteRepr> for Favourite {
    fn from(repr: FavouriteRepr) -> Self {
        match repr {
            FavouriteRepr::Flag(false) => Favourite::No,
            FavouriteRepr::Flag(true) => Favourite::Since(0),
            FavouriteRepr::Stamp(stamp) => Favourite::Since(stamp),
        }
    }
}

impl From<Favourite> for FavouriteRepr {
    fn from(value: Favourite) -> Self {
        match value {
            Favourite::No => FavouriteRepr::Flag(false),
            Favourite::Since(stamp) => FavouriteRepr::Stamp(stamp),
        }
    }
}

/// Integer at the start of `text`, ignoring leading whitespace.
pub fn leading_number(text: &str) -> Option<u64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    trimmed[..end].parse().ok()
}

/// Drops a leading track number and the separator after it: `"02 - Intro"` -> `"Intro"`.
pub fn strip_track_number(text: &str) -> String {
    let trimmed = text.trim();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == trimmed.len() {
        return trimmed.to_string();
    }
    let rest = rest
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '-' | '_' | ')' | ':'))
        .trim();
    if rest.is_empty() {
        trimmed.to_string()
    } else {
        rest.to_string()
    }
}

/// Matching key shared by declared titles and file names.
///
/// Rules, in order: trim, strip every leading digit, whitespace and ASCII
/// punctuation character, lowercase. A title made only of those characters
/// keys on its trimmed lowercase form instead of the empty string.
pub fn normalize_title(text: &str) -> String {
    let trimmed = text.trim();
    let stripped = trimmed
        .trim_start_matches(|c: char| {
            c.is_ascii_digit() || c.is_ascii_punctuation() || c.is_whitespace()
        })
        .trim();
    if stripped.is_empty() {
        trimmed.to_lowercase()
    } else {
        stripped.to_lowercase()
    }
}

/// Stable sort by leading number; items without one go last.
pub fn sort_by_leading_number<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by_key(|item| match leading_number(key(item)) {
        Some(number) => (false, number),
        None => (true, 0),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_number_reads_prefix_only() {
        assert_eq!(leading_number("02. Intro"), Some(2));
        assert_eq!(leading_number("  10 Outro"), Some(10));
        assert_eq!(leading_number("Intro 3"), None);
        assert_eq!(leading_number(""), None);
    }

    #[test]
    fn normalize_title_ignores_numbering_and_case() {
        assert_eq!(normalize_title("02. Intro"), "intro");
        assert_eq!(normalize_title("Intro"), "intro");
        assert_eq!(normalize_title("  01 - Hello World "), "hello world");
        assert_eq!(normalize_title("(3) Song"), "song");
        assert_eq!(normalize_title("1999"), "1999");
    }

    #[test]
    fn strip_track_number_keeps_titles_without_prefix() {
        assert_eq!(strip_track_number("01 Hello"), "Hello");
        assert_eq!(strip_track_number("02. World"), "World");
        assert_eq!(strip_track_number("03 - Outro"), "Outro");
        assert_eq!(strip_track_number("Hello"), "Hello");
        assert_eq!(strip_track_number("1999"), "1999");
    }

    #[test]
    fn sort_is_numeric_and_stable() {
        let mut titles = vec!["10. Outro", "Bonus", "2. Intro", "1. Hello", "Hidden"];
        sort_by_leading_number(&mut titles, |t| *t);
        assert_eq!(
            titles,
            vec!["1. Hello", "2. Intro", "10. Outro", "Bonus", "Hidden"]
        );
    }

    #[test]
    fn favourite_round_trips_flag_and_stamp() {
        let off: Favourite = serde_json::from_str("false").unwrap();
        let on: Favourite = serde_json::from_str("1700000000").unwrap();
        assert_eq!(off, Favourite::No);
        assert_eq!(on, Favourite::Since(1_700_000_000));
        assert_eq!(serde_json::to_string(&Favourite::No).unwrap(), "false");
        assert!(on.is_set());
        assert_eq!(on.sort_key(), Some(1_700_000_000));
    }
}
