use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::probe::MediaProbe;

pub const PLACEHOLDER_COLOR: &str = "#AAAAAA";
const BLANK_COLOR: &str = "#FFFFFF";

/// 90% of the brightest possible channel sum (3 * 255).
const MAX_CHANNEL_SUM: f64 = 765.0 * 0.9;

/// Keyword bonuses, checked in order; only the first present one counts. A
/// name that also contains "cover" scores `COVER_SCORE + second - bonus`.
const COVER_QUALIFIERS: &[(&str, i32, i32)] = &[
    ("front", 5, -3),
    ("back", 4, -4),
    ("album", 3, -2),
    ("folder", 2, -1),
];
const COVER_SCORE: i32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artwork {
    pub cover: Option<String>,
    pub color: String,
}

/// Chooses artwork for a folder and derives its colour.
///
/// The colour is decoded only when a cover was newly picked or the stored
/// colour is missing or a placeholder; otherwise the stored value is reused.
pub async fn resolve(
    images: &[PathBuf],
    existing_cover: Option<&str>,
    existing_color: Option<&str>,
    probe: Arc<dyn MediaProbe>,
) -> Artwork {
    let current = match existing_cover.map(str::trim).filter(|value| !value.is_empty()) {
        Some(cover) => {
            if tokio::fs::try_exists(cover).await.unwrap_or(false) {
                Some(cover.to_string())
            } else {
                info!("Cover {} is gone; selecting again", cover);
                None
            }
        }
        None => None,
    };

    let (cover, newly_found) = match current {
        Some(cover) => (Some(cover), false),
        None => {
            let picked = pick_cover(images).map(|path| path.to_string_lossy().into_owned());
            let newly_found = picked.is_some();
            (picked, newly_found)
        }
    };

    let cached = existing_color
        .and_then(normalize_hex_color)
        .filter(|color| !is_placeholder_color(color));
    if let Some(color) = cached {
        if !newly_found {
            return Artwork { cover, color };
        }
    }

    let color = match &cover {
        Some(path) => extract_color(PathBuf::from(path), probe).await,
        None => PLACEHOLDER_COLOR.to_string(),
    };
    Artwork { cover, color }
}

async fn extract_color(path: PathBuf, probe: Arc<dyn MediaProbe>) -> String {
    let decode_path = path.clone();
    match tokio::task::spawn_blocking(move || probe.dominant_color(&decode_path)).await {
        Ok(Ok(rgb)) => {
            let color = to_hex(clamp_brightness(rgb));
            debug!("Dominant colour of {} is {}", path.display(), color);
            color
        }
        Ok(Err(err)) => {
            warn!("Failed to extract colour from {}: {}", path.display(), err);
            PLACEHOLDER_COLOR.to_string()
        }
        Err(err) => {
            warn!("Colour task for {} failed: {}", path.display(), err);
            PLACEHOLDER_COLOR.to_string()
        }
    }
}

pub fn cover_score(file_name: &str) -> i32 {
    let name = file_name.to_lowercase();
    let has_cover = name.contains("cover");
    let qualifier = COVER_QUALIFIERS
        .iter()
        .find(|(keyword, _, _)| name.contains(*keyword));
    match qualifier {
        Some((_, bonus, with_cover)) if has_cover => COVER_SCORE + with_cover - bonus,
        Some((_, bonus, _)) => *bonus,
        None if has_cover => COVER_SCORE,
        None => 0,
    }
}

/// Highest scoring image; the earliest one wins a tie.
pub fn pick_cover(candidates: &[PathBuf]) -> Option<&PathBuf> {
    let mut best: Option<(&PathBuf, i32)> = None;
    for candidate in candidates {
        let score = cover_score(&file_name(candidate));
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(path, _)| path)
}

/// Scales all channels down uniformly so near-white colours stay readable
/// under light text.
pub fn clamp_brightness(rgb: [u8; 3]) -> [u8; 3] {
    let sum: u32 = rgb.iter().map(|channel| u32::from(*channel)).sum();
    if f64::from(sum) <= MAX_CHANNEL_SUM {
        return rgb;
    }
    let scale = MAX_CHANNEL_SUM / f64::from(sum);
    rgb.map(|channel| (f64::from(channel) * scale).floor() as u8)
}

pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

/// Accepts `RRGGBB` with or without `#`, in any case.
pub fn normalize_hex_color(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", digits.to_ascii_uppercase()))
}

pub fn is_placeholder_color(color: &str) -> bool {
    color.eq_ignore_ascii_case(PLACEHOLDER_COLOR) || color.eq_ignore_ascii_case(BLANK_COLOR)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
