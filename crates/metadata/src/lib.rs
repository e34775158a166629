use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError};
use lofty::error::LoftyError;
use lofty::prelude::AudioFile;

const SAMPLE_EDGE: u32 = 64;
const BUCKET_BITS: u8 = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AudioProbe {
    pub duration_secs: f64,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
    Image(ImageError),
    EmptyImage,
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
            MetadataError::Image(err) => write!(f, "image error: {}", err),
            MetadataError::EmptyImage => write!(f, "image has no pixels"),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

impl From<ImageError> for MetadataError {
    fn from(err: ImageError) -> Self {
        MetadataError::Image(err)
    }
}

/// Reads stream properties from an audio file. Blocking.
pub fn probe_audio(path: &Path) -> Result<AudioProbe, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let duration = tagged_file.properties().duration();
    Ok(AudioProbe {
        duration_secs: duration.as_secs_f64(),
    })
}

/// Decodes an image and returns its most common colour. Blocking.
pub fn dominant_color(path: &Path) -> Result<[u8; 3], MetadataError> {
    let img = image::open(path)?;
    dominant_rgb(&img).ok_or(MetadataError::EmptyImage)
}

/// Most populated colour bucket of a downsampled copy, averaged within the bucket.
pub fn dominant_rgb(img: &DynamicImage) -> Option<[u8; 3]> {
    let small = img.resize(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Nearest);
    let rgb = small.to_rgb8();

    let levels = 1usize << BUCKET_BITS;
    let mut buckets = vec![Bucket::default(); levels * levels * levels];
    let shift = 8 - BUCKET_BITS;
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let index = ((usize::from(r >> shift) * levels) + usize::from(g >> shift)) * levels
            + usize::from(b >> shift);
        let bucket = &mut buckets[index];
        bucket.count += 1;
        bucket.sum[0] += u64::from(r);
        bucket.sum[1] += u64::from(g);
        bucket.sum[2] += u64::from(b);
    }

    let mut best: Option<&Bucket> = None;
    for bucket in &buckets {
        if bucket.count == 0 {
            continue;
        }
        if best.map(|current| bucket.count > current.count).unwrap_or(true) {
            best = Some(bucket);
        }
    }

    best.map(|bucket| {
        [
            (bucket.sum[0] / bucket.count) as u8,
            (bucket.sum[1] / bucket.count) as u8,
            (bucket.sum[2] / bucket.count) as u8,
        ]
    })
}

#[derive(Clone, Copy, Default)]
struct Bucket {
    count: u64,
    sum: [u64; 3],
}
