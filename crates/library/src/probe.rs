use std::path::Path;

use metadata::{AudioProbe, MetadataError};

/// Blocking media inspection used by the indexer. Calls are always made from
/// `spawn_blocking`.
pub trait MediaProbe: Send + Sync + 'static {
    fn probe_audio(&self, path: &Path) -> Result<AudioProbe, MetadataError>;

    fn dominant_color(&self, path: &Path) -> Result<[u8; 3], MetadataError>;
}

/// Reads tags with lofty and decodes artwork with image.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalProbe;

impl MediaProbe for LocalProbe {
    fn probe_audio(&self, path: &Path) -> Result<AudioProbe, MetadataError> {
        metadata::probe_audio(path)
    }

    fn dominant_color(&self, path: &Path) -> Result<[u8; 3], MetadataError> {
        metadata::dominant_color(path)
    }
}
