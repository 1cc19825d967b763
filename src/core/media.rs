use chrono::{DateTime, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::core::hasher::Fingerprint;

/// Pre-extracted capture metadata for a scanned item.
///
/// EXIF/container decoding happens in an external collaborator; the engine
/// only reads these fields when scoring metadata proximity and picking a
/// keeper. Every field is optional because real collections are messy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub captured_at: Option<DateTime<Utc>>,
    pub camera: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: Option<u64>,
    /// Lowercase hex SHA-256 of the original file, if the caller computed one.
    pub checksum: Option<String>,
    /// Playable duration for videos; `None` for stills.
    pub duration_secs: Option<f64>,
}

impl ItemMetadata {
    pub fn pixel_area(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
            _ => None,
        }
    }
}

/// A decoded item ready for the hashing pipeline.
#[derive(Debug, Clone)]
pub struct DecodedItem {
    pub item_id: String,
    pub image: GrayImage,
    pub metadata: ItemMetadata,
}

/// An item after the hashing pass. `fingerprints` is empty when hashing
/// failed and the item was degraded rather than dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashedItem {
    pub item_id: String,
    pub fingerprints: Vec<Fingerprint>,
    pub metadata: ItemMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_area_requires_both_dimensions() {
        let mut meta = ItemMetadata::default();
        assert_eq!(meta.pixel_area(), None);

        meta.width = Some(4000);
        assert_eq!(meta.pixel_area(), None);

        meta.height = Some(3000);
        assert_eq!(meta.pixel_area(), Some(12_000_000));
    }
}
