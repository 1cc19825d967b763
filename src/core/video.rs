use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hasher::{hamming_distance, PerceptualHasher, MAX_DISTANCE};

/// Any video with extractable content yields at least this many samples.
pub const MIN_SAMPLE_FRAMES: usize = 2;
/// Sampling cap so long videos stay cheap to fingerprint.
pub const MAX_SAMPLE_FRAMES: usize = 10;
// One additional sample per 30 seconds of footage between the two bounds.
const SECONDS_PER_SAMPLE: f64 = 30.0;

// Mean-Hamming-distance verdict thresholds, inclusive.
const IDENTICAL_MAX: f64 = 2.0;
const NEAR_DUPLICATE_MAX: f64 = 10.0;
const SIMILAR_MAX: f64 = 20.0;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("failed to decode video frames: {message}")]
    Decode { message: String },
}

/// Frame decoding is supplied by the caller; the engine never touches codecs.
pub trait FrameSampler {
    /// Decode up to `count` grayscale frames spaced evenly across the video.
    ///
    /// Returning fewer frames than requested is fine (individual unreadable
    /// frames should be dropped, not reported); an error means the media is
    /// unreadable as a whole.
    fn sample(&self, count: usize) -> anyhow::Result<Vec<GrayImage>>;
}

/// Ordered per-frame dHashes plus geometry, recorded once per video.
/// A signature with zero frame hashes is valid but degenerate; comparisons
/// against it report [`SignatureVerdict::InsufficientData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSignature {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub frame_hashes: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureVerdict {
    Identical,
    NearDuplicate,
    Similar,
    Different,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoComparison {
    /// Mean Hamming distance over compared sample positions; the maximum
    /// possible distance (64) when there was nothing to compare.
    pub distance: f64,
    pub verdict: SignatureVerdict,
}

/// Samples frames from a video and reduces them to a comparable signature.
pub struct VideoFingerprinter {
    hasher: PerceptualHasher,
}

impl VideoFingerprinter {
    pub fn new() -> Self {
        Self {
            hasher: PerceptualHasher::dhash_only(),
        }
    }

    /// How many frames to request for a video of the given duration.
    pub fn frame_count_for(duration_secs: f64) -> usize {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return MIN_SAMPLE_FRAMES;
        }
        ((duration_secs / SECONDS_PER_SAMPLE).ceil() as usize)
            .clamp(MIN_SAMPLE_FRAMES, MAX_SAMPLE_FRAMES)
    }

    /// Fingerprint a video through the caller's sampler.
    ///
    /// Frames that fail to hash are skipped; `Ok(None)` means no frame
    /// survived. A sampler error propagates as [`VideoError::Decode`].
    pub fn fingerprint<S: FrameSampler + ?Sized>(
        &self,
        duration_secs: f64,
        width: u32,
        height: u32,
        sampler: &S,
    ) -> Result<Option<VideoSignature>, VideoError> {
        let requested = Self::frame_count_for(duration_secs);
        let frames = sampler
            .sample(requested)
            .map_err(|e| VideoError::Decode {
                message: e.to_string(),
            })?;

        let mut frame_hashes = Vec::with_capacity(frames.len());
        for (position, frame) in frames.iter().enumerate() {
            match self.hasher.dhash(frame) {
                Ok(hash) => frame_hashes.push(hash),
                Err(e) => {
                    log::warn!("skipping unhashable frame at sample {position}: {e}");
                }
            }
        }

        if frame_hashes.is_empty() {
            log::warn!("no hashable frames out of {} sampled", frames.len());
            return Ok(None);
        }

        Ok(Some(VideoSignature {
            duration_secs,
            width,
            height,
            frame_hashes,
        }))
    }

    /// Compare two signatures position-by-position over the shorter one's
    /// sample range and classify the mean Hamming distance.
    pub fn compare(a: &VideoSignature, b: &VideoSignature) -> VideoComparison {
        if a.frame_hashes.is_empty() || b.frame_hashes.is_empty() {
            return VideoComparison {
                distance: f64::from(MAX_DISTANCE),
                verdict: SignatureVerdict::InsufficientData,
            };
        }

        let overlap = a.frame_hashes.len().min(b.frame_hashes.len());
        let total: u32 = a
            .frame_hashes
            .iter()
            .zip(&b.frame_hashes)
            .take(overlap)
            .map(|(&ha, &hb)| hamming_distance(ha, hb))
            .sum();
        let distance = f64::from(total) / overlap as f64;

        let verdict = if distance <= IDENTICAL_MAX {
            SignatureVerdict::Identical
        } else if distance <= NEAR_DUPLICATE_MAX {
            SignatureVerdict::NearDuplicate
        } else if distance <= SIMILAR_MAX {
            SignatureVerdict::Similar
        } else {
            SignatureVerdict::Different
        };

        VideoComparison { distance, verdict }
    }
}

impl Default for VideoFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}
