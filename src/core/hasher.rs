use std::f64::consts::PI;
use std::fmt;

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;

/// Smallest width or height accepted for hashing. Below this the resize to
/// the comparison grid is dominated by interpolation artifacts and the
/// resulting hashes stop discriminating.
pub const MIN_HASH_DIMENSION: u32 = 16;

/// Maximum Hamming distance between two 64-bit fingerprints.
pub const MAX_DISTANCE: u32 = 64;

// dHash samples a 9x8 grid: 8 adjacent-pixel comparisons per row, 8 rows.
const DHASH_GRID_WIDTH: u32 = 9;
const DHASH_GRID_HEIGHT: u32 = 8;

// pHash reduces a 32x32 downsample to the top-left 8x8 DCT block.
const PHASH_INPUT_SIZE: u32 = 32;
const PHASH_BLOCK_SIZE: usize = 8;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("image {width}x{height} px is below the minimum hashable size")]
    ImageTooSmall { width: u32, height: u32 },

    #[error("image has no pixel data")]
    EmptyImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    DHash,
    PHash,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 2] = [HashAlgorithm::DHash, HashAlgorithm::PHash];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::DHash => "dhash",
            HashAlgorithm::PHash => "phash",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width perceptual summary of an image or frame, algorithm-tagged.
/// Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algorithm: HashAlgorithm,
    pub hash: u64,
    pub width: u32,
    pub height: u32,
}

/// Count of differing bits between two 64-bit hashes. Symmetric, zero for
/// equal inputs, at most [`MAX_DISTANCE`].
#[inline]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Service turning decoded grayscale buffers into perceptual fingerprints.
pub struct PerceptualHasher {
    enable_dhash: bool,
    enable_phash: bool,
}

impl PerceptualHasher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enable_dhash: config.enable_dhash,
            enable_phash: config.enable_phash,
        }
    }

    /// Hasher used for video frames: dHash only, regardless of image config.
    pub fn dhash_only() -> Self {
        Self {
            enable_dhash: true,
            enable_phash: false,
        }
    }

    /// Compute one fingerprint per enabled algorithm.
    ///
    /// When pHash is enabled alongside dHash the result carries both, so
    /// callers can cross-validate matches across algorithms.
    pub fn hash(&self, image: &GrayImage) -> Result<Vec<Fingerprint>, HashError> {
        let (width, height) = image.dimensions();
        self.check_dimensions(image)?;

        let mut fingerprints = Vec::with_capacity(2);
        if self.enable_dhash {
            fingerprints.push(Fingerprint {
                algorithm: HashAlgorithm::DHash,
                hash: self.dhash(image)?,
                width,
                height,
            });
        }
        if self.enable_phash {
            fingerprints.push(Fingerprint {
                algorithm: HashAlgorithm::PHash,
                hash: self.phash(image)?,
                width,
                height,
            });
        }
        Ok(fingerprints)
    }

    /// Difference hash: 9x8 grid, bit i set iff the left pixel of comparison
    /// i is strictly greater than the right pixel, row-major, MSB first.
    pub fn dhash(&self, image: &GrayImage) -> Result<u64, HashError> {
        self.check_dimensions(image)?;

        let grid = imageops::resize(
            image,
            DHASH_GRID_WIDTH,
            DHASH_GRID_HEIGHT,
            FilterType::Triangle,
        );

        let mut hash = 0u64;
        for y in 0..DHASH_GRID_HEIGHT {
            for x in 0..DHASH_GRID_WIDTH - 1 {
                let left = grid.get_pixel(x, y)[0];
                let right = grid.get_pixel(x + 1, y)[0];
                hash <<= 1;
                if left > right {
                    hash |= 1;
                }
            }
        }
        Ok(hash)
    }

    /// Perceptual hash: 32x32 downsample, 2-D DCT-II, top-left 8x8
    /// low-frequency block, bit set iff the coefficient exceeds the block
    /// mean. The DC coefficient is excluded from the mean so overall
    /// brightness does not skew the threshold.
    pub fn phash(&self, image: &GrayImage) -> Result<u64, HashError> {
        self.check_dimensions(image)?;

        let small = imageops::resize(
            image,
            PHASH_INPUT_SIZE,
            PHASH_INPUT_SIZE,
            FilterType::Triangle,
        );

        const N: usize = PHASH_INPUT_SIZE as usize;
        let mut pixels = [[0f64; N]; N];
        for y in 0..N {
            for x in 0..N {
                pixels[y][x] = f64::from(small.get_pixel(x as u32, y as u32)[0]);
            }
        }

        let coeffs = dct_2d(&pixels);

        let mut sum = 0.0;
        for v in 0..PHASH_BLOCK_SIZE {
            for u in 0..PHASH_BLOCK_SIZE {
                if v == 0 && u == 0 {
                    continue;
                }
                sum += coeffs[v][u];
            }
        }
        let mean = sum / (PHASH_BLOCK_SIZE * PHASH_BLOCK_SIZE - 1) as f64;

        let mut hash = 0u64;
        for v in 0..PHASH_BLOCK_SIZE {
            for u in 0..PHASH_BLOCK_SIZE {
                hash <<= 1;
                if coeffs[v][u] > mean {
                    hash |= 1;
                }
            }
        }
        Ok(hash)
    }

    fn check_dimensions(&self, image: &GrayImage) -> Result<(), HashError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(HashError::EmptyImage);
        }
        if width < MIN_HASH_DIMENSION || height < MIN_HASH_DIMENSION {
            return Err(HashError::ImageTooSmall { width, height });
        }
        Ok(())
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

// Separable unnormalized DCT-II; only the ordering of coefficients against
// the block mean matters, so scaling factors are dropped.
fn dct_2d<const N: usize>(input: &[[f64; N]; N]) -> [[f64; N]; N] {
    let mut rows = [[0f64; N]; N];
    for y in 0..N {
        dct_1d(&input[y], &mut rows[y]);
    }

    let mut output = [[0f64; N]; N];
    let mut column = [0f64; N];
    let mut transformed = [0f64; N];
    for x in 0..N {
        for y in 0..N {
            column[y] = rows[y][x];
        }
        dct_1d(&column, &mut transformed);
        for y in 0..N {
            output[y][x] = transformed[y];
        }
    }
    output
}

fn dct_1d<const N: usize>(input: &[f64; N], output: &mut [f64; N]) {
    for k in 0..N {
        let mut sum = 0.0;
        for (n, &value) in input.iter().enumerate() {
            sum += value * (PI / N as f64 * (n as f64 + 0.5) * k as f64).cos();
        }
        output[k] = sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn gray_image<F: Fn(u32, u32) -> u8>(width: u32, height: u32, f: F) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)]))
    }

    #[test]
    fn hamming_distance_identities() {
        for hash in [0u64, 1, 0xDEAD_BEEF, u64::MAX] {
            assert_eq!(hamming_distance(hash, hash), 0);
        }
        assert_eq!(hamming_distance(0xFFFF, 0), 16);
        assert_eq!(hamming_distance(0b1010, 0b0101), 4);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
        assert_eq!(
            hamming_distance(0x1234, 0xABCD),
            hamming_distance(0xABCD, 0x1234)
        );
    }

    #[test]
    fn dhash_of_monotone_gradients() {
        let hasher = PerceptualHasher::dhash_only();

        // Strictly increasing columns: left is never greater than right.
        let rising = gray_image(90, 80, |x, _| (20 + x * 2) as u8);
        assert_eq!(hasher.dhash(&rising).unwrap(), 0);

        // Strictly decreasing columns: every comparison fires.
        let falling = gray_image(90, 80, |x, _| (200 - x * 2) as u8);
        assert_eq!(hasher.dhash(&falling).unwrap(), u64::MAX);
    }

    #[test]
    fn single_pixel_change_moves_hash_slightly() {
        let hasher = PerceptualHasher::dhash_only();

        // 18x16 maps each 9x8 grid cell onto an exact 2x2 pixel block.
        let flat = gray_image(18, 16, |_, _| 100);
        let perturbed = gray_image(18, 16, |x, y| if x == 8 && y == 7 { 255 } else { 100 });

        let a = hasher.dhash(&flat).unwrap();
        let b = hasher.dhash(&perturbed).unwrap();
        assert_ne!(a, b);
        assert!(hamming_distance(a, b) <= 4, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn rejects_images_below_dimension_floor() {
        let hasher = PerceptualHasher::default();
        let tiny = gray_image(8, 8, |x, y| (x * y) as u8);
        assert!(matches!(
            hasher.hash(&tiny),
            Err(HashError::ImageTooSmall { width: 8, height: 8 })
        ));

        let narrow = gray_image(400, 10, |x, _| x as u8);
        assert!(matches!(
            hasher.hash(&narrow),
            Err(HashError::ImageTooSmall { .. })
        ));
    }

    #[test]
    fn hash_respects_algorithm_toggles() {
        let image = gray_image(64, 64, |x, y| ((x * 3 + y * 5) % 200) as u8);

        let default_hasher = PerceptualHasher::default();
        let prints = default_hasher.hash(&image).unwrap();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].algorithm, HashAlgorithm::DHash);
        assert_eq!((prints[0].width, prints[0].height), (64, 64));

        let both = PerceptualHasher::new(&EngineConfig {
            enable_phash: true,
            ..EngineConfig::default()
        });
        let prints = both.hash(&image).unwrap();
        assert_eq!(prints.len(), 2);
        assert_eq!(prints[0].algorithm, HashAlgorithm::DHash);
        assert_eq!(prints[1].algorithm, HashAlgorithm::PHash);
    }

    #[test]
    fn phash_ignores_uniform_brightness_shift() {
        let hasher = PerceptualHasher::new(&EngineConfig {
            enable_phash: true,
            ..EngineConfig::default()
        });

        let base = gray_image(128, 128, |x, y| (40 + (x * 3 + y * 5) % 150) as u8);
        let brighter = gray_image(128, 128, |x, y| (70 + (x * 3 + y * 5) % 150) as u8);

        let a = hasher.phash(&base).unwrap();
        let b = hasher.phash(&brighter).unwrap();
        assert!(hamming_distance(a, b) <= 2, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn phash_separates_distinct_content() {
        let hasher = PerceptualHasher::new(&EngineConfig {
            enable_phash: true,
            ..EngineConfig::default()
        });

        // Inverting brightness negates every AC coefficient, so most of the
        // sign pattern must flip.
        let ramp = gray_image(128, 128, |x, y| (x + y) as u8);
        let inverted = gray_image(128, 128, |x, y| (254 - (x + y)) as u8);

        let a = hasher.phash(&ramp).unwrap();
        let b = hasher.phash(&inverted).unwrap();
        assert!(hamming_distance(a, b) > 20, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn phash_is_stable_across_rescaling() {
        let hasher = PerceptualHasher::new(&EngineConfig {
            enable_phash: true,
            ..EngineConfig::default()
        });

        let large = gray_image(256, 256, |x, y| ((x + y) / 2) as u8);
        let small = imageops::resize(&large, 96, 96, FilterType::Triangle);

        let a = hasher.phash(&large).unwrap();
        let b = hasher.phash(&small).unwrap();
        assert!(hamming_distance(a, b) <= 4, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn dhash_is_stable_across_rescaling() {
        let hasher = PerceptualHasher::dhash_only();

        let large = gray_image(320, 240, |x, y| ((x / 4 + y / 4) % 200) as u8);
        let small = imageops::resize(&large, 160, 120, FilterType::Triangle);

        let a = hasher.dhash(&large).unwrap();
        let b = hasher.dhash(&small).unwrap();
        assert!(hamming_distance(a, b) <= 6, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn algorithm_serde_forms_are_stable() {
        let json = serde_json::to_string(&HashAlgorithm::DHash).unwrap();
        assert_eq!(json, "\"dhash\"");
        let back: HashAlgorithm = serde_json::from_str("\"phash\"").unwrap();
        assert_eq!(back, HashAlgorithm::PHash);
    }
}
