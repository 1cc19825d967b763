//! Perceptual duplicate-detection engine for photo and video collections.
//!
//! The engine reduces decoded media to compact 64-bit perceptual fingerprints,
//! indexes fingerprints for bounded-radius similarity lookup, and aggregates
//! independent signals (hash distance, checksum equality, metadata proximity)
//! into duplicate-group results with a keeper recommendation.
//!
//! Decoding pixels/frames and persisting results are the caller's concern:
//! the engine consumes [`image::GrayImage`] buffers and pre-extracted
//! [`core::media::ItemMetadata`], and hands back plain serializable records.

pub mod config;
pub mod core;

pub use config::EngineConfig;
pub use core::checksum::{ChecksumError, ChecksumService};
pub use core::detector::DuplicateDetector;
pub use core::hasher::{
    hamming_distance, Fingerprint, HashAlgorithm, HashError, PerceptualHasher, MAX_DISTANCE,
};
pub use core::index::{IndexMode, QueryMatch, SimilarityIndex};
pub use core::media::{DecodedItem, HashedItem, ItemMetadata};
pub use core::pipeline::{IndexProgress, IndexSummary, IndexingService, PipelineError};
pub use core::scoring::{
    ConfidenceScorer, ConfidenceSignal, DuplicateGroupMember, DuplicateGroupResult, MemberEvidence,
};
pub use core::video::{
    FrameSampler, SignatureVerdict, VideoComparison, VideoError, VideoFingerprinter, VideoSignature,
};
