use serde::{Deserialize, Serialize};

/// Configuration surface consumed by the engine.
///
/// One config is built per scan session and shared by reference; individual
/// services read the fields they care about at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compute difference hashes (fast, gradient-based).
    pub enable_dhash: bool,
    /// Additionally compute DCT-based perceptual hashes for cross-validation.
    pub enable_phash: bool,
    /// Population at which a flat similarity index is rebuilt into a BK-tree.
    pub bk_tree_promotion_threshold: usize,
    /// Hamming radius used when clustering candidates into duplicate groups.
    pub similarity_radius: u32,
    /// Worker threads for the hashing pool.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_dhash: true,
            enable_phash: false,
            bk_tree_promotion_threshold: 1000,
            similarity_radius: 10,
            worker_threads: num_cpus::get(),
        }
    }
}

impl EngineConfig {
    /// Preset for workloads known in advance to be large: promotes the index
    /// to tree mode much earlier and cross-validates with pHash.
    pub fn for_large_collections() -> Self {
        Self {
            enable_phash: true,
            bk_tree_promotion_threshold: 256,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_dhash_only() {
        let config = EngineConfig::default();
        assert!(config.enable_dhash);
        assert!(!config.enable_phash);
        assert_eq!(config.bk_tree_promotion_threshold, 1000);
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn large_collection_preset_lowers_promotion_threshold() {
        let config = EngineConfig::for_large_collections();
        assert!(config.bk_tree_promotion_threshold < EngineConfig::default().bk_tree_promotion_threshold);
        assert!(config.enable_phash);
    }
}
