use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::core::hasher::{hamming_distance, Fingerprint, HashAlgorithm};

const POISONED: &str = "similarity index lock poisoned";

/// An entry owned by the index: one per (item, algorithm) pair.
/// Re-adding the same pair replaces the prior entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub item_id: String,
    pub fingerprint: Fingerprint,
    seq: u64,
}

/// A single radius-query hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub item_id: String,
    pub distance: u32,
}

/// Which backing representation an algorithm's index currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexMode {
    Flat,
    Tree,
}

// Arena node. Tombstoned nodes stay structural: their hash still routes
// traversal, they just never appear in results.
#[derive(Debug)]
struct BkNode {
    entry: IndexEntry,
    children: BTreeMap<u32, usize>,
    alive: bool,
}

#[derive(Debug)]
struct BkTree {
    nodes: Vec<BkNode>,
    live_count: usize,
}

impl BkTree {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            live_count: 0,
        }
    }

    fn insert(&mut self, entry: IndexEntry) -> usize {
        let new_id = self.nodes.len();
        let new_hash = entry.fingerprint.hash;
        let node = BkNode {
            entry,
            children: BTreeMap::new(),
            alive: true,
        };

        if self.nodes.is_empty() {
            self.nodes.push(node);
            self.live_count += 1;
            return new_id;
        }

        let mut current = 0;
        loop {
            let d = hamming_distance(self.nodes[current].entry.fingerprint.hash, new_hash);
            match self.nodes[current].children.get(&d) {
                Some(&child) => current = child,
                None => {
                    self.nodes[current].children.insert(d, new_id);
                    self.nodes.push(node);
                    self.live_count += 1;
                    return new_id;
                }
            }
        }
    }

    fn tombstone(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        if node.alive {
            node.alive = false;
            self.live_count -= 1;
        }
    }

    fn query(
        &self,
        target: u64,
        radius: u32,
        exclude: Option<&str>,
        hits: &mut Vec<(u32, u64, String)>,
    ) {
        if !self.nodes.is_empty() {
            self.query_node(0, target, radius, exclude, hits);
        }
    }

    fn query_node(
        &self,
        idx: usize,
        target: u64,
        radius: u32,
        exclude: Option<&str>,
        hits: &mut Vec<(u32, u64, String)>,
    ) {
        let node = &self.nodes[idx];
        let d = hamming_distance(node.entry.fingerprint.hash, target);

        if node.alive && d <= radius && exclude != Some(node.entry.item_id.as_str()) {
            hits.push((d, node.entry.seq, node.entry.item_id.clone()));
        }

        // Triangle inequality: children outside [d - r, d + r] cannot hold
        // anything within r of the target.
        let low = d.saturating_sub(radius);
        let high = d.saturating_add(radius);
        for (_, &child) in node.children.range(low..=high) {
            self.query_node(child, target, radius, exclude, hits);
        }
    }
}

#[derive(Debug)]
enum Backing {
    Flat(Vec<IndexEntry>),
    Tree {
        tree: BkTree,
        by_item: HashMap<String, usize>,
    },
}

#[derive(Debug)]
struct AlgorithmIndex {
    algorithm: HashAlgorithm,
    backing: Backing,
    next_seq: u64,
    promotion_threshold: usize,
}

impl AlgorithmIndex {
    fn new(algorithm: HashAlgorithm, promotion_threshold: usize) -> Self {
        Self {
            algorithm,
            backing: Backing::Flat(Vec::new()),
            next_seq: 0,
            promotion_threshold,
        }
    }

    fn len(&self) -> usize {
        match &self.backing {
            Backing::Flat(entries) => entries.len(),
            Backing::Tree { tree, .. } => tree.live_count,
        }
    }

    fn mode(&self) -> IndexMode {
        match &self.backing {
            Backing::Flat(_) => IndexMode::Flat,
            Backing::Tree { .. } => IndexMode::Tree,
        }
    }

    fn needs_promotion(&self) -> bool {
        matches!(&self.backing, Backing::Flat(entries) if entries.len() >= self.promotion_threshold)
    }

    fn add(&mut self, item_id: &str, fingerprint: Fingerprint) {
        debug_assert_eq!(fingerprint.algorithm, self.algorithm);
        self.maybe_promote();

        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = IndexEntry {
            item_id: item_id.to_string(),
            fingerprint,
            seq,
        };

        match &mut self.backing {
            Backing::Flat(entries) => {
                entries.retain(|e| e.item_id != item_id);
                entries.push(entry);
            }
            Backing::Tree { tree, by_item } => {
                if let Some(&old) = by_item.get(item_id) {
                    tree.tombstone(old);
                }
                let idx = tree.insert(entry);
                by_item.insert(item_id.to_string(), idx);
            }
        }
    }

    // One-way flat -> tree rebuild, entered lazily from add() and query paths
    // once the population crosses the threshold. The backing swap is a single
    // assignment, so readers serialized behind the same lock see exactly one
    // representation.
    fn maybe_promote(&mut self) {
        if !self.needs_promotion() {
            return;
        }
        let Backing::Flat(entries) =
            std::mem::replace(&mut self.backing, Backing::Flat(Vec::new()))
        else {
            unreachable!("promotion is one-directional");
        };

        let mut tree = BkTree::with_capacity(entries.len());
        let mut by_item = HashMap::with_capacity(entries.len());
        for entry in entries {
            let item_id = entry.item_id.clone();
            let idx = tree.insert(entry);
            by_item.insert(item_id, idx);
        }
        log::info!(
            "{} similarity index promoted to BK-tree at {} entries",
            self.algorithm,
            tree.live_count
        );
        self.backing = Backing::Tree { tree, by_item };
    }

    fn query_within(&self, hash: u64, radius: u32, exclude: Option<&str>) -> Vec<QueryMatch> {
        let mut hits: Vec<(u32, u64, String)> = Vec::new();
        match &self.backing {
            Backing::Flat(entries) => {
                for entry in entries {
                    if exclude == Some(entry.item_id.as_str()) {
                        continue;
                    }
                    let d = hamming_distance(entry.fingerprint.hash, hash);
                    if d <= radius {
                        hits.push((d, entry.seq, entry.item_id.clone()));
                    }
                }
            }
            Backing::Tree { tree, .. } => tree.query(hash, radius, exclude, &mut hits),
        }

        // Ascending distance, ties broken by insertion order.
        hits.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        hits.into_iter()
            .map(|(distance, _, item_id)| QueryMatch { item_id, distance })
            .collect()
    }
}

/// Similarity index over perceptual fingerprints.
///
/// One independent index per algorithm, each serialized behind its own lock,
/// so workers can `add` and `query_within` concurrently. Construct one per
/// scan session and share it by reference; results are representation-
/// independent across the flat-to-tree promotion.
#[derive(Debug)]
pub struct SimilarityIndex {
    dhash: RwLock<AlgorithmIndex>,
    phash: RwLock<AlgorithmIndex>,
}

impl SimilarityIndex {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_promotion_threshold(config.bk_tree_promotion_threshold)
    }

    pub fn with_promotion_threshold(threshold: usize) -> Self {
        Self {
            dhash: RwLock::new(AlgorithmIndex::new(HashAlgorithm::DHash, threshold)),
            phash: RwLock::new(AlgorithmIndex::new(HashAlgorithm::PHash, threshold)),
        }
    }

    fn slot(&self, algorithm: HashAlgorithm) -> &RwLock<AlgorithmIndex> {
        match algorithm {
            HashAlgorithm::DHash => &self.dhash,
            HashAlgorithm::PHash => &self.phash,
        }
    }

    /// Insert or replace the entry for `(item, fingerprint.algorithm)`.
    pub fn add(&self, item_id: &str, fingerprint: Fingerprint) {
        self.slot(fingerprint.algorithm)
            .write()
            .expect(POISONED)
            .add(item_id, fingerprint);
    }

    /// All items within Hamming distance `radius` of `hash`, ascending by
    /// distance with ties in insertion order. `exclude` suppresses the
    /// queried item's own entry for "find others like me" lookups.
    pub fn query_within(
        &self,
        algorithm: HashAlgorithm,
        hash: u64,
        radius: u32,
        exclude: Option<&str>,
    ) -> Vec<QueryMatch> {
        let slot = self.slot(algorithm);
        {
            let guard = slot.read().expect(POISONED);
            if !guard.needs_promotion() {
                return guard.query_within(hash, radius, exclude);
            }
        }

        let mut guard = slot.write().expect(POISONED);
        guard.maybe_promote();
        guard.query_within(hash, radius, exclude)
    }

    pub fn len(&self, algorithm: HashAlgorithm) -> usize {
        self.slot(algorithm).read().expect(POISONED).len()
    }

    pub fn is_empty(&self, algorithm: HashAlgorithm) -> bool {
        self.len(algorithm) == 0
    }

    pub fn mode(&self, algorithm: HashAlgorithm) -> IndexMode {
        self.slot(algorithm).read().expect(POISONED).mode()
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
