use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::core::hasher::hamming_distance;
use crate::core::index::SimilarityIndex;
use crate::core::media::HashedItem;
use crate::core::scoring::{ConfidenceScorer, DuplicateGroupResult, MemberEvidence};

/// Groups hashed items into duplicate clusters and scores them.
///
/// Clustering is single-linkage: any two items joined by an index hit within
/// the configured radius, or by exact checksum equality, end up in the same
/// group. Singleton clusters are dropped.
pub struct DuplicateDetector {
    radius: u32,
    scorer: ConfidenceScorer,
}

impl DuplicateDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_radius(config.similarity_radius)
    }

    pub fn with_radius(radius: u32) -> Self {
        Self {
            radius,
            scorer: ConfidenceScorer::new(),
        }
    }

    /// Run the grouping pass over items already added to `index`.
    ///
    /// Output is deterministic for a given input set: members are ordered by
    /// item id (the smallest becomes the cluster anchor) and groups by their
    /// anchor id.
    pub fn detect(
        &self,
        index: &SimilarityIndex,
        items: &[HashedItem],
    ) -> Vec<DuplicateGroupResult> {
        let position: HashMap<&str, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.item_id.as_str(), i))
            .collect();
        let mut linked = DisjointSet::new(items.len());

        for (i, item) in items.iter().enumerate() {
            for fp in &item.fingerprints {
                let hits =
                    index.query_within(fp.algorithm, fp.hash, self.radius, Some(&item.item_id));
                for hit in hits {
                    if let Some(&j) = position.get(hit.item_id.as_str()) {
                        linked.union(i, j);
                    }
                }
            }
        }

        let mut by_checksum: HashMap<&str, usize> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            if let Some(checksum) = item.metadata.checksum.as_deref() {
                match by_checksum.get(checksum) {
                    Some(&first) => linked.union(first, i),
                    None => {
                        by_checksum.insert(checksum, i);
                    }
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..items.len() {
            clusters.entry(linked.find(i)).or_default().push(i);
        }

        let mut cluster_list: Vec<Vec<usize>> = clusters
            .into_values()
            .filter(|members| members.len() > 1)
            .collect();
        for cluster in &mut cluster_list {
            cluster.sort_by(|&a, &b| items[a].item_id.cmp(&items[b].item_id));
        }
        cluster_list.sort_by(|a, b| items[a[0]].item_id.cmp(&items[b[0]].item_id));

        let groups: Vec<DuplicateGroupResult> = cluster_list
            .into_iter()
            .map(|cluster| {
                let anchor = &items[cluster[0]];
                let evidence: Vec<MemberEvidence> = cluster
                    .iter()
                    .map(|&i| {
                        let item = &items[i];
                        MemberEvidence {
                            item_id: item.item_id.clone(),
                            metadata: item.metadata.clone(),
                            hash_distance: hash_distance_between(anchor, item),
                        }
                    })
                    .collect();
                self.scorer.score_group(&evidence)
            })
            .collect();

        log::info!(
            "duplicate pass: {} groups across {} items",
            groups.len(),
            items.len()
        );
        groups
    }
}

// Smallest Hamming distance to the anchor over algorithms both sides carry.
// None when either side has no usable fingerprint.
fn hash_distance_between(anchor: &HashedItem, item: &HashedItem) -> Option<u32> {
    let mut best: Option<u32> = None;
    for fa in &anchor.fingerprints {
        for fb in &item.fingerprints {
            if fa.algorithm == fb.algorithm {
                let d = hamming_distance(fa.hash, fb.hash);
                best = Some(best.map_or(d, |current| current.min(d)));
            }
        }
    }
    best
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower index wins so roots stay stable across union order.
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::{Fingerprint, HashAlgorithm};
    use crate::core::media::ItemMetadata;

    fn item(id: &str, hash: Option<u64>, checksum: Option<&str>) -> HashedItem {
        let fingerprints = hash
            .map(|h| {
                vec![Fingerprint {
                    algorithm: HashAlgorithm::DHash,
                    hash: h,
                    width: 4000,
                    height: 3000,
                }]
            })
            .unwrap_or_default();
        HashedItem {
            item_id: id.to_string(),
            fingerprints,
            metadata: ItemMetadata {
                checksum: checksum.map(str::to_string),
                width: Some(4000),
                height: Some(3000),
                ..ItemMetadata::default()
            },
        }
    }

    fn populate(index: &SimilarityIndex, items: &[HashedItem]) {
        for it in items {
            for fp in &it.fingerprints {
                index.add(&it.item_id, *fp);
            }
        }
    }

    #[test]
    fn near_duplicates_group_and_outliers_stay_out() {
        let index = SimilarityIndex::default();
        let items = vec![
            item("a", Some(0b0000_0000), Some("s1")),
            item("b", Some(0b0000_0011), Some("s2")),
            item("c", Some(u64::MAX), Some("s3")),
        ];
        populate(&index, &items);

        let groups = DuplicateDetector::with_radius(5).detect(&index, &items);
        assert_eq!(groups.len(), 1);

        let ids: Vec<&str> = groups[0]
            .members
            .iter()
            .map(|m| m.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(groups[0].keeper_suggestion.is_some());
    }

    #[test]
    fn checksum_equality_links_unhashable_items() {
        let index = SimilarityIndex::default();
        let items = vec![
            item("a", None, Some("same")),
            item("b", None, Some("same")),
        ];
        populate(&index, &items);

        let groups = DuplicateDetector::with_radius(5).detect(&index, &items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
        // No perceptual hash anywhere: the group must flag itself.
        assert!(groups[0].incomplete);
    }

    #[test]
    fn unique_items_produce_no_groups() {
        let index = SimilarityIndex::default();
        let items = vec![
            item("a", Some(0), Some("s1")),
            item("b", Some(u64::MAX), Some("s2")),
        ];
        populate(&index, &items);

        let groups = DuplicateDetector::with_radius(5).detect(&index, &items);
        assert!(groups.is_empty());
    }

    #[test]
    fn linkage_is_transitive() {
        let index = SimilarityIndex::default();
        // a-b within radius 4, b-c within radius 4, a-c at distance 8.
        let items = vec![
            item("a", Some(0b0000_0000), Some("s1")),
            item("b", Some(0b0000_1111), Some("s2")),
            item("c", Some(0b1111_1111), Some("s3")),
        ];
        populate(&index, &items);

        let groups = DuplicateDetector::with_radius(4).detect(&index, &items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn groups_are_ordered_by_anchor_id() {
        let index = SimilarityIndex::default();
        let items = vec![
            item("d", Some(u64::MAX), Some("x1")),
            item("c", Some(u64::MAX - 1), Some("x2")),
            item("b", Some(0), Some("y1")),
            item("a", Some(1), Some("y2")),
        ];
        populate(&index, &items);

        let groups = DuplicateDetector::with_radius(2).detect(&index, &items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members[0].item_id, "a");
        assert_eq!(groups[1].members[0].item_id, "c");
    }

    #[test]
    fn anchor_distance_feeds_member_evidence() {
        let anchor = item("a", Some(0), None);
        let close = item("b", Some(0b111), None);
        assert_eq!(hash_distance_between(&anchor, &close), Some(3));

        let unhashable = item("c", None, None);
        assert_eq!(hash_distance_between(&anchor, &unhashable), None);
    }
}
