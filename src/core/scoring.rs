use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::hasher::MAX_DISTANCE;
use crate::core::media::ItemMetadata;

// Fixed signal weights; the applicable subset sums to at most 1.0.
pub const CHECKSUM_WEIGHT: f64 = 0.5;
pub const HASH_WEIGHT: f64 = 0.35;
pub const METADATA_WEIGHT: f64 = 0.15;

const CAMERA_CONFLICT_PENALTY: f64 = 0.15;
const DURATION_CONFLICT_PENALTY: f64 = 0.20;
const DURATION_CONFLICT_TOLERANCE_SECS: f64 = 1.0;

// Capture-time proximity: full credit within a minute, none beyond an hour.
const CAPTURE_PROXIMITY_FULL_SECS: i64 = 60;
const CAPTURE_PROXIMITY_ZERO_SECS: i64 = 3600;

/// One weighted evidence source attached to a group member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSignal {
    pub key: String,
    pub weight: f64,
    pub raw_score: f64,
    pub contribution: f64,
    pub rationale: String,
}

impl ConfidenceSignal {
    fn new(key: &str, weight: f64, raw_score: f64, rationale: String) -> Self {
        let raw_score = raw_score.clamp(0.0, 1.0);
        Self {
            key: key.to_string(),
            weight,
            raw_score,
            contribution: weight * raw_score,
            rationale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroupMember {
    pub item_id: String,
    pub confidence: f64,
    pub signals: Vec<ConfidenceSignal>,
    pub penalties: Vec<ConfidenceSignal>,
    pub rationale: Vec<String>,
}

/// The result handed to the persistence collaborator. Suggestions are
/// advisory; the engine never deletes files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroupResult {
    pub group_id: String,
    pub members: Vec<DuplicateGroupMember>,
    pub confidence: f64,
    pub rationale_lines: Vec<String>,
    pub keeper_suggestion: Option<String>,
    pub incomplete: bool,
}

/// Evidence for one member of a candidate cluster, relative to the cluster
/// anchor (the first member).
#[derive(Debug, Clone)]
pub struct MemberEvidence {
    pub item_id: String,
    pub metadata: ItemMetadata,
    /// Hamming distance to the anchor's fingerprint; `None` when either side
    /// could not be hashed.
    pub hash_distance: Option<u32>,
}

/// Turns a candidate cluster into a scored duplicate group.
///
/// Pure and synchronous: all inputs are immutable evidence computed earlier.
/// Missing data never raises; it lowers confidence and sets `incomplete` so
/// downstream undo logic treats the group conservatively.
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_group(&self, evidence: &[MemberEvidence]) -> DuplicateGroupResult {
        debug_assert!(!evidence.is_empty(), "a duplicate group needs at least one member");
        if evidence.is_empty() {
            return DuplicateGroupResult {
                group_id: new_group_id(),
                members: Vec::new(),
                confidence: 0.0,
                rationale_lines: vec!["empty candidate set".to_string()],
                keeper_suggestion: None,
                incomplete: true,
            };
        }

        let anchor = &evidence[0];
        let mut members = Vec::with_capacity(evidence.len());
        let mut incomplete = false;
        for ev in evidence {
            let (member, missing) = self.score_member(ev, anchor);
            incomplete |= missing;
            members.push(member);
        }

        let confidence = Self::aggregate_confidence(&members);
        let keeper_suggestion = Self::suggest_keeper(&members, evidence);

        let mut rationale_lines = vec![
            format!("{} candidates anchored on {}", members.len(), anchor.item_id),
            format!("group confidence {confidence:.2}, the weakest member"),
        ];
        if let Some(keeper) = &keeper_suggestion {
            rationale_lines.push(format!("suggest keeping {keeper}"));
        }
        if incomplete {
            rationale_lines
                .push("evidence incomplete: missing checksum or perceptual hash".to_string());
        }

        DuplicateGroupResult {
            group_id: new_group_id(),
            members,
            confidence,
            rationale_lines,
            keeper_suggestion,
            incomplete,
        }
    }

    fn score_member(
        &self,
        ev: &MemberEvidence,
        anchor: &MemberEvidence,
    ) -> (DuplicateGroupMember, bool) {
        let mut signals = Vec::new();
        let mut penalties = Vec::new();
        let mut rationale = Vec::new();
        let mut missing_required = false;

        match (&ev.metadata.checksum, &anchor.metadata.checksum) {
            (Some(own), Some(anchor_sum)) => {
                let identical = own == anchor_sum;
                let note = if identical {
                    format!("byte-identical to {}", anchor.item_id)
                } else {
                    format!("content differs from {}", anchor.item_id)
                };
                signals.push(ConfidenceSignal::new(
                    "checksum",
                    CHECKSUM_WEIGHT,
                    if identical { 1.0 } else { 0.0 },
                    note,
                ));
            }
            _ => {
                missing_required = true;
                rationale.push("checksum unavailable".to_string());
            }
        }

        match ev.hash_distance {
            Some(d) => {
                let d = d.min(MAX_DISTANCE);
                let raw = 1.0 - f64::from(d) / f64::from(MAX_DISTANCE);
                signals.push(ConfidenceSignal::new(
                    "hash",
                    HASH_WEIGHT,
                    raw,
                    format!("perceptual distance {d} of {MAX_DISTANCE}"),
                ));
            }
            None => {
                missing_required = true;
                rationale.push("no perceptual hash".to_string());
            }
        }

        if let Some((raw, detail)) = metadata_proximity(&ev.metadata, &anchor.metadata) {
            signals.push(ConfidenceSignal::new("metadata", METADATA_WEIGHT, raw, detail));
        }

        if let (Some(own), Some(other)) = (&ev.metadata.camera, &anchor.metadata.camera) {
            if own != other {
                penalties.push(ConfidenceSignal::new(
                    "camera_conflict",
                    CAMERA_CONFLICT_PENALTY,
                    1.0,
                    format!("camera {own:?} conflicts with {other:?}"),
                ));
            }
        }
        if let (Some(own), Some(other)) =
            (ev.metadata.duration_secs, anchor.metadata.duration_secs)
        {
            if (own - other).abs() > DURATION_CONFLICT_TOLERANCE_SECS {
                penalties.push(ConfidenceSignal::new(
                    "duration_conflict",
                    DURATION_CONFLICT_PENALTY,
                    1.0,
                    format!("duration differs by {:.1}s", (own - other).abs()),
                ));
            }
        }

        let signal_total: f64 = signals.iter().map(|s| s.contribution).sum();
        let penalty_total: f64 = penalties.iter().map(|s| s.contribution).sum();
        let confidence = (signal_total - penalty_total).clamp(0.0, 1.0);

        (
            DuplicateGroupMember {
                item_id: ev.item_id.clone(),
                confidence,
                signals,
                penalties,
                rationale,
            },
            missing_required,
        )
    }

    // Minimum member confidence: a group is only as trustworthy as its
    // least-confident match, and the aggregate must not exceed any member.
    fn aggregate_confidence(members: &[DuplicateGroupMember]) -> f64 {
        members
            .iter()
            .map(|m| m.confidence)
            .fold(1.0, f64::min)
            .clamp(0.0, 1.0)
    }

    // Total order: confidence, pixel area, capture time (present beats
    // absent, earlier beats later), then item id, so the same input always
    // yields the same keeper.
    fn suggest_keeper(
        members: &[DuplicateGroupMember],
        evidence: &[MemberEvidence],
    ) -> Option<String> {
        members
            .iter()
            .zip(evidence)
            .min_by(|a, b| keeper_order(a.0, a.1).cmp_against(&keeper_order(b.0, b.1)))
            .map(|(m, _)| m.item_id.clone())
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_group_id() -> String {
    format!("grp_{}", Uuid::new_v4().simple())
}

struct KeeperKey<'a> {
    confidence: f64,
    area: u64,
    captured_at: Option<DateTime<Utc>>,
    item_id: &'a str,
}

impl<'a> KeeperKey<'a> {
    // `Less` means "better keeper".
    fn cmp_against(&self, other: &KeeperKey<'_>) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| other.area.cmp(&self.area))
            .then_with(|| match (self.captured_at, other.captured_at) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.item_id.cmp(other.item_id))
    }
}

fn keeper_order<'a>(member: &'a DuplicateGroupMember, ev: &'a MemberEvidence) -> KeeperKey<'a> {
    KeeperKey {
        confidence: member.confidence,
        area: ev.metadata.pixel_area().unwrap_or(0),
        captured_at: ev.metadata.captured_at,
        item_id: &member.item_id,
    }
}

fn metadata_proximity(own: &ItemMetadata, anchor: &ItemMetadata) -> Option<(f64, String)> {
    let mut scores = Vec::new();
    let mut details = Vec::new();

    if let (Some(a), Some(b)) = (own.captured_at, anchor.captured_at) {
        let gap = (a - b).num_seconds().abs();
        let score = if gap <= CAPTURE_PROXIMITY_FULL_SECS {
            1.0
        } else if gap >= CAPTURE_PROXIMITY_ZERO_SECS {
            0.0
        } else {
            1.0 - (gap - CAPTURE_PROXIMITY_FULL_SECS) as f64
                / (CAPTURE_PROXIMITY_ZERO_SECS - CAPTURE_PROXIMITY_FULL_SECS) as f64
        };
        scores.push(score);
        details.push(format!("captured {gap}s apart"));
    }

    if let (Some(a), Some(b)) = (own.pixel_area(), anchor.pixel_area()) {
        let score = if a == b {
            1.0
        } else {
            a.min(b) as f64 / a.max(b) as f64
        };
        scores.push(score);
        if a == b {
            details.push("same pixel dimensions".to_string());
        } else {
            details.push(format!("pixel area ratio {score:.2}"));
        }
    }

    if scores.is_empty() {
        return None;
    }
    let raw = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((raw, details.join(", ")))
}
