//! Loop detection using Bag-of-Words with temporal consistency checking.
//!
//! This module implements the first stage of loop closing: deriving a
//! minimum similarity score from the current KeyFrame's covisible
//! neighbors, querying the keyframe database with it, and requiring the
//! same place to be detected over several consecutive KeyFrames.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::atlas::keyframe_db::KeyFrameDatabase;
use crate::atlas::map::{KeyFrameId, Map};
use crate::vocabulary::{BowVector, Vocabulary};

/// Number of covisible keyframes kept with each candidate for consistency checks.
const CANDIDATE_COVISIBLES: usize = 10;

/// Configuration for loop detection.
#[derive(Debug, Clone)]
pub struct LoopDetectorConfig {
    /// Minimum BoW score ratio compared to best covisible keyframe.
    /// Candidates must score at least this fraction of the best covisible score.
    pub min_score_ratio: f64,

    /// Number of consecutive frames required for temporal consistency.
    pub consistency_threshold: usize,

    /// Minimum number of covisible keyframes to consider for threshold computation.
    pub min_covisibles_for_threshold: usize,

    /// Maximum number of keyframes to check in the covisibility group.
    pub max_covisibles_to_check: usize,

    /// Keyframes that must pass after a detected loop before detecting again.
    pub min_keyframes_between_detections: u64,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            min_score_ratio: 0.75,
            consistency_threshold: 3,
            min_covisibles_for_threshold: 5,
            max_covisibles_to_check: 10,
            min_keyframes_between_detections: 10,
        }
    }
}

/// A potential loop closure candidate.
#[derive(Debug, Clone)]
pub struct LoopCandidate {
    /// Current keyframe ID that detected the loop.
    pub current_kf_id: KeyFrameId,

    /// Loop keyframe ID (the older keyframe we're closing back to).
    pub loop_kf_id: KeyFrameId,

    /// BoW similarity score between current and loop keyframe.
    pub bow_score: f64,

    /// Covisible keyframes of the loop keyframe (for extended matching).
    pub loop_covisibles: Vec<KeyFrameId>,
}

/// Tracks temporal consistency of loop detections.
///
/// A loop is only considered valid if we detect similar candidates
/// for `consistency_threshold` consecutive keyframes.
pub struct ConsistencyChecker {
    /// Required number of detections.
    consistency_threshold: usize,

    /// History of candidate groups for recent keyframes.
    /// Each entry is (keyframe_id, set of candidate keyframe IDs).
    history: VecDeque<(KeyFrameId, HashSet<KeyFrameId>)>,

    /// Current consistent candidates with their consistency count.
    consistent_counts: HashMap<KeyFrameId, usize>,
}

impl ConsistencyChecker {
    /// Create a new consistency checker.
    pub fn new(config: &LoopDetectorConfig) -> Self {
        Self {
            consistency_threshold: config.consistency_threshold,
            history: VecDeque::new(),
            consistent_counts: HashMap::new(),
        }
    }

    /// Add candidates for a new keyframe and check for consistency.
    ///
    /// Returns the best-scoring candidate that has been consistently detected.
    pub fn add_and_check(&mut self, kf_id: KeyFrameId, candidates: &[LoopCandidate]) -> Option<LoopCandidate> {
        // Build set of candidate keyframe IDs (including their covisibles)
        let mut candidate_set: HashSet<KeyFrameId> = HashSet::new();
        for c in candidates {
            candidate_set.insert(c.loop_kf_id);
            candidate_set.extend(c.loop_covisibles.iter().copied());
        }

        let new_counts: HashMap<KeyFrameId, usize> = candidate_set
            .iter()
            .map(|&cand_id| (cand_id, self.get_region_count(&cand_id) + 1))
            .collect();

        // Check if any candidate has reached the consistency threshold
        let best_consistent = candidates
            .iter()
            .filter(|c| {
                new_counts
                    .get(&c.loop_kf_id)
                    .is_some_and(|&count| count >= self.consistency_threshold)
            })
            .max_by(|a, b| {
                a.bow_score
                    .partial_cmp(&b.bow_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();

        // Update history
        self.history.push_back((kf_id, candidate_set));
        if self.history.len() > self.consistency_threshold + 2 {
            self.history.pop_front();
        }

        self.consistent_counts = new_counts;

        // If we found a consistent candidate, clear the history to avoid
        // repeated detections of the same loop
        if best_consistent.is_some() {
            self.clear();
        }

        best_consistent
    }

    /// Current consistency count of a candidate.
    pub fn consistency_count(&self, candidate_id: KeyFrameId) -> usize {
        self.consistent_counts.get(&candidate_id).copied().unwrap_or(0)
    }

    /// Get the consistency count for a candidate region.
    fn get_region_count(&self, candidate_id: &KeyFrameId) -> usize {
        self.history
            .iter()
            .filter(|(_kf_id, candidate_set)| candidate_set.contains(candidate_id))
            .count()
    }

    /// Clear the consistency history.
    pub fn clear(&mut self) {
        self.history.clear();
        self.consistent_counts.clear();
    }
}

/// Detect loop closure candidates for a given keyframe.
///
/// This function:
/// 1. Computes a minimum BoW score threshold from covisible keyframes
/// 2. Queries the KeyFrameDatabase with that threshold
/// 3. Returns candidates sorted by score
///
/// The map lock is only held while copying the BoW vectors and covisibles
/// a step needs; scoring always runs unlocked.
///
/// # Arguments
/// * `kf_id` - The current keyframe to find loops for
/// * `map` - The shared map holding the keyframe and its covisibility graph
/// * `keyframe_db` - The database the keyframes were added to
/// * `config` - Detection configuration
///
/// # Returns
/// Vector of loop candidates (may be empty if no good candidates found)
pub fn detect_loop_candidates(
    kf_id: KeyFrameId,
    map: &RwLock<Map>,
    keyframe_db: &KeyFrameDatabase,
    config: &LoopDetectorConfig,
) -> Vec<LoopCandidate> {
    let (current_bow, covisible_bows) = {
        let map = map.read();
        let current_kf = match map.get_keyframe(kf_id) {
            Some(kf) => kf,
            None => {
                warn!("Loop detection requested for {} which is not in the map", kf_id);
                return vec![];
            }
        };
        let covisible_bows: Vec<BowVector> = current_kf
            .get_best_covisibles(config.max_covisibles_to_check)
            .into_iter()
            .filter_map(|cov_id| map.get_keyframe(cov_id).map(|kf| kf.bow_vector().clone()))
            .collect();
        (current_kf.bow_vector().clone(), covisible_bows)
    };
    let vocabulary = keyframe_db.vocabulary();

    let min_score = compute_min_score(&current_bow, &covisible_bows, vocabulary, config);

    if min_score < 0.01 {
        // No meaningful threshold could be computed
        debug!("No loop threshold for {} ({} covisibles)", kf_id, covisible_bows.len());
        return vec![];
    }

    let loop_kf_ids = match keyframe_db.detect_loop_candidates_with(kf_id, &current_bow, map, min_score) {
        Ok(ids) => ids,
        Err(never) => match never {},
    };

    let mut candidates: Vec<LoopCandidate> = loop_kf_ids
        .into_iter()
        .filter_map(|loop_kf_id| {
            let (loop_bow, loop_covisibles) = {
                let map = map.read();
                let loop_kf = map.get_keyframe(loop_kf_id)?;
                (loop_kf.bow_vector().clone(), loop_kf.get_best_covisibles(CANDIDATE_COVISIBLES))
            };
            Some(LoopCandidate {
                current_kf_id: kf_id,
                loop_kf_id,
                bow_score: vocabulary.score(&current_bow, &loop_bow),
                loop_covisibles,
            })
        })
        .collect();

    // Sort by score descending
    candidates.sort_by(|a, b| {
        b.bow_score
            .partial_cmp(&a.bow_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(
        "Loop detection for {}: min_score={:.3}, {} candidates",
        kf_id,
        min_score,
        candidates.len()
    );

    candidates
}

/// Compute minimum BoW score threshold based on covisible keyframes.
fn compute_min_score(
    current_bow: &BowVector,
    covisible_bows: &[BowVector],
    vocabulary: &dyn Vocabulary,
    config: &LoopDetectorConfig,
) -> f64 {
    if covisible_bows.len() < config.min_covisibles_for_threshold {
        return 0.0;
    }

    let best_covisible_score = covisible_bows
        .iter()
        .map(|bow| vocabulary.score(current_bow, bow))
        .fold(0.0, f64::max);

    // Threshold is a fraction of the best covisible score
    best_covisible_score * config.min_score_ratio
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vocabulary::L1Vocabulary;

    fn bow(words: &[u32]) -> BowVector {
        words.iter().map(|&w| (w, 1.0)).collect()
    }

    #[test]
    fn test_consistency_checker() {
        let config = LoopDetectorConfig {
            consistency_threshold: 3,
            ..Default::default()
        };
        let mut checker = ConsistencyChecker::new(&config);

        // Create candidates
        let candidate = LoopCandidate {
            current_kf_id: KeyFrameId::new(10),
            loop_kf_id: KeyFrameId::new(1),
            bow_score: 0.8,
            loop_covisibles: vec![KeyFrameId::new(2), KeyFrameId::new(3)],
        };

        // First detection - not consistent yet
        let result = checker.add_and_check(KeyFrameId::new(10), &[candidate.clone()]);
        assert!(result.is_none());
        assert_eq!(checker.consistency_count(KeyFrameId::new(1)), 1);

        // Second detection - still not consistent
        let candidate2 = LoopCandidate {
            current_kf_id: KeyFrameId::new(11),
            loop_kf_id: KeyFrameId::new(1),
            bow_score: 0.85,
            loop_covisibles: vec![KeyFrameId::new(2)],
        };
        let result = checker.add_and_check(KeyFrameId::new(11), &[candidate2]);
        assert!(result.is_none());

        // Third detection - should be consistent now
        let candidate3 = LoopCandidate {
            current_kf_id: KeyFrameId::new(12),
            loop_kf_id: KeyFrameId::new(1),
            bow_score: 0.9,
            loop_covisibles: vec![],
        };
        let result = checker.add_and_check(KeyFrameId::new(12), &[candidate3]);
        assert_eq!(result.map(|c| c.loop_kf_id), Some(KeyFrameId::new(1)));

        // History is cleared after a detection
        assert_eq!(checker.consistency_count(KeyFrameId::new(1)), 0);
    }

    #[test]
    fn test_consistency_checker_no_match() {
        let config = LoopDetectorConfig {
            consistency_threshold: 3,
            ..Default::default()
        };
        let mut checker = ConsistencyChecker::new(&config);

        // Different candidates each time
        for i in 10..15 {
            let candidate = LoopCandidate {
                current_kf_id: KeyFrameId::new(i),
                loop_kf_id: KeyFrameId::new(i - 9),
                bow_score: 0.8,
                loop_covisibles: vec![],
            };
            let result = checker.add_and_check(KeyFrameId::new(i), &[candidate]);
            assert!(result.is_none());
        }
    }

    /// Builds a map where keyframe `current` revisits the place of `old`:
    /// both see words 0..8, `current` has `num_covisibles` neighbors that
    /// share half of its words.
    fn revisit_setup(num_covisibles: usize) -> (RwLock<Map>, KeyFrameDatabase, KeyFrameId, KeyFrameId) {
        let db = KeyFrameDatabase::new(Arc::new(L1Vocabulary::new(64)));
        let mut map = Map::new();

        let old = map.create_keyframe(0, bow(&[0, 1, 2, 3, 4, 5, 6, 7]));
        db.add(map.get_keyframe(old).unwrap());

        let current = map.create_keyframe(100, bow(&[0, 1, 2, 3, 4, 5, 6, 7]));
        for i in 0..num_covisibles {
            let words: Vec<u32> = (0..4).chain(20 + 4 * i as u32..24 + 4 * i as u32).collect();
            let cov = map.create_keyframe(101 + i as u64, bow(&words));
            map.set_covisibility(current, cov, 50);
            db.add(map.get_keyframe(cov).unwrap());
        }
        db.add(map.get_keyframe(current).unwrap());

        (RwLock::new(map), db, old, current)
    }

    #[test]
    fn test_detect_loop_candidates_finds_revisited_place() {
        let (map, db, old, current) = revisit_setup(5);
        let config = LoopDetectorConfig::default();

        let candidates = detect_loop_candidates(current, &map, &db, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].loop_kf_id, old);
        assert_eq!(candidates[0].current_kf_id, current);
        assert!((candidates[0].bow_score - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_detect_loop_candidates_needs_enough_covisibles() {
        let (map, db, _old, current) = revisit_setup(2);
        let config = LoopDetectorConfig::default();

        assert!(detect_loop_candidates(current, &map, &db, &config).is_empty());
    }

    #[test]
    fn test_detect_loop_candidates_unknown_keyframe() {
        let (map, db, _old, _current) = revisit_setup(5);
        let config = LoopDetectorConfig::default();

        assert!(detect_loop_candidates(KeyFrameId::new(999), &map, &db, &config).is_empty());
    }
}
