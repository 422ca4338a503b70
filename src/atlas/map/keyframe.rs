//! KeyFrame - A selected frame with its place-recognition data.
//!
//! For place recognition a KeyFrame carries:
//! - Its Bag-of-Words vector (computed once, when the KeyFrame is created)
//! - Its covisibility edges (weighted by shared MapPoint count)
//!
//! The covisibility graph connects KeyFrames that observe the same
//! structure. The keyframe database uses it twice: to exclude a query's
//! direct neighbors from loop candidates, and to accumulate scores over a
//! candidate's best neighbors.

use std::collections::{HashMap, HashSet};

use crate::vocabulary::BowVector;

use super::types::KeyFrameId;

/// A KeyFrame in the SLAM map.
#[derive(Clone)]
pub struct KeyFrame {
    /// Unique identifier for this KeyFrame.
    pub id: KeyFrameId,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Bag-of-Words representation used for place recognition.
    ///
    /// The vocabulary and BoW computation live outside of this type; the
    /// KeyFrame simply stores the resulting sparse histogram. It must not
    /// change while the KeyFrame is registered in a keyframe database,
    /// since erasure walks the same words as insertion.
    bow_vector: BowVector,

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility Graph
    // ─────────────────────────────────────────────────────────────────────────
    /// Covisibility weights: connected KeyFrame → number of shared MapPoints.
    /// This is the adjacency list for the covisibility graph.
    covisibility_weights: HashMap<KeyFrameId, usize>,

    /// Ordered list of covisible KeyFrames (best first).
    /// Rebuilt on every edge change so reads stay `&self`.
    ordered_covisibles: Vec<(KeyFrameId, usize)>,
}

impl KeyFrame {
    /// Create a new KeyFrame with its BoW vector.
    pub fn new(id: KeyFrameId, timestamp_ns: u64, bow_vector: BowVector) -> Self {
        Self {
            id,
            timestamp_ns,
            bow_vector,
            covisibility_weights: HashMap::new(),
            ordered_covisibles: Vec::new(),
        }
    }

    /// Get a reference to the Bag-of-Words vector.
    pub fn bow_vector(&self) -> &BowVector {
        &self.bow_vector
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility Graph
    // ─────────────────────────────────────────────────────────────────────────

    /// Add or update a covisibility connection.
    ///
    /// # Arguments
    /// * `kf_id` - The connected KeyFrame
    /// * `weight` - Number of shared MapPoints
    pub fn add_covisibility(&mut self, kf_id: KeyFrameId, weight: usize) {
        if kf_id == self.id {
            return; // Don't connect to self
        }
        self.covisibility_weights.insert(kf_id, weight);
        self.rebuild_ordered_covisibles();
    }

    /// Remove a covisibility connection.
    pub fn erase_covisibility(&mut self, kf_id: KeyFrameId) {
        if self.covisibility_weights.remove(&kf_id).is_some() {
            self.rebuild_ordered_covisibles();
        }
    }

    /// Get the covisibility weight with another KeyFrame.
    pub fn get_covisibility_weight(&self, kf_id: KeyFrameId) -> usize {
        self.covisibility_weights.get(&kf_id).copied().unwrap_or(0)
    }

    /// Get all covisible KeyFrames (unordered).
    pub fn get_covisibles(&self) -> impl Iterator<Item = &KeyFrameId> {
        self.covisibility_weights.keys()
    }

    /// Direct covisibility neighbors as a set.
    pub fn connected_keyframes(&self) -> HashSet<KeyFrameId> {
        self.covisibility_weights.keys().copied().collect()
    }

    /// Get the N best covisible KeyFrames (most shared points first).
    pub fn get_best_covisibles(&self, n: usize) -> Vec<KeyFrameId> {
        self.ordered_covisibles
            .iter()
            .take(n)
            .map(|(id, _)| *id)
            .collect()
    }

    fn rebuild_ordered_covisibles(&mut self) {
        self.ordered_covisibles = self
            .covisibility_weights
            .iter()
            .map(|(id, w)| (*id, *w))
            .collect();
        // Descending by weight, ties broken by id for a stable order
        self.ordered_covisibles
            .sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    }

    /// Number of visual words with a nonzero weight.
    ///
    /// These are the words the KeyFrame is listed under in a keyframe database.
    pub fn num_words(&self) -> usize {
        self.bow_vector.values().filter(|&&w| w != 0.0).count()
    }
}

impl std::fmt::Debug for KeyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFrame")
            .field("id", &self.id)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("num_words", &self.num_words())
            .field("covisibles", &self.covisibility_weights.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_keyframe(id: u64) -> KeyFrame {
        KeyFrame::new(KeyFrameId::new(id), 1_000_000 * id, BowVector::new())
    }

    #[test]
    fn test_covisibility_graph() {
        let mut kf = create_test_keyframe(1);

        kf.add_covisibility(KeyFrameId::new(2), 50);
        kf.add_covisibility(KeyFrameId::new(3), 100);
        kf.add_covisibility(KeyFrameId::new(4), 25);

        assert_eq!(kf.get_covisibility_weight(KeyFrameId::new(2)), 50);
        assert_eq!(kf.get_covisibility_weight(KeyFrameId::new(5)), 0); // Not connected

        // Get best covisibles (should be ordered by weight descending)
        let best = kf.get_best_covisibles(2);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0], KeyFrameId::new(3)); // 100 shared
        assert_eq!(best[1], KeyFrameId::new(2)); // 50 shared

        // Asking for more than exist returns all of them
        assert_eq!(kf.get_best_covisibles(10).len(), 3);
    }

    #[test]
    fn test_covisibility_update_and_erase() {
        let mut kf = create_test_keyframe(1);
        kf.add_covisibility(KeyFrameId::new(2), 10);
        kf.add_covisibility(KeyFrameId::new(3), 20);

        // Re-adding overwrites the weight and reorders
        kf.add_covisibility(KeyFrameId::new(2), 30);
        assert_eq!(kf.get_best_covisibles(1), vec![KeyFrameId::new(2)]);

        kf.erase_covisibility(KeyFrameId::new(2));
        assert_eq!(kf.get_best_covisibles(10), vec![KeyFrameId::new(3)]);
        assert!(!kf.connected_keyframes().contains(&KeyFrameId::new(2)));
    }

    #[test]
    fn test_covisibility_no_self_connection() {
        let mut kf = create_test_keyframe(1);
        kf.add_covisibility(KeyFrameId::new(1), 100); // Try to connect to self
        assert_eq!(kf.get_covisibility_weight(KeyFrameId::new(1)), 0);
        assert!(kf.connected_keyframes().is_empty());
    }

    #[test]
    fn test_num_words_ignores_zero_weights() {
        let bow: BowVector = [(0, 0.4), (1, 0.0), (2, 0.6)].into_iter().collect();
        let kf = KeyFrame::new(KeyFrameId::new(1), 0, bow);
        assert_eq!(kf.num_words(), 2);
        assert_eq!(kf.bow_vector().len(), 3);
    }
}
