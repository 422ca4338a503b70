//! Map - Registry of KeyFrames addressed by id.
//!
//! The Map is the arena that owns every live KeyFrame. Other structures
//! (the keyframe database, loop candidates, covisibility edges) refer to
//! KeyFrames only by [`KeyFrameId`]; resolving an id through the Map yields
//! `None` once the KeyFrame has been removed, never a dangling reference.
//!
//! It provides methods for:
//! - Creating/adding/removing KeyFrames
//! - Maintaining bidirectional covisibility edges
//! - Querying the local covisibility neighborhood

use std::collections::{HashMap, HashSet};

use crate::vocabulary::BowVector;

use super::keyframe::KeyFrame;
use super::types::KeyFrameId;

/// The SLAM map containing KeyFrames.
#[derive(Debug, Default)]
pub struct Map {
    /// All KeyFrames in the map.
    keyframes: HashMap<KeyFrameId, KeyFrame>,

    /// Counter for generating unique KeyFrame IDs.
    next_kf_id: u64,

    /// Most recent KeyFrame ID.
    last_keyframe_id: Option<KeyFrameId>,
}

impl Map {
    /// Create a new empty Map.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // ID Generation
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a new unique KeyFrame ID.
    pub fn next_keyframe_id(&mut self) -> KeyFrameId {
        let id = KeyFrameId::new(self.next_kf_id);
        self.next_kf_id += 1;
        id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // KeyFrame Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and add a new KeyFrame to the map.
    ///
    /// Returns the ID of the created KeyFrame.
    pub fn create_keyframe(&mut self, timestamp_ns: u64, bow: BowVector) -> KeyFrameId {
        let id = self.next_keyframe_id();
        self.keyframes.insert(id, KeyFrame::new(id, timestamp_ns, bow));
        self.last_keyframe_id = Some(id);
        id
    }

    /// Add an existing KeyFrame to the map.
    pub fn add_keyframe(&mut self, kf: KeyFrame) {
        // Update the ID counter if needed
        if kf.id.0 >= self.next_kf_id {
            self.next_kf_id = kf.id.0 + 1;
        }
        self.last_keyframe_id = Some(kf.id);
        self.keyframes.insert(kf.id, kf);
    }

    /// Get the most recent KeyFrame ID.
    pub fn last_keyframe_id(&self) -> Option<KeyFrameId> {
        self.last_keyframe_id
    }

    /// Get a KeyFrame by ID.
    pub fn get_keyframe(&self, id: KeyFrameId) -> Option<&KeyFrame> {
        self.keyframes.get(&id)
    }

    /// Get a mutable reference to a KeyFrame by ID.
    pub fn get_keyframe_mut(&mut self, id: KeyFrameId) -> Option<&mut KeyFrame> {
        self.keyframes.get_mut(&id)
    }

    /// Whether the KeyFrame is still resident in the map.
    pub fn contains_keyframe(&self, id: KeyFrameId) -> bool {
        self.keyframes.contains_key(&id)
    }

    /// Get all KeyFrame IDs.
    pub fn keyframe_ids(&self) -> impl Iterator<Item = &KeyFrameId> {
        self.keyframes.keys()
    }

    /// Get all KeyFrames.
    pub fn keyframes(&self) -> impl Iterator<Item = &KeyFrame> {
        self.keyframes.values()
    }

    /// Get the number of KeyFrames.
    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    /// Remove a KeyFrame and detach it from all covisible KeyFrames.
    pub fn remove_keyframe_full(&mut self, kf_id: KeyFrameId) -> Option<KeyFrame> {
        let kf = self.keyframes.remove(&kf_id)?;

        for cov_id in kf.get_covisibles() {
            if let Some(cov_kf) = self.keyframes.get_mut(cov_id) {
                cov_kf.erase_covisibility(kf_id);
            }
        }

        if self.last_keyframe_id == Some(kf_id) {
            self.last_keyframe_id = None;
        }

        Some(kf)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility
    // ─────────────────────────────────────────────────────────────────────────

    /// Set the covisibility weight between two KeyFrames on both sides.
    ///
    /// A weight of zero removes the edge. Returns false if either KeyFrame
    /// is not in the map.
    pub fn set_covisibility(&mut self, a: KeyFrameId, b: KeyFrameId, weight: usize) -> bool {
        if a == b || !self.contains_keyframe(a) || !self.contains_keyframe(b) {
            return false;
        }

        for (from, to) in [(a, b), (b, a)] {
            if let Some(kf) = self.keyframes.get_mut(&from) {
                if weight == 0 {
                    kf.erase_covisibility(to);
                } else {
                    kf.add_covisibility(to, weight);
                }
            }
        }
        true
    }

    /// Get the N best covisible KeyFrames of `kf_id`.
    ///
    /// Returns an empty list if the KeyFrame is not in the map.
    pub fn get_local_keyframes(&self, kf_id: KeyFrameId, n: usize) -> Vec<KeyFrameId> {
        self.keyframes
            .get(&kf_id)
            .map(|kf| kf.get_best_covisibles(n))
            .unwrap_or_default()
    }

    /// Direct covisibility neighbors of `kf_id`.
    pub fn get_connected_keyframes(&self, kf_id: KeyFrameId) -> HashSet<KeyFrameId> {
        self.keyframes
            .get(&kf_id)
            .map(|kf| kf.connected_keyframes())
            .unwrap_or_default()
    }

    /// Remove all KeyFrames.
    pub fn clear(&mut self) {
        self.keyframes.clear();
        self.next_kf_id = 0;
        self.last_keyframe_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bow(words: &[u32]) -> BowVector {
        words.iter().map(|&w| (w, 1.0)).collect()
    }

    #[test]
    fn test_create_keyframe() {
        let mut map = Map::new();

        let kf_id = map.create_keyframe(1_000_000, bow(&[1, 2]));

        assert_eq!(kf_id, KeyFrameId::new(0));
        assert_eq!(map.num_keyframes(), 1);
        assert_eq!(map.last_keyframe_id(), Some(kf_id));

        let kf = map.get_keyframe(kf_id).unwrap();
        assert_eq!(kf.timestamp_ns, 1_000_000);
        assert_eq!(kf.num_words(), 2);
    }

    #[test]
    fn test_add_keyframe_advances_id_counter() {
        let mut map = Map::new();
        map.add_keyframe(KeyFrame::new(KeyFrameId::new(7), 0, bow(&[0])));

        let next = map.create_keyframe(1, bow(&[1]));
        assert_eq!(next, KeyFrameId::new(8));
    }

    #[test]
    fn test_set_covisibility_is_bidirectional() {
        let mut map = Map::new();
        let a = map.create_keyframe(0, bow(&[0]));
        let b = map.create_keyframe(1, bow(&[1]));
        let c = map.create_keyframe(2, bow(&[2]));

        assert!(map.set_covisibility(a, b, 40));
        assert!(map.set_covisibility(a, c, 80));
        assert!(!map.set_covisibility(a, KeyFrameId::new(99), 10));
        assert!(!map.set_covisibility(a, a, 10));

        assert_eq!(map.get_local_keyframes(a, 10), vec![c, b]);
        assert_eq!(map.get_local_keyframes(b, 10), vec![a]);
        assert!(map.get_connected_keyframes(c).contains(&a));

        // Zero weight removes the edge
        assert!(map.set_covisibility(a, b, 0));
        assert_eq!(map.get_local_keyframes(a, 10), vec![c]);
        assert!(map.get_connected_keyframes(b).is_empty());
    }

    #[test]
    fn test_remove_keyframe_full() {
        let mut map = Map::new();
        let a = map.create_keyframe(0, bow(&[0]));
        let b = map.create_keyframe(1, bow(&[1]));
        map.set_covisibility(a, b, 15);

        let removed = map.remove_keyframe_full(b).unwrap();
        assert_eq!(removed.id, b);
        assert!(!map.contains_keyframe(b));
        assert!(map.get_keyframe(b).is_none());
        assert!(map.get_connected_keyframes(a).is_empty());
        assert!(map.remove_keyframe_full(b).is_none());
    }
}
