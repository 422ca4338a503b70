//! Per-query bookkeeping, discarded when the query returns.
//!
//! Every query owns its scratch state. Nothing is written on the KeyFrames
//! themselves, so any number of loop and relocalization queries may run at
//! the same time.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::atlas::map::KeyFrameId;

/// Candidates must share more than this fraction of the best candidate's
/// shared-word count to be scored.
pub(crate) const COMMON_WORDS_RATIO: f64 = 0.8;

/// Shared-word counts and similarity scores of one query's candidates.
#[derive(Debug, Default)]
pub(crate) struct QueryScratch {
    /// Candidates in the order they were first seen.
    order: Vec<KeyFrameId>,
    shared_words: HashMap<KeyFrameId, usize>,
    scores: HashMap<KeyFrameId, f64>,
}

impl QueryScratch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Count one more word shared between the query and `id`.
    pub(crate) fn record_shared_word(&mut self, id: KeyFrameId) {
        match self.shared_words.entry(id) {
            Entry::Occupied(mut count) => *count.get_mut() += 1,
            Entry::Vacant(slot) => {
                slot.insert(1);
                self.order.push(id);
            }
        }
    }

    /// Drop every candidate for which `keep` returns false.
    pub(crate) fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(KeyFrameId) -> bool,
    {
        let shared_words = &mut self.shared_words;
        self.order.retain(|&id| {
            let kept = keep(id);
            if !kept {
                shared_words.remove(&id);
            }
            kept
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn num_candidates(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn shared_words(&self, id: KeyFrameId) -> usize {
        self.shared_words.get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn max_common_words(&self) -> usize {
        self.shared_words.values().copied().max().unwrap_or(0)
    }

    /// `floor(0.8 * max_common_words)`.
    pub(crate) fn min_common_words(&self) -> usize {
        (self.max_common_words() as f64 * COMMON_WORDS_RATIO) as usize
    }

    /// Candidates sharing strictly more than `min_common` words, in first-seen order.
    pub(crate) fn candidates_above(&self, min_common: usize) -> Vec<KeyFrameId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.shared_words(*id) > min_common)
            .collect()
    }

    pub(crate) fn set_score(&mut self, id: KeyFrameId, score: f64) {
        self.scores.insert(id, score);
    }

    /// Score of `id`, if it was scored by this query.
    pub(crate) fn score(&self, id: KeyFrameId) -> Option<f64> {
        self.scores.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(id: u64) -> KeyFrameId {
        KeyFrameId::new(id)
    }

    #[test]
    fn test_shared_word_counting() {
        let mut scratch = QueryScratch::new();
        assert!(scratch.is_empty());
        assert_eq!(scratch.max_common_words(), 0);

        scratch.record_shared_word(kf(2));
        scratch.record_shared_word(kf(1));
        scratch.record_shared_word(kf(2));

        assert_eq!(scratch.num_candidates(), 2);
        assert_eq!(scratch.shared_words(kf(2)), 2);
        assert_eq!(scratch.shared_words(kf(1)), 1);
        assert_eq!(scratch.shared_words(kf(9)), 0);
        assert_eq!(scratch.max_common_words(), 2);
    }

    #[test]
    fn test_retain_drops_counts_and_order() {
        let mut scratch = QueryScratch::new();
        for id in [3, 1, 3, 2, 3] {
            scratch.record_shared_word(kf(id));
        }

        scratch.retain(|id| id != kf(3));

        assert_eq!(scratch.num_candidates(), 2);
        assert_eq!(scratch.shared_words(kf(3)), 0);
        assert_eq!(scratch.max_common_words(), 1);
        assert_eq!(scratch.candidates_above(0), vec![kf(1), kf(2)]);
    }

    #[test]
    fn test_min_common_words_floors() {
        let mut scratch = QueryScratch::new();
        for _ in 0..5 {
            scratch.record_shared_word(kf(1));
        }
        // floor(0.8 * 5) = 4
        assert_eq!(scratch.min_common_words(), 4);

        for _ in 0..4 {
            scratch.record_shared_word(kf(2));
        }
        assert_eq!(scratch.candidates_above(4), vec![kf(1)]);

        let mut single = QueryScratch::new();
        single.record_shared_word(kf(3));
        // floor(0.8 * 1) = 0, so a single shared word survives
        assert_eq!(single.min_common_words(), 0);
        assert_eq!(single.candidates_above(0), vec![kf(3)]);
    }

    #[test]
    fn test_candidates_keep_first_seen_order() {
        let mut scratch = QueryScratch::new();
        for id in [5, 3, 5, 8, 3] {
            scratch.record_shared_word(kf(id));
        }
        assert_eq!(scratch.candidates_above(0), vec![kf(5), kf(3), kf(8)]);
    }

    #[test]
    fn test_scores() {
        let mut scratch = QueryScratch::new();
        scratch.record_shared_word(kf(1));
        assert_eq!(scratch.score(kf(1)), None);

        scratch.set_score(kf(1), 0.4);
        assert_eq!(scratch.score(kf(1)), Some(0.4));
    }
}
