//! Visual vocabulary interface for Bag-of-Words place recognition.
//!
//! The vocabulary tree itself (k-means hierarchy, descriptor quantization,
//! TF-IDF weighting) lives outside this crate. The keyframe database only
//! needs two things from it:
//!
//! - the number of visual words, to size the inverted file
//! - a similarity score between two [`BowVector`]s
//!
//! # Key Types
//!
//! - [`BowVector`]: Sparse histogram of word weights produced per keyframe/frame
//! - [`Vocabulary`]: The scoring interface consumed by the database
//! - [`L1Vocabulary`]: DBoW2's L1 score over a vocabulary of known size

use std::collections::HashMap;

/// Index of a visual word (leaf of the vocabulary tree).
///
/// Valid word ids lie in `[0, vocabulary.size())`.
pub type WordId = u32;

/// Bag-of-Words vector: word_id -> weight.
///
/// Used for place recognition and loop closure detection. Entries with a
/// zero weight are not expected; every key is a word present in the image.
pub type BowVector = HashMap<WordId, f64>;

/// Scoring interface of a visual vocabulary.
///
/// Implementations must be symmetric and return higher values for vectors
/// that share more words with similar weights. Scores are expected to lie
/// roughly in `[0, 1]`.
pub trait Vocabulary: Send + Sync {
    /// Number of visual words. Fixed for the lifetime of the vocabulary.
    fn size(&self) -> usize;

    /// Similarity between two BoW vectors.
    fn score(&self, v1: &BowVector, v2: &BowVector) -> f64;
}

/// Vocabulary scored with the DBoW2 L1 metric.
///
/// Both vectors are L1-normalized before comparison, so the score is
/// `1 - 0.5 * ||v1/|v1| - v2/|v2|||_1`, in `[0, 1]` where 1 means identical.
#[derive(Debug, Clone)]
pub struct L1Vocabulary {
    num_words: usize,
}

impl L1Vocabulary {
    /// Create a scorer for a vocabulary with `num_words` leaves.
    pub fn new(num_words: usize) -> Self {
        Self { num_words }
    }
}

impl Vocabulary for L1Vocabulary {
    fn size(&self) -> usize {
        self.num_words
    }

    fn score(&self, v1: &BowVector, v2: &BowVector) -> f64 {
        let n1 = l1_norm(v1);
        let n2 = l1_norm(v2);
        if n1 <= 0.0 || n2 <= 0.0 {
            return 0.0;
        }

        let mut diff_sum = 0.0;

        // Sum |v1[i] - v2[i]| for all words
        for (word_id, w1) in v1 {
            let w2 = v2.get(word_id).copied().unwrap_or(0.0) / n2;
            diff_sum += (w1 / n1 - w2).abs();
        }

        // Add v2 entries not in v1
        for (word_id, w2) in v2 {
            if !v1.contains_key(word_id) {
                diff_sum += (w2 / n2).abs();
            }
        }

        (1.0 - 0.5 * diff_sum).max(0.0)
    }
}

fn l1_norm(v: &BowVector) -> f64 {
    v.values().map(|w| w.abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bow(entries: &[(WordId, f64)]) -> BowVector {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_bow_score() {
        let vocab = L1Vocabulary::new(10);

        let v1 = bow(&[(0, 0.5), (1, 0.5)]);
        let v2 = bow(&[(0, 0.5), (1, 0.5)]);

        // Identical vectors should score 1.0
        let score = vocab.score(&v1, &v2);
        assert!((score - 1.0).abs() < 1e-10);

        // Completely different vectors
        let v3 = bow(&[(2, 0.5), (3, 0.5)]);
        let score2 = vocab.score(&v1, &v3);
        assert!(score2 < 0.01);
    }

    #[test]
    fn test_bow_score_is_scale_invariant() {
        let vocab = L1Vocabulary::new(10);

        let v1 = bow(&[(0, 1.0), (1, 1.0)]);
        let v2 = bow(&[(0, 3.0), (1, 3.0)]);
        assert!((vocab.score(&v1, &v2) - 1.0).abs() < 1e-10);

        // Half the mass overlaps
        let q = bow(&[(1, 1.0)]);
        assert!((vocab.score(&v1, &q) - 0.5).abs() < 1e-10);
        assert!((vocab.score(&q, &v1) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_empty_vector_scores_zero() {
        let vocab = L1Vocabulary::new(4);
        let empty = BowVector::new();
        let v = bow(&[(0, 1.0)]);

        assert_eq!(vocab.score(&empty, &v), 0.0);
        assert_eq!(vocab.score(&empty, &empty), 0.0);
        assert_eq!(vocab.size(), 4);
    }
}
