//! Candidate ranking: everything a query does after releasing the index lock.
//!
//! Given the candidates gathered from the inverted file (with their
//! shared-word counts), the pipeline:
//! 1. Keeps candidates sharing more than `floor(0.8 * max)` words
//! 2. Scores them against the query with the vocabulary
//! 3. Accumulates scores over each candidate's 10 best covisible KeyFrames
//! 4. Returns the best KeyFrame of every group scoring above
//!    `0.75 * best group score`, without duplicates

use std::collections::HashSet;

use tracing::debug;

use crate::atlas::map::KeyFrameId;
use crate::vocabulary::{BowVector, Vocabulary};

use super::scratch::QueryScratch;
use super::source::KeyFrameSource;

/// Number of covisible KeyFrames grouped with each candidate.
pub(crate) const COVISIBILITY_GROUP_SIZE: usize = 10;

/// Groups must score above this fraction of the best group to be returned.
pub(crate) const RETAIN_RATIO: f64 = 0.75;

/// What the query is for. Decides the score floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum QueryKind {
    /// Loop detection: candidates scoring below `min_score` are not grouped,
    /// and `min_score` seeds the best group score.
    Loop { min_score: f64 },
    /// Relocalization: every scored candidate is grouped, seed is 0.
    Relocalization,
}

impl QueryKind {
    fn accepts(&self, score: f64) -> bool {
        match *self {
            QueryKind::Loop { min_score } => score >= min_score,
            QueryKind::Relocalization => true,
        }
    }

    fn acc_score_seed(&self) -> f64 {
        match *self {
            QueryKind::Loop { min_score } => min_score,
            QueryKind::Relocalization => 0.0,
        }
    }
}

/// Run the unlocked stages of a query over its gathered candidates.
pub(crate) fn rank_candidates<S>(
    query_bow: &BowVector,
    mut scratch: QueryScratch,
    source: &S,
    vocabulary: &dyn Vocabulary,
    kind: QueryKind,
) -> Result<Vec<KeyFrameId>, S::Error>
where
    S: KeyFrameSource + ?Sized,
{
    if scratch.is_empty() {
        return Ok(Vec::new());
    }

    // Only compare against those keyframes that share enough words
    let min_common_words = scratch.min_common_words();

    let mut score_and_match: Vec<(f64, KeyFrameId)> = Vec::new();
    for kf_id in scratch.candidates_above(min_common_words) {
        let score = match source.bow_vector(kf_id)? {
            Some(bow) => vocabulary.score(query_bow, &bow),
            None => continue,
        };

        // Stored even when below the floor: it still counts for neighbors
        scratch.set_score(kf_id, score);
        if kind.accepts(score) {
            score_and_match.push((score, kf_id));
        }
    }

    if score_and_match.is_empty() {
        debug!(
            candidates = scratch.num_candidates(),
            min_common_words, "no candidate passed similarity scoring"
        );
        return Ok(Vec::new());
    }

    // Accumulate score by covisibility
    let mut acc_score_and_match: Vec<(f64, KeyFrameId)> = Vec::with_capacity(score_and_match.len());
    let mut best_acc_score = kind.acc_score_seed();

    for &(score, kf_id) in &score_and_match {
        let neighbors = source.best_covisibles(kf_id, COVISIBILITY_GROUP_SIZE)?;

        let mut best_score = score;
        let mut acc_score = score;
        let mut best_kf = kf_id;
        for neighbor in neighbors {
            if let Some(neighbor_score) = scratch.score(neighbor) {
                acc_score += neighbor_score;
                if neighbor_score > best_score {
                    best_kf = neighbor;
                    best_score = neighbor_score;
                }
            }
        }

        acc_score_and_match.push((acc_score, best_kf));
        if acc_score > best_acc_score {
            best_acc_score = acc_score;
        }
    }

    let min_score_to_retain = RETAIN_RATIO * best_acc_score;

    let mut already_added: HashSet<KeyFrameId> = HashSet::new();
    let mut candidates = Vec::with_capacity(acc_score_and_match.len());
    for (acc_score, kf_id) in acc_score_and_match {
        if acc_score > min_score_to_retain && already_added.insert(kf_id) {
            candidates.push(kf_id);
        }
    }

    debug!(
        gathered = scratch.num_candidates(),
        scored = score_and_match.len(),
        returned = candidates.len(),
        best_acc_score,
        "ranked place recognition candidates"
    );

    Ok(candidates)
}
