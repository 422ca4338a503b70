//! KeyFrameDatabase - inverted-file place recognition database.
//!
//! The database keeps one posting list per visual word of the vocabulary.
//! A KeyFrame is listed under every word present in its BoW vector, so the
//! KeyFrames sharing at least one word with a query are found by walking
//! only the query's posting lists.
//!
//! Three queries are supported:
//! - [`KeyFrameDatabase::detect_loop_candidates`]: loop closing over the
//!   in-process [`Map`]
//! - [`KeyFrameDatabase::detect_loop_candidates_in_topo_map`]: the same,
//!   resolving KeyFrames through a [`TopoMap`]
//! - [`KeyFrameDatabase::detect_relocalization_candidates`]: candidates for
//!   a lost [`Frame`]
//!
//! # Locking
//!
//! `add`, `erase` and `clear` hold the index lock for their whole duration.
//! Queries hold it only while walking the posting lists of the query words;
//! residency checks, scoring and covisibility re-ranking run unlocked on
//! query-local state.

mod ranking;
mod scratch;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::atlas::map::{KeyFrame, KeyFrameId, Map};
use crate::atlas::topo_map::{TopoMap, TopoMapError};
use crate::tracking::Frame;
use crate::vocabulary::{BowVector, Vocabulary, WordId};

use self::ranking::{rank_candidates, QueryKind};
use self::scratch::QueryScratch;
pub use self::source::{KeyFrameSource, TopoSource};

/// Posting list entry: the KeyFrame is referenced by id only.
///
/// Whether the KeyFrame still exists is decided by the [`KeyFrameSource`]
/// used at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFrameEntry {
    pub id: KeyFrameId,
}

/// Inverted-file database over a fixed vocabulary.
pub struct KeyFrameDatabase {
    vocabulary: Arc<dyn Vocabulary>,
    /// Posting lists, indexed by word id.
    inverted_file: Mutex<Vec<Vec<KeyFrameEntry>>>,
}

impl KeyFrameDatabase {
    /// Create an empty database with one posting list per vocabulary word.
    pub fn new(vocabulary: Arc<dyn Vocabulary>) -> Self {
        let num_words = vocabulary.size();
        Self {
            vocabulary,
            inverted_file: Mutex::new(vec![Vec::new(); num_words]),
        }
    }

    /// Number of words (posting lists) of the underlying vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.size()
    }

    /// The vocabulary used for scoring.
    pub fn vocabulary(&self) -> &dyn Vocabulary {
        &*self.vocabulary
    }

    /// Register a KeyFrame under every word of its BoW vector with a
    /// nonzero weight.
    ///
    /// Adding the same KeyFrame twice duplicates its postings.
    ///
    /// # Panics
    ///
    /// Panics if the BoW vector references a word outside the vocabulary.
    pub fn add(&self, kf: &KeyFrame) {
        let bow = kf.bow_vector();
        self.check_words(bow);

        {
            let mut inverted_file = self.inverted_file.lock();
            for word_id in posted_words(bow) {
                inverted_file[word_id as usize].push(KeyFrameEntry { id: kf.id });
            }
        }

        debug!("Add {} to keyframe database ({} words)", kf.id, kf.num_words());
    }

    /// Remove a KeyFrame from the posting lists of its words.
    ///
    /// At most one entry is removed per word. Erasing a KeyFrame that was
    /// never added is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the BoW vector references a word outside the vocabulary.
    pub fn erase(&self, kf: &KeyFrame) {
        let bow = kf.bow_vector();
        self.check_words(bow);

        let mut removed = 0;
        {
            let mut inverted_file = self.inverted_file.lock();
            for word_id in posted_words(bow) {
                // List of keyframes that share the word
                let postings = &mut inverted_file[word_id as usize];
                if let Some(pos) = postings.iter().position(|entry| entry.id == kf.id) {
                    postings.remove(pos);
                    removed += 1;
                }
            }
        }

        debug!("Erase {} from keyframe database ({} postings)", kf.id, removed);
    }

    /// Drop every posting and start over with empty lists.
    pub fn clear(&self) {
        let num_words = self.vocabulary.size();
        let mut inverted_file = self.inverted_file.lock();
        *inverted_file = vec![Vec::new(); num_words];
    }

    /// Total number of postings across all words.
    pub fn num_postings(&self) -> usize {
        self.inverted_file.lock().iter().map(Vec::len).sum()
    }

    /// KeyFrames listed under `word_id`, or `None` if the word is out of range.
    pub fn postings_for(&self, word_id: u32) -> Option<Vec<KeyFrameId>> {
        let inverted_file = self.inverted_file.lock();
        inverted_file
            .get(word_id as usize)
            .map(|postings| postings.iter().map(|entry| entry.id).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Loop candidates for a KeyFrame of the in-process map.
    ///
    /// KeyFrames directly connected to `kf` in the covisibility graph (and
    /// `kf` itself) are never returned. Candidates scoring below
    /// `min_score` do not form groups. The result has no duplicates and no
    /// meaningful order.
    pub fn detect_loop_candidates(&self, kf: &KeyFrame, map: &Map, min_score: f64) -> Vec<KeyFrameId> {
        let excluded = kf.connected_keyframes();
        match self.detect_loop(kf.id, kf.bow_vector(), excluded, map, min_score) {
            Ok(candidates) => candidates,
            Err(never) => match never {},
        }
    }

    /// Loop candidates resolving every KeyFrame through `source`.
    ///
    /// The exclusion set is `source.connected_keyframes(kf_id)` plus `kf_id`
    /// itself. With the shared `RwLock<Map>` as source, the map lock is only
    /// held for each individual lookup.
    pub fn detect_loop_candidates_with<S>(
        &self,
        kf_id: KeyFrameId,
        bow: &BowVector,
        source: &S,
        min_score: f64,
    ) -> Result<Vec<KeyFrameId>, S::Error>
    where
        S: KeyFrameSource + ?Sized,
    {
        let excluded = source.connected_keyframes(kf_id)?;
        self.detect_loop(kf_id, bow, excluded, source, min_score)
    }

    /// Loop candidates resolving every KeyFrame through a topological map.
    ///
    /// Same ranking as [`detect_loop_candidates`](Self::detect_loop_candidates);
    /// the exclusion set, candidate BoW vectors and covisibility neighbors
    /// all come from `topo`. `kf` itself is excluded even when `topo` does
    /// not list it among its own connections. A failed lookup fails the
    /// query and leaves the database untouched.
    pub fn detect_loop_candidates_in_topo_map<T>(
        &self,
        kf: &KeyFrame,
        topo: &T,
        min_score: f64,
    ) -> Result<Vec<KeyFrameId>, TopoMapError>
    where
        T: TopoMap + ?Sized,
    {
        self.detect_loop_candidates_with(kf.id, kf.bow_vector(), &TopoSource::new(topo), min_score)
    }

    /// Relocalization candidates for a Frame that lost tracking.
    ///
    /// Nothing is excluded and no score floor applies before grouping.
    pub fn detect_relocalization_candidates(&self, frame: &Frame, map: &Map) -> Vec<KeyFrameId> {
        match self.detect_relocalization_candidates_with(frame, map) {
            Ok(candidates) => candidates,
            Err(never) => match never {},
        }
    }

    /// Relocalization candidates resolving every KeyFrame through `source`.
    pub fn detect_relocalization_candidates_with<S>(&self, frame: &Frame, source: &S) -> Result<Vec<KeyFrameId>, S::Error>
    where
        S: KeyFrameSource + ?Sized,
    {
        let scratch = self.gather(&frame.bow_vector, &HashSet::new(), source);
        debug!(
            "Relocalization query for frame {}: {} keyframes share words",
            frame.id,
            scratch.num_candidates()
        );

        rank_candidates(
            &frame.bow_vector,
            scratch,
            source,
            &*self.vocabulary,
            QueryKind::Relocalization,
        )
    }

    fn detect_loop<S>(
        &self,
        query_id: KeyFrameId,
        bow: &BowVector,
        mut excluded: HashSet<KeyFrameId>,
        source: &S,
        min_score: f64,
    ) -> Result<Vec<KeyFrameId>, S::Error>
    where
        S: KeyFrameSource + ?Sized,
    {
        // A keyframe is never its own loop
        excluded.insert(query_id);

        let scratch = self.gather(bow, &excluded, source);
        debug!(
            "Loop query for {}: {} keyframes share words ({} excluded)",
            query_id,
            scratch.num_candidates(),
            excluded.len()
        );

        rank_candidates(bow, scratch, source, &*self.vocabulary, QueryKind::Loop { min_score })
    }

    /// Collect every resident KeyFrame sharing a word with `bow`, counting
    /// shared words.
    ///
    /// Only the posting list walk runs under the index lock. Residency is
    /// checked after the lock is released, so `source` may take locks of
    /// its own.
    fn gather<S>(&self, bow: &BowVector, excluded: &HashSet<KeyFrameId>, source: &S) -> QueryScratch
    where
        S: KeyFrameSource + ?Sized,
    {
        self.check_words(bow);

        let mut scratch = QueryScratch::new();
        {
            let inverted_file = self.inverted_file.lock();
            for word_id in posted_words(bow) {
                for entry in &inverted_file[word_id as usize] {
                    if !excluded.contains(&entry.id) {
                        scratch.record_shared_word(entry.id);
                    }
                }
            }
        }

        scratch.retain(|id| source.is_resident(id));
        scratch
    }

    fn check_words(&self, bow: &BowVector) {
        let num_words = self.vocabulary.size();
        if let Some(&word_id) = bow.keys().find(|&&w| w as usize >= num_words) {
            panic!(
                "word id {} outside vocabulary of {} words; BoW vector built with a different vocabulary",
                word_id, num_words
            );
        }
    }
}

/// Words a BoW vector is posted under. Zero weights mean the word is absent.
fn posted_words(bow: &BowVector) -> impl Iterator<Item = WordId> + '_ {
    bow.iter()
        .filter(|(_, &weight)| weight != 0.0)
        .map(|(&word_id, _)| word_id)
}

impl std::fmt::Debug for KeyFrameDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFrameDatabase")
            .field("vocabulary_size", &self.vocabulary.size())
            .field("num_postings", &self.num_postings())
            .finish()
    }
}
