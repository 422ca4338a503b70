//! Shared state between the mapping, tracking and loop closing threads.
//!
//! The `SharedState` struct holds the map and the keyframe database that
//! indexes it. Lock order is lifecycle, then map, then database. Queries
//! never hold a map lock while the database lock is held: they walk the
//! index first, then resolve each candidate with its own short read lock.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::atlas::keyframe_db::KeyFrameDatabase;
use crate::atlas::map::{KeyFrameId, Map};
use crate::tracking::Frame;
use crate::vocabulary::{BowVector, Vocabulary};

/// Shared state accessible by every thread that touches the map.
pub struct SharedState {
    /// KeyFrames and their covisibility graph.
    /// Protected by RwLock: lookups read, insertion and culling write.
    pub map: RwLock<Map>,

    /// Inverted index over the KeyFrames of `map`.
    pub keyframe_db: KeyFrameDatabase,

    /// Serializes insert, cull and reset so the map and the index never
    /// disagree once a lifecycle operation returns.
    lifecycle: Mutex<()>,

    /// Request worker threads to finish processing and exit.
    pub shutdown_requested: AtomicBool,
}

impl SharedState {
    /// Create a new SharedState with an empty map and database.
    pub fn new(vocabulary: Arc<dyn Vocabulary>) -> Arc<Self> {
        Arc::new(Self {
            map: RwLock::new(Map::new()),
            keyframe_db: KeyFrameDatabase::new(vocabulary),
            lifecycle: Mutex::new(()),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Create a KeyFrame, connect it in the covisibility graph and index it.
    ///
    /// Edges to KeyFrames that are not in the map are ignored.
    ///
    /// # Panics
    /// Panics if `bow` contains a word outside the vocabulary. The KeyFrame
    /// is not inserted in that case.
    pub fn insert_keyframe(
        &self,
        timestamp_ns: u64,
        bow: BowVector,
        covisibility: &[(KeyFrameId, usize)],
    ) -> KeyFrameId {
        let vocabulary_size = self.keyframe_db.vocabulary_size();
        assert!(
            bow.keys().all(|&w| (w as usize) < vocabulary_size),
            "BoW vector contains a word outside vocabulary of size {}",
            vocabulary_size
        );

        let _lifecycle = self.lifecycle.lock();

        let mut map = self.map.write();
        let kf_id = map.create_keyframe(timestamp_ns, bow);
        for &(other, weight) in covisibility {
            if !map.set_covisibility(kf_id, other, weight) {
                debug!("Skipping covisibility edge {} -> {}: unknown keyframe", kf_id, other);
            }
        }

        // Index under a read lock so lookups of running queries proceed
        let map = RwLockWriteGuard::downgrade(map);
        if let Some(kf) = map.get_keyframe(kf_id) {
            self.keyframe_db.add(kf);
        }
        kf_id
    }

    /// Remove a KeyFrame from the database and then from the map.
    ///
    /// Returns `false` if the KeyFrame was not in the map.
    pub fn cull_keyframe(&self, kf_id: KeyFrameId) -> bool {
        let _lifecycle = self.lifecycle.lock();

        {
            let map = self.map.read();
            match map.get_keyframe(kf_id) {
                Some(kf) => self.keyframe_db.erase(kf),
                None => return false,
            }
        }

        self.map.write().remove_keyframe_full(kf_id).is_some()
    }

    /// Loop closure candidates for a KeyFrame of the map.
    ///
    /// Returns an empty list if the KeyFrame is not in the map.
    pub fn loop_candidates(&self, kf_id: KeyFrameId, min_score: f64) -> Vec<KeyFrameId> {
        let bow = match self.map.read().get_keyframe(kf_id) {
            Some(kf) => kf.bow_vector().clone(),
            None => return vec![],
        };
        unwrap_infallible(
            self.keyframe_db
                .detect_loop_candidates_with(kf_id, &bow, &self.map, min_score),
        )
    }

    /// Relocalization candidates for a tracked Frame.
    pub fn relocalization_candidates(&self, frame: &Frame) -> Vec<KeyFrameId> {
        unwrap_infallible(
            self.keyframe_db
                .detect_relocalization_candidates_with(frame, &self.map),
        )
    }

    /// Drop every KeyFrame from the database and the map.
    pub fn reset(&self) {
        let _lifecycle = self.lifecycle.lock();
        let mut map = self.map.write();
        self.keyframe_db.clear();
        map.clear();
    }

    /// Request shutdown of the worker threads.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
