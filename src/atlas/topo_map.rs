//! Topological map - KeyFrames addressed by id, possibly not resident.
//!
//! In a distributed setup the keyframe database runs next to tracking while
//! the bulk of the map lives elsewhere. Everything the database needs to
//! know about a KeyFrame that is not held in memory is resolved by id
//! through a [`TopoMap`]. How the lookup travels (RPC, shared memory, a
//! local cache) is up to the implementation.

use std::collections::HashSet;

use thiserror::Error;

use crate::atlas::map::KeyFrameId;
use crate::vocabulary::BowVector;

/// Failures of a topological map lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopoMapError {
    #[error("topological map unreachable: {0}")]
    Unreachable(String),

    #[error("keyframe {0} unknown to the topological map")]
    UnknownKeyFrame(KeyFrameId),
}

/// Id-addressed view of the covisibility graph and BoW vectors.
pub trait TopoMap: Send + Sync {
    /// Direct covisibility neighbors of `id`.
    fn connected_keyframes(&self, id: KeyFrameId) -> Result<HashSet<KeyFrameId>, TopoMapError>;

    /// BoW vector of `id`.
    fn bow_vector(&self, id: KeyFrameId) -> Result<BowVector, TopoMapError>;

    /// Up to `n` most strongly connected neighbors of `id`, best first.
    fn best_covisibles(&self, id: KeyFrameId, n: usize) -> Result<Vec<KeyFrameId>, TopoMapError>;
}
