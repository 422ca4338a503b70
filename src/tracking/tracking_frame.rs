//! Tracking `Frame` representation for place recognition.
//!
//! A `Frame` is what the Tracker holds for the current image. When tracking
//! is lost, its Bag-of-Words vector is matched against the keyframe database
//! to find relocalization candidates. Frames are never inserted into the
//! database; their ids live in a separate space from KeyFrame ids.

use crate::vocabulary::BowVector;

/// Unique identifier for a tracked Frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Create a new FrameId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// A tracked frame, used only as a relocalization query.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,

    /// Bag-of-Words vector of the frame's features.
    pub bow_vector: BowVector,
}

impl Frame {
    pub fn new(id: FrameId, bow_vector: BowVector) -> Self {
        Self { id, bow_vector }
    }
}
