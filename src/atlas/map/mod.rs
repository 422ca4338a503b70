//! Map module - KeyFrame registry for place recognition.
//!
//! This module contains:
//! - [`KeyFrame`] - Selected frames with their BoW vector and covisibility edges
//! - [`Map`] - Container owning KeyFrames, addressed by [`KeyFrameId`]
//!
//! # Architecture
//!
//! KeyFrames never hold references to each other. The covisibility graph is
//! stored as id-keyed adjacency lists on each KeyFrame, and all lookups go
//! through the Map:
//!
//! ```ignore
//! use vslam_place_recognition::atlas::map::Map;
//!
//! let mut map = Map::new();
//! let a = map.create_keyframe(timestamp_a, bow_a);
//! let b = map.create_keyframe(timestamp_b, bow_b);
//!
//! // 42 shared MapPoints between a and b
//! map.set_covisibility(a, b, 42);
//!
//! let neighbors = map.get_local_keyframes(a, 10);
//! ```

pub mod keyframe;
pub mod map;
pub mod types;

pub use keyframe::KeyFrame;
pub use map::Map;
pub use types::KeyFrameId;
