//! Atlas module - KeyFrame storage and place recognition.
//!
//! - [`map`] - KeyFrames and their covisibility graph, addressed by id
//! - [`keyframe_db`] - Inverted-file database for loop and relocalization queries
//! - [`topo_map`] - Id-addressed access to KeyFrames that are not resident

pub mod keyframe_db;
pub mod map;
pub mod topo_map;

// Re-export commonly used types
pub use keyframe_db::{KeyFrameDatabase, KeyFrameSource};
pub use map::{KeyFrame, KeyFrameId, Map};
pub use topo_map::{TopoMap, TopoMapError};
