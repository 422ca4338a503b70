//! Loop Closing module.
//!
//! Detects when the camera revisits a place already in the map.
//!
//! # Architecture
//!
//! 1. **Detection** (`detector.rs`): keyframe database queries with a score
//!    floor derived from covisible keyframes, plus consistency checking
//! 2. **Thread** (`loop_closer.rs`): loop closing thread receiving keyframe
//!    ids and publishing consistent loops
//!
//! # Threading Model
//!
//! The LoopCloser runs in its own thread and receives keyframe ids over a
//! channel. Map read locks are taken per lookup, never across scoring.

pub mod detector;
pub mod loop_closer;

pub use detector::{detect_loop_candidates, ConsistencyChecker, LoopCandidate, LoopDetectorConfig};
pub use loop_closer::{spawn_loop_closer, LoopCloser, LoopCloserConfig, LoopCloserStats};
