//! Tracking-side types used by place recognition.
//!
//! When the Tracker loses the camera it queries the keyframe database with
//! the current [`Frame`] to find relocalization candidates.

pub mod tracking_frame;

pub use tracking_frame::{Frame, FrameId};
