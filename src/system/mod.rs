//! State shared between the threads that build and query the map.

pub mod shared_state;

pub use shared_state::SharedState;
