pub mod atlas;
pub mod loop_closing;
pub mod system;
pub mod tracking;
pub mod vocabulary;
