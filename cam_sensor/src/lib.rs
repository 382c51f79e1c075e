//! Webcam access for the llama detector.
pub mod sensors;

/// Error type.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
