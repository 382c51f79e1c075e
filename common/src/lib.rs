//! Common code shared between `detector_server` and the browser page it serves.
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
