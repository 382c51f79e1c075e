//! Watch a webcam stream for llamas and drive a browser UI with what the classifier sees.

pub mod acquirer;
pub mod config;
pub mod detection;
pub mod endpoints;
pub mod meter;
pub mod nn;
pub mod page;
pub mod rules;
pub mod session;
pub mod ui;
pub mod utils;
