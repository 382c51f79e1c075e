//! Protocol definition for the UI state stream.
//!
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One ranked label of the classifier output.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, probability: f32) -> Self {
        Self {
            class_name: class_name.into(),
            probability,
        }
    }
}

/// Pages of the UI, only one is visible at a time.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Intro,
    Detector,
}

/// Whether camera and model can be used on this machine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    #[default]
    Supported,
    Unsupported,
}

/// Complete visual state of the UI as rendered by the page.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UiState {
    pub page: Page,
    pub support: Support,
    /// Raw error text shown on the unsupported panel.
    pub error: Option<String>,
    /// Style classes set on the page body.
    pub classes: BTreeSet<String>,
    /// Bumped every time the feedback sound should play.
    pub sound_seq: u64,
    /// Top prediction of the most recent tick.
    pub top: Option<Prediction>,
}

impl UiState {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}
