//! Command line configuration.
//!
use std::{path::PathBuf, time::Duration};

use cam_sensor::sensors::{CaptureConstraints, Facing};
use clap::Parser;

use crate::{
    detection::DetectionConfig,
    nn::{ModelSource, DEFAULT_LABELS_URL, DEFAULT_MODEL_URL},
    rules::{default_rules, TargetRule, LLAMA_CLASS},
    session::DetectorConfig,
};

#[derive(Parser, Debug)]
#[clap(author, version)]
pub struct Args {
    /// Address to serve the detector page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    pub server_address: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    pub device: String,

    /// FourCC capture format
    #[clap(long, default_value = "MJPG")]
    pub format: String,

    /// Ideal and maximum frame width
    #[clap(long, default_value_t = 1280)]
    pub width: u32,

    /// Ideal and maximum frame height
    #[clap(long, default_value_t = 720)]
    pub height: u32,

    /// Preferred camera direction
    #[clap(long, value_enum, default_value_t = Facing::Environment)]
    pub facing: Facing,

    /// Milliseconds between two detection ticks
    #[clap(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Target rule `class=pattern[,pattern...]`, the first rule matching the top label wins
    #[clap(long = "target", default_values_t = default_rules())]
    pub targets: Vec<TargetRule>,

    /// Classes which play the feedback sound when matched
    #[clap(long = "sound-target", default_values_t = vec![LLAMA_CLASS.to_owned()])]
    pub sound_targets: Vec<String>,

    /// Consecutive failed ticks before showing the error, 0 never gives up
    #[clap(long, default_value_t = 3)]
    pub max_failures: u32,

    /// Consecutive capture errors before the camera stream counts as inactive
    #[clap(long, default_value_t = 25, value_parser = clap::value_parser!(u32).range(1..))]
    pub capture_failure_limit: u32,

    /// Number of ranked predictions kept per tick
    #[clap(long, default_value_t = 3)]
    pub top_k: usize,

    /// Directory holding the model and labels, defaults to the user cache directory
    #[clap(long)]
    pub model_dir: Option<PathBuf>,

    /// Where to download the ONNX model from if missing
    #[clap(long, default_value = DEFAULT_MODEL_URL)]
    pub model_url: String,

    /// Where to download the labels from if missing
    #[clap(long, default_value = DEFAULT_LABELS_URL)]
    pub labels_url: String,

    /// Never download model files
    #[clap(long)]
    pub offline: bool,

    /// Sound played on a match, the page beeps if none is given
    #[clap(long)]
    pub sound_file: Option<PathBuf>,
}

impl Args {
    pub fn detector_config(&self) -> DetectorConfig {
        let rules = self
            .targets
            .iter()
            .cloned()
            .map(|mut rule| {
                rule.sound = self.sound_targets.contains(&rule.class);
                rule
            })
            .collect();

        DetectorConfig {
            constraints: CaptureConstraints {
                device: self.device.clone(),
                format: self.format.clone(),
                width: self.width,
                height: self.height,
                facing: self.facing,
            },
            detection: DetectionConfig {
                interval: Duration::from_millis(self.interval_ms),
                rules,
                max_consecutive_failures: self.max_failures,
            },
            capture_failure_limit: self.capture_failure_limit,
        }
    }

    pub fn model_source(&self) -> ModelSource {
        let dir = self.model_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("llama_detector")
        });

        ModelSource {
            dir,
            model_url: self.model_url.clone(),
            labels_url: self.labels_url.clone(),
            offline: self.offline,
        }
    }
}
