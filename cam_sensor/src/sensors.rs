//! Sensors module.
//!
//! Opens a V4L2 capture device with resolution and facing hints and hands out a capture
//! function producing MJPEG frames.
use std::path::Path;

use rscam::{Camera, Config, Frame, IntervalInfo, ResolutionInfo};
use serde::{Deserialize, Serialize};
use simple_error::simple_error;

use crate::Error;

pub type CaptureFn = Box<dyn Fn() -> Option<Frame> + Send + Sync>;

/// Preferred direction the camera should face.
///
/// V4L2 does not report which way a device is facing, so this is only an advisory hint that
/// is logged with the selected device.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear-facing camera if available.
    #[default]
    Environment,
    User,
}

/// Hints for opening a capture stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CaptureConstraints {
    pub device: String,
    pub format: String,
    /// Ideal and maximum frame width.
    pub width: u32,
    /// Ideal and maximum frame height.
    pub height: u32,
    pub facing: Facing,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            format: "MJPG".into(),
            width: 1280,
            height: 720,
            facing: Facing::Environment,
        }
    }
}

/// Started camera with its capture function.
pub struct OpenedCamera {
    pub label: String,
    pub capture_fn: CaptureFn,
}

/// Open and start the camera described by `constraints`.
pub fn open_camera(constraints: &CaptureConstraints) -> Result<OpenedCamera, Error> {
    let format = constraints.format.as_bytes();
    if format.len() != 4 {
        return Err(simple_error!("Invalid FourCC format {:?}", constraints.format).into());
    }

    let mut cam = Camera::new(&constraints.device)?;
    log_supported_formats(&cam, &constraints.format);
    ensure_format_supported(&cam, format)?;

    let resolution = select_resolution(
        &cam.resolutions(format)?,
        (constraints.width, constraints.height),
    )
    .ok_or_else(|| simple_error!("No resolution found"))?;

    let frame_rate = select_frame_rate(&cam.intervals(format, resolution)?)
        .ok_or_else(|| simple_error!("No frame rate found"))?;

    cam.start(&Config {
        interval: frame_rate,
        resolution,
        format,
        ..Default::default()
    })?;

    let label = device_label(&constraints.device);
    log::info!(
        "Started camera {} at {}x{} ({}/{} s per frame), facing hint {:?}",
        &constraints.device,
        resolution.0,
        resolution.1,
        frame_rate.0,
        frame_rate.1,
        constraints.facing
    );

    let callback = move || cam.capture().ok();
    Ok(OpenedCamera {
        label,
        capture_fn: Box::new(callback),
    })
}

/// Human readable name of a video device as reported by the kernel.
pub fn device_label(device: &str) -> String {
    Path::new(device)
        .file_name()
        .map(|node| Path::new("/sys/class/video4linux").join(node).join("name"))
        .and_then(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| device.to_owned())
}

/// Select the resolution closest to the ideal without exceeding `max`.
///
/// For discrete resolutions, the largest one (by pixel count) fitting inside the bounds is
/// chosen. If none fits, the smallest one is taken. Stepwise ranges are clamped to the bounds
/// and snapped to the step grid.
pub fn select_resolution(info: &ResolutionInfo, max: (u32, u32)) -> Option<(u32, u32)> {
    match info {
        ResolutionInfo::Discretes(resolutions) => {
            let fitting = resolutions
                .iter()
                .filter(|res| res.0 <= max.0 && res.1 <= max.1)
                .max_by_key(|res| res.0 * res.1);

            fitting
                .or_else(|| resolutions.iter().min_by_key(|res| res.0 * res.1))
                .copied()
        }
        ResolutionInfo::Stepwise { min, max: upper, step } => Some((
            clamp_to_step(min.0, upper.0, step.0, max.0),
            clamp_to_step(min.1, upper.1, step.1, max.1),
        )),
    }
}

fn clamp_to_step(min: u32, upper: u32, step: u32, target: u32) -> u32 {
    let target = target.clamp(min, upper.max(min));
    match step {
        0 => target,
        step => min + (target - min) / step * step,
    }
}

/// Select the highest supported frame rate.
///
/// Intervals are given as `(numerator, denominator)` seconds per frame.
pub fn select_frame_rate(info: &IntervalInfo) -> Option<(u32, u32)> {
    match info {
        IntervalInfo::Discretes(intervals) => intervals
            .iter()
            .filter(|(numerator, _)| *numerator > 0)
            // Map to ((numerator, denominator), frames per second)
            .map(|interval| (interval, interval.1 as f32 / interval.0 as f32))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(interval, _)| *interval),
        // The shortest interval is the highest frame rate
        IntervalInfo::Stepwise { min, .. } => Some(*min),
    }
}

fn ensure_format_supported(cam: &Camera, format: &[u8]) -> Result<(), Error> {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    if formats.is_empty() || formats.iter().any(|fmt| &fmt.format[..] == format) {
        return Ok(());
    }

    Err(simple_error!(
        "Format {} not supported by device",
        String::from_utf8_lossy(format)
    )
    .into())
}

pub fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
