//! Media acquirer.
//!
//! Opens the camera and runs a blocking capture task that keeps the most recent frame in a
//! `watch` channel. That channel is the display surface: the preview stream and the detection
//! loop both read from it.
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use cam_sensor::sensors::{open_camera, CaptureConstraints};
use tokio::{sync::watch, task::JoinHandle};

use crate::meter::METER;

/// Capture function returning a JPEG encoded frame.
pub type FrameFn = Box<dyn Fn() -> Option<Bytes> + Send + Sync>;

/// Latest state of the capture stream.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameSlot {
    /// No frame captured yet.
    Pending,
    Frame(Bytes),
    /// The stream went inactive and will not deliver frames anymore.
    Ended,
}

pub type FrameReceiver = watch::Receiver<FrameSlot>;

/// Successfully opened capture stream.
pub struct AcquiredStream {
    pub label: String,
    pub capture_fn: FrameFn,
}

/// Acquire a capture stream from the platform.
pub trait MediaAcquirer: Send + Sync {
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<AcquiredStream>;
}

/// Acquirer for V4L2 devices.
pub struct V4l2Acquirer;

impl MediaAcquirer for V4l2Acquirer {
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<AcquiredStream> {
        probe_capability(&constraints.device)?;

        let camera = open_camera(constraints)
            .map_err(|err| anyhow!("failed to open {}: {}", &constraints.device, err))?;
        let capture_fn = camera.capture_fn;

        Ok(AcquiredStream {
            label: camera.label,
            capture_fn: Box::new(move || capture_fn().map(|frame| Bytes::copy_from_slice(&frame[..]))),
        })
    }
}

/// Check that the capture device exists at all.
pub fn probe_capability(device: &str) -> Result<()> {
    if !Path::new(device).exists() {
        bail!("No camera available: {} does not exist", device);
    }
    Ok(())
}

/// Handle of a running capture task.
pub struct CaptureTask {
    pub frames: FrameReceiver,
    active: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

impl CaptureTask {
    /// Ask the capture task to stop after its current frame.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Attach a stream to the display surface.
///
/// Capture errors are logged and retried. After `max_failures` consecutive errors the stream is
/// considered inactive and `FrameSlot::Ended` is published.
pub fn spawn_capture(stream: AcquiredStream, max_failures: u32) -> CaptureTask {
    let (tx, rx) = watch::channel(FrameSlot::Pending);
    let active = Arc::new(AtomicBool::new(true));

    let handle = {
        let active = Arc::clone(&active);
        tokio::task::spawn_blocking(move || {
            let mut failures = 0;
            while active.load(Ordering::Relaxed) {
                match (stream.capture_fn)() {
                    Some(frame) => {
                        failures = 0;
                        METER.tick_captured();
                        if tx.send(FrameSlot::Frame(frame)).is_err() {
                            log::info!("No more frame listeners for {}", &stream.label);
                            return;
                        }
                    }
                    None => {
                        failures += 1;
                        log::error!("Unable to capture frame, trying again...");
                        if failures >= max_failures {
                            log::warn!("Stream inactive");
                            tx.send(FrameSlot::Ended).ok();
                            return;
                        }
                        std::thread::sleep(Duration::from_millis(20));
                    }
                }
            }
            log::info!("Capture of {} stopped", &stream.label);
        })
    };

    CaptureTask {
        frames: rx,
        active,
        _handle: handle,
    }
}
