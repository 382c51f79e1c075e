//! Detection session and the start action.
//!
//! A `DetectionSession` bundles everything the setup path produces: the capture task attached to
//! the display surface, the loaded classifier and the running detection loop. The `Detector`
//! owns at most one session and guards the idle -> detecting transition triggered by the user.
use std::sync::Arc;

use anyhow::{Context, Result};
use cam_sensor::sensors::CaptureConstraints;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    acquirer::{spawn_capture, CaptureTask, FrameReceiver, MediaAcquirer},
    detection::{DetectionConfig, DetectionLoop, LoopExit},
    nn::{Classifier, ModelLoader},
    ui::UiController,
};

/// Configuration of the whole detector.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DetectorConfig {
    pub constraints: CaptureConstraints,
    pub detection: DetectionConfig,
    /// Consecutive capture errors before the stream is considered inactive.
    pub capture_failure_limit: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            detection: DetectionConfig::default(),
            capture_failure_limit: 25,
        }
    }
}

/// Result of a start request.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOutcome {
    Started,
    /// A session is already starting or detecting.
    Ignored,
}

/// Camera stream, model and loop of one detection run.
pub struct DetectionSession {
    pub device_label: String,
    capture: CaptureTask,
    classifier: Arc<dyn Classifier>,
    detection: Option<JoinHandle<()>>,
}

impl DetectionSession {
    /// Acquire the camera, then load the model.
    ///
    /// The detector page is shown as soon as the camera stream is attached, the model is loaded
    /// while the preview is already visible.
    pub async fn open(
        config: &DetectorConfig,
        acquirer: Arc<dyn MediaAcquirer>,
        loader: &dyn ModelLoader,
        ui: &UiController,
    ) -> Result<Self> {
        let constraints = config.constraints.clone();
        let stream = tokio::task::spawn_blocking(move || acquirer.acquire(&constraints))
            .await
            .context("camera task failed")??;
        log::info!("Using video device: {}", &stream.label);

        let device_label = stream.label.clone();
        let capture = spawn_capture(stream, config.capture_failure_limit);
        ui.show_detector();

        let classifier = loader.load().await.context("failed to load model")?;

        Ok(Self {
            device_label,
            capture,
            classifier,
            detection: None,
        })
    }

    pub fn frames(&self) -> FrameReceiver {
        self.capture.frames.clone()
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.classifier)
    }

    fn is_running(&self) -> bool {
        self.detection
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

enum DetectorState {
    Idle,
    Starting,
    Detecting(DetectionSession),
}

/// Owner of the UI controller and the current session.
pub struct Detector {
    config: DetectorConfig,
    ui: Arc<UiController>,
    acquirer: Arc<dyn MediaAcquirer>,
    loader: Arc<dyn ModelLoader>,
    state: Mutex<DetectorState>,
}

impl Detector {
    pub fn new(
        config: DetectorConfig,
        ui: Arc<UiController>,
        acquirer: Arc<dyn MediaAcquirer>,
        loader: Arc<dyn ModelLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            ui,
            acquirer,
            loader,
            state: Mutex::new(DetectorState::Idle),
        })
    }

    pub fn ui(&self) -> &Arc<UiController> {
        &self.ui
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Display surface of the current session, if any.
    pub async fn frames(&self) -> Option<FrameReceiver> {
        match &*self.state.lock().await {
            DetectorState::Detecting(session) => Some(session.frames()),
            _ => None,
        }
    }

    pub async fn is_detecting(&self) -> bool {
        match &*self.state.lock().await {
            DetectorState::Detecting(session) => session.is_running(),
            _ => false,
        }
    }

    /// Handle the start action.
    ///
    /// Setup runs in the background. Failures are shown as unsupported and leave the detector
    /// idle, so the user may try again.
    pub async fn start(self: &Arc<Self>) -> StartOutcome {
        {
            let mut state = self.state.lock().await;
            match &*state {
                DetectorState::Starting => {
                    log::info!("Detection is already starting, ignoring start");
                    return StartOutcome::Ignored;
                }
                DetectorState::Detecting(session) if session.is_running() => {
                    log::info!("Detection is already running, ignoring start");
                    return StartOutcome::Ignored;
                }
                _ => (),
            }
            // Drops a finished session, which stops its capture
            *state = DetectorState::Starting;
        }
        // A new attempt replaces the error of the previous one
        self.ui.show_supported();

        let detector = Arc::clone(self);
        tokio::spawn(async move { detector.run_setup().await });

        StartOutcome::Started
    }

    async fn run_setup(self: Arc<Self>) {
        let opened = DetectionSession::open(
            &self.config,
            Arc::clone(&self.acquirer),
            self.loader.as_ref(),
            &self.ui,
        )
        .await;

        let mut state = self.state.lock().await;
        match opened {
            Ok(mut session) => {
                let detection = DetectionLoop::new(
                    session.classifier(),
                    session.frames(),
                    self.config.detection.clone(),
                    Arc::clone(&self.ui),
                );
                log::info!("Detecting on {}", &session.device_label);
                let detector = Arc::clone(&self);
                session.detection = Some(tokio::spawn(async move {
                    let exit = detection.run().await;
                    detector.on_loop_exit(exit).await;
                }));
                *state = DetectorState::Detecting(session);
            }
            Err(err) => {
                log::error!("Detection setup failed: {err:#}");
                self.ui.show_unsupported(format!("{err:#}"));
                *state = DetectorState::Idle;
            }
        }
    }

    async fn on_loop_exit(&self, exit: LoopExit) {
        match exit {
            LoopExit::Surfaced(error) => log::warn!("Detection stopped: {}", error),
        }
        *self.state.lock().await = DetectorState::Idle;
    }
}
