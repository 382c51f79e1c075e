use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use axum::{
    body::{BoxBody, HttpBody},
    http::StatusCode,
    response::IntoResponse,
    Extension,
};
use bytes::Bytes;
use cam_sensor::sensors::CaptureConstraints;
use common::protocol::{Page, Prediction, Support, UiState};
use detector_server::{
    acquirer::{AcquiredStream, MediaAcquirer},
    detection::DetectionConfig,
    endpoints::{events, state, video_stream},
    nn::{Classifier, ModelLoader},
    rules::{BADGER_CLASS, LLAMA_CLASS},
    session::{Detector, DetectorConfig, StartOutcome},
    ui::{UiController, DETECTING_CLASS},
};
use futures::{future::BoxFuture, FutureExt};
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};

fn jpeg_frame() -> Bytes {
    let image = RgbImage::new(16, 16);
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new(&mut buf)
        .encode(&image, 16, 16, ColorType::Rgb8)
        .unwrap();
    Bytes::from(buf.into_inner())
}

/// Camera delivering a black frame every few milliseconds.
struct FakeCamera;

impl MediaAcquirer for FakeCamera {
    fn acquire(&self, _constraints: &CaptureConstraints) -> Result<AcquiredStream> {
        let frame = jpeg_frame();
        Ok(AcquiredStream {
            label: "Fake Camera".into(),
            capture_fn: Box::new(move || {
                std::thread::sleep(Duration::from_millis(5));
                Some(frame.clone())
            }),
        })
    }
}

/// Device that is not there.
struct NoCamera;

impl MediaAcquirer for NoCamera {
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<AcquiredStream> {
        bail!("No camera available: {} does not exist", &constraints.device)
    }
}

/// Classifier always answering with the same label, or always failing.
///
/// The first `rejected_calls` calls fail regardless of the answer.
struct FixedClassifier {
    answer: Result<Prediction, String>,
    rejected_calls: usize,
    calls: AtomicUsize,
}

impl Classifier for FixedClassifier {
    fn classify(&self, _frame: &RgbImage) -> Result<Vec<Prediction>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.rejected_calls {
            bail!("classify rejected");
        }
        match &self.answer {
            Ok(prediction) => Ok(vec![prediction.clone(), Prediction::new("table", 0.01)]),
            Err(err) => Err(anyhow!(err.clone())),
        }
    }
}

struct FixedLoader {
    classifier: Option<Arc<FixedClassifier>>,
}

impl FixedLoader {
    fn answering(label: &str, probability: f32) -> Arc<Self> {
        Self::with(Ok(Prediction::new(label, probability)))
    }

    fn with(answer: Result<Prediction, String>) -> Arc<Self> {
        Self::rejecting_first(0, answer)
    }

    fn rejecting_first(rejected_calls: usize, answer: Result<Prediction, String>) -> Arc<Self> {
        Arc::new(Self {
            classifier: Some(Arc::new(FixedClassifier {
                answer,
                rejected_calls,
                calls: AtomicUsize::new(0),
            })),
        })
    }
}

impl ModelLoader for FixedLoader {
    fn load(&self) -> BoxFuture<'static, Result<Arc<dyn Classifier>>> {
        let classifier = self.classifier.clone();
        async move {
            match classifier {
                Some(classifier) => Ok(classifier as Arc<dyn Classifier>),
                None => Err(anyhow!("model download failed")),
            }
        }
        .boxed()
    }
}

fn detector(
    acquirer: Arc<dyn MediaAcquirer>,
    loader: Arc<dyn ModelLoader>,
    max_consecutive_failures: u32,
) -> Arc<Detector> {
    let config = DetectorConfig {
        detection: DetectionConfig {
            interval: Duration::from_millis(10),
            max_consecutive_failures,
            ..Default::default()
        },
        ..Default::default()
    };
    Detector::new(config, Arc::new(UiController::default()), acquirer, loader)
}

/// Wait until the UI state fulfills `pred`, or panic after a few seconds.
async fn wait_for(detector: &Detector, pred: impl Fn(&UiState) -> bool) -> UiState {
    let mut rx = detector.ui().subscribe();
    let wait = async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("UI never reached the expected state")
}

/// Read the next server-sent event of `body` as UI state.
async fn next_event(body: &mut BoxBody) -> UiState {
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.data())
        .await
        .expect("no event within timeout")
        .expect("event stream ended")
        .unwrap();
    let text = std::str::from_utf8(&chunk).unwrap();
    let json = text
        .strip_prefix("data:")
        .expect("event without data field")
        .trim();
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn test_iguana_reaches_match_state_with_sound() {
    let detector = detector(
        Arc::new(FakeCamera),
        FixedLoader::answering("iguana-species-7", 0.92),
        3,
    );

    assert_eq!(detector.start().await, StartOutcome::Started);

    let state = wait_for(&detector, |s| s.has_class(LLAMA_CLASS)).await;
    assert_eq!(state.page, Page::Detector);
    assert_eq!(state.support, Support::Supported);
    assert!(state.has_class(DETECTING_CLASS));
    assert!(state.sound_seq >= 1);
    assert_eq!(state.top, Some(Prediction::new("iguana-species-7", 0.92)));

    // Sound retriggers while the match persists
    wait_for(&detector, |s| s.sound_seq >= 3).await;
    assert!(detector.is_detecting().await);
}

#[tokio::test]
async fn test_badger_sets_easter_egg_only() {
    let detector = detector(Arc::new(FakeCamera), FixedLoader::answering("badger", 0.7), 3);
    detector.start().await;

    let state = wait_for(&detector, |s| s.has_class(BADGER_CLASS)).await;
    assert!(!state.has_class(LLAMA_CLASS));
    assert_eq!(state.sound_seq, 0);
}

#[tokio::test]
async fn test_other_labels_clear_special_states() {
    let detector = detector(Arc::new(FakeCamera), FixedLoader::answering("table", 0.8), 3);
    detector.start().await;

    let state = wait_for(&detector, |s| s.top.is_some()).await;
    assert!(!state.has_class(LLAMA_CLASS));
    assert!(!state.has_class(BADGER_CLASS));
    assert!(state.has_class(DETECTING_CLASS));
}

#[tokio::test]
async fn test_missing_camera_shows_unsupported_never_detector() {
    let detector = detector(Arc::new(NoCamera), FixedLoader::answering("llama", 0.9), 3);
    let mut rx = detector.ui().subscribe();
    let pages = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            seen.push(state.page);
            if state.support == Support::Unsupported {
                break;
            }
        }
        seen
    });

    detector.start().await;

    let state = wait_for(&detector, |s| s.support == Support::Unsupported).await;
    assert_eq!(state.page, Page::Intro);
    assert!(state.error.unwrap().contains("No camera available"));

    let seen = pages.await.unwrap();
    assert!(!seen.contains(&Page::Detector));
    assert!(!detector.is_detecting().await);
}

#[tokio::test]
async fn test_model_failure_is_unsupported() {
    let loader = Arc::new(FixedLoader { classifier: None });
    let detector = detector(Arc::new(FakeCamera), loader, 3);
    detector.start().await;

    let state = wait_for(&detector, |s| s.support == Support::Unsupported).await;
    assert_eq!(state.page, Page::Intro);
    assert!(state.error.unwrap().contains("model download failed"));
}

#[tokio::test]
async fn test_classification_error_shows_error_page_and_allows_restart() {
    let detector = detector(
        Arc::new(FakeCamera),
        FixedLoader::rejecting_first(1, Ok(Prediction::new("llama", 0.9))),
        1,
    );
    detector.start().await;

    let state = wait_for(&detector, |s| s.support == Support::Unsupported).await;
    assert_eq!(state.page, Page::Intro);
    assert_eq!(state.error.as_deref(), Some("classify rejected"));
    assert!(!state.has_class(DETECTING_CLASS));

    // The loop gave up and released the session
    let stopped = async {
        while detector.is_detecting().await || detector.frames().await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), stopped)
        .await
        .expect("session was not released");

    assert_eq!(detector.start().await, StartOutcome::Started);

    // The fresh session classifies again and clears the old error
    let state = wait_for(&detector, |s| s.has_class(LLAMA_CLASS)).await;
    assert_eq!(state.page, Page::Detector);
    assert_eq!(state.support, Support::Supported);
    assert_eq!(state.error, None);
    assert!(state.has_class(DETECTING_CLASS));
    assert!(detector.is_detecting().await);
}

#[tokio::test]
async fn test_second_start_is_ignored() {
    let detector = detector(Arc::new(FakeCamera), FixedLoader::answering("table", 0.8), 3);

    assert_eq!(detector.start().await, StartOutcome::Started);
    assert_eq!(detector.start().await, StartOutcome::Ignored);

    wait_for(&detector, |s| s.has_class(DETECTING_CLASS)).await;
    assert_eq!(detector.start().await, StartOutcome::Ignored);
}

#[tokio::test]
async fn test_state_and_video_endpoints() {
    let detector = detector(Arc::new(FakeCamera), FixedLoader::answering("llama", 0.9), 3);

    let resp = video_stream(Extension(Arc::clone(&detector))).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    detector.start().await;
    wait_for(&detector, |s| s.has_class(LLAMA_CLASS)).await;

    let resp = video_stream(Extension(Arc::clone(&detector))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let snapshot = state(Extension(Arc::clone(&detector))).await.0;
    assert!(snapshot.has_class(LLAMA_CLASS));
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["page"], "detector");
}

#[tokio::test]
async fn test_events_publish_ui_state() {
    let detector = detector(Arc::new(FakeCamera), FixedLoader::answering("llama", 0.9), 3);
    let mut body = events(Extension(Arc::clone(&detector)))
        .await
        .into_response()
        .into_body();

    let initial = next_event(&mut body).await;
    assert_eq!(initial.page, Page::Intro);
    assert_eq!(initial.sound_seq, 0);

    detector.ui().play_sound();
    let changed = next_event(&mut body).await;
    assert_eq!(changed.sound_seq, 1);
    assert_eq!(changed, detector.ui().snapshot());
}
