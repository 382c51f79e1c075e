//! Detection loop.
//!
//! One tick takes the latest frame from the display surface, classifies it and hands the verdict
//! to the UI controller. Classification runs on the blocking pool and is awaited before the next
//! tick is scheduled, so a slow model delays the loop instead of piling up calls.
use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};

use crate::{
    acquirer::{FrameReceiver, FrameSlot},
    meter::METER,
    nn::{decode_jpeg, Classifier},
    rules::{default_rules, evaluate, TargetRule, Verdict},
    ui::{UiController, DETECTING_CLASS},
};

/// Parameters of the detection loop.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DetectionConfig {
    pub interval: Duration,
    pub rules: Vec<TargetRule>,
    /// Consecutive failed ticks before giving up, `0` keeps going forever.
    pub max_consecutive_failures: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            rules: default_rules(),
            max_consecutive_failures: 3,
        }
    }
}

/// Reason the loop stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopExit {
    /// Too many consecutive failures, the error was shown as unsupported.
    Surfaced(String),
}

pub struct DetectionLoop {
    classifier: Arc<dyn Classifier>,
    frames: FrameReceiver,
    config: DetectionConfig,
    ui: Arc<UiController>,
    failures: u32,
}

impl DetectionLoop {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        frames: FrameReceiver,
        config: DetectionConfig,
        ui: Arc<UiController>,
    ) -> Self {
        Self {
            classifier,
            frames,
            config,
            ui,
            failures: 0,
        }
    }

    /// Number of failed ticks in a row.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Run until the failure policy gives up.
    pub async fn run(mut self) -> LoopExit {
        self.ui.add_class(DETECTING_CLASS);
        log::info!(
            "Detection started, classifying every {} ms",
            self.config.interval.as_millis()
        );

        // A zero period would make `interval` panic
        let mut ticks = interval(self.config.interval.max(Duration::from_millis(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            if let Some(exit) = self.step().await {
                return exit;
            }
        }
    }

    /// Run one tick and apply the failure policy to its result.
    pub async fn step(&mut self) -> Option<LoopExit> {
        let err = match self.tick().await {
            Ok(_) => return None,
            Err(err) => err,
        };

        METER.tick_failed();
        self.failures += 1;
        log::error!(
            "classify error ({} in a row): {:#}",
            self.failures,
            err
        );

        let cap = self.config.max_consecutive_failures;
        if cap > 0 && self.failures >= cap {
            let error = format!("{err:#}");
            self.ui.show_unsupported(&error);
            return Some(LoopExit::Surfaced(error));
        }

        None
    }

    /// Classify the latest frame and update the UI.
    ///
    /// Returns `None` if no frame has been captured yet.
    pub async fn tick(&mut self) -> Result<Option<Verdict>> {
        let slot = self.frames.borrow().clone();
        let jpeg = match slot {
            FrameSlot::Pending => {
                log::debug!("No frame captured yet, skipping tick");
                return Ok(None);
            }
            FrameSlot::Ended => bail!("camera stream ended"),
            FrameSlot::Frame(jpeg) => jpeg,
        };

        let classifier = Arc::clone(&self.classifier);
        let predictions = tokio::task::spawn_blocking(move || {
            let image = decode_jpeg(&jpeg)?;
            classifier.classify(&image)
        })
        .await
        .context("classification task failed")??;
        METER.tick_classified();

        let verdict = evaluate(&self.config.rules, &predictions);
        if verdict.is_match() {
            log::info!("Match! {:?} on {:?}", &verdict.class, &verdict.top);
        } else {
            log::debug!("No match... {:?}", &predictions);
        }

        self.ui.apply_verdict(&verdict, &self.config.rules);
        self.failures = 0;

        Ok(Some(verdict))
    }
}
