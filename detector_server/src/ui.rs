//! UI state controller.
//!
//! The controller owns the single `UiState` of the process and publishes every change through a
//! `tokio::sync::watch` channel. The browser page subscribes to it via server-sent events and
//! renders whatever it receives, so all visual transitions are decided here.
use std::fmt::Display;

use common::protocol::{Page, Support, UiState};
use tokio::sync::watch;

use crate::rules::{TargetRule, Verdict};

/// Body class set while the detection loop is running.
pub const DETECTING_CLASS: &str = "detecting";

pub struct UiController {
    tx: watch::Sender<UiState>,
}

impl UiController {
    pub fn new(initial: UiState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn snapshot(&self) -> UiState {
        self.tx.borrow().clone()
    }

    /// Make `page` the only visible page.
    pub fn show_page(&self, page: Page) {
        self.tx.send_modify(|state| state.page = page);
    }

    /// Show the intro page with the start button.
    pub fn show_supported(&self) {
        self.tx.send_modify(|state| {
            state.page = Page::Intro;
            state.support = Support::Supported;
            state.error = None;
        });
    }

    /// Show the intro page with the raw error instead of the start button.
    pub fn show_unsupported(&self, error: impl Display) {
        let error = error.to_string();
        log::warn!("Showing unsupported page: {}", &error);
        self.tx.send_modify(|state| {
            state.page = Page::Intro;
            state.support = Support::Unsupported;
            state.error = Some(error);
            state.classes.remove(DETECTING_CLASS);
        });
    }

    /// Switch to the detector page once a camera stream is attached.
    pub fn show_detector(&self) {
        self.show_page(Page::Detector);
    }

    pub fn add_class(&self, class: &str) {
        self.tx.send_if_modified(|state| state.classes.insert(class.to_owned()));
    }

    pub fn remove_class(&self, class: &str) {
        self.tx.send_if_modified(|state| state.classes.remove(class));
    }

    pub fn play_sound(&self) {
        self.tx.send_modify(|state| state.sound_seq += 1);
    }

    /// Apply the outcome of a detection tick.
    ///
    /// Rule classes are mutually exclusive: all of them except the matched one are removed. The
    /// sound is requested on every matching tick, repeated matches retrigger it.
    pub fn apply_verdict(&self, verdict: &Verdict, rules: &[TargetRule]) {
        self.tx.send_modify(|state| {
            for rule in rules {
                if verdict.class.as_ref() != Some(&rule.class) {
                    state.classes.remove(&rule.class);
                }
            }
            if let Some(class) = &verdict.class {
                state.classes.insert(class.clone());
            }
            if verdict.sound {
                state.sound_seq += 1;
            }
            state.top = verdict.top.clone();
        });
    }
}

impl Default for UiController {
    fn default() -> Self {
        Self::new(UiState::default())
    }
}
