//! Distraction detection.
//!
//! Two independent debounce channels, the browser URL and the frontmost
//! application, fed one `ForegroundSample` per poll. A channel reacts once its
//! identity has stayed distracting for longer than the threshold, then re-arms
//! so the next reaction needs another full threshold of continued distraction.

use crate::config::AppConfig;
use crate::probe::ForegroundSample;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// A reaction-worthy stretch of distraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distraction {
    /// Frontmost application at the time of the reaction.
    pub app: Option<String>,
    /// Set when the URL channel triggered.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub bundle_ids: HashSet<String>,
    pub url_keywords: Vec<String>,
    pub threshold: Duration,
    pub priority_keyword: String,
    pub priority_message: String,
    pub generic_message: String,
}

impl From<&AppConfig> for DetectorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            bundle_ids: config.distracting_bundle_ids.iter().cloned().collect(),
            url_keywords: config.distracting_url_keywords.clone(),
            threshold: Duration::from_secs(config.distraction_threshold_seconds),
            priority_keyword: config.priority_url_keyword.clone(),
            priority_message: config.priority_message.clone(),
            generic_message: config.generic_message.clone(),
        }
    }
}

impl DetectorSettings {
    /// The message the dog says for `distraction`, keyed off the URL if present.
    pub fn message_for(&self, distraction: &Distraction) -> &str {
        match distraction.url.as_deref() {
            Some(url) if !self.priority_keyword.is_empty() && url.contains(&self.priority_keyword) => {
                &self.priority_message
            }
            _ => &self.generic_message,
        }
    }
}

/// Debounce state for one channel. Identity and start time live in one
/// `Option`, so one is never set without the other.
#[derive(Debug, Default)]
struct Channel {
    active: Option<(String, Instant)>,
}

enum Step {
    Armed,
    Waiting,
    Fire,
}

impl Channel {
    fn observe(&mut self, identity: &str, now: Instant, threshold: Duration) -> Step {
        match &mut self.active {
            Some((current, started)) if current == identity => {
                if now.saturating_duration_since(*started) > threshold {
                    *started = now;
                    Step::Fire
                } else {
                    Step::Waiting
                }
            }
            _ => {
                self.active = Some((identity.to_string(), now));
                Step::Armed
            }
        }
    }

    fn clear(&mut self) {
        self.active = None;
    }

    #[cfg(test)]
    fn identity(&self) -> Option<&str> {
        self.active.as_ref().map(|(id, _)| id.as_str())
    }

    fn is_armed(&self) -> bool {
        self.active.is_some()
    }
}

pub type ReactionSink = Box<dyn FnMut(Distraction) + Send>;

pub struct DistractionDetector {
    settings: DetectorSettings,
    url: Channel,
    app: Channel,
    /// Consecutive degraded samples seen so far.
    missed: u32,
    on_distraction: ReactionSink,
}

impl DistractionDetector {
    pub fn new(settings: DetectorSettings, on_distraction: ReactionSink) -> Self {
        Self {
            settings,
            url: Channel::default(),
            app: Channel::default(),
            missed: 0,
            on_distraction,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn active_app(&self) -> Option<&str> {
        self.app.identity()
    }

    #[cfg(test)]
    pub fn active_url(&self) -> Option<&str> {
        self.url.identity()
    }

    fn is_distracting_url(&self, url: &str) -> bool {
        self.settings.url_keywords.iter().any(|k| url.contains(k.as_str()))
    }

    /// Feeds one poll into the channels.
    ///
    /// The URL channel is evaluated first; a distracting URL ends the poll
    /// without touching the app channel. Otherwise the URL channel is cleared
    /// and the app channel runs in the same poll.
    ///
    /// A single degraded sample while a channel is armed is skipped so one
    /// failed OS query does not restart a debounce; a second one in a row is
    /// evaluated like any other sample.
    pub fn poll(&mut self, sample: &ForegroundSample, now: Instant) {
        if sample.degraded {
            self.missed = self.missed.saturating_add(1);
            if self.missed == 1 && (self.url.is_armed() || self.app.is_armed()) {
                log::debug!("Foreground query failed, holding distraction state");
                return;
            }
        } else {
            self.missed = 0;
        }

        let threshold = self.settings.threshold;

        if let Some(url) = sample.url.as_deref().filter(|u| self.is_distracting_url(u)) {
            match self.url.observe(url, now, threshold) {
                Step::Armed => log::debug!("Distracting URL: {url}"),
                Step::Waiting => {}
                Step::Fire => {
                    log::info!("Distracted by {url} for over {}s", threshold.as_secs());
                    (self.on_distraction)(Distraction {
                        app: sample.app.clone(),
                        url: Some(url.to_string()),
                    });
                }
            }
            return;
        }
        self.url.clear();

        let app = sample
            .app
            .as_deref()
            .filter(|id| self.settings.bundle_ids.contains(*id));
        match app {
            Some(app) => match self.app.observe(app, now, threshold) {
                Step::Armed => log::debug!("Distracting app: {app}"),
                Step::Waiting => {}
                Step::Fire => {
                    log::info!("Distracted by {app} for over {}s", threshold.as_secs());
                    (self.on_distraction)(Distraction {
                        app: Some(app.to_string()),
                        url: None,
                    });
                }
            },
            None => self.app.clear(),
        }
    }
}
