// Track event construction and delivery to subscribers

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::error::SubscriberError;
use crate::vorbis::{VorbisComment, VorbisFields};

/// One track announcement, as handed to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEvent {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// `ARTIST - TITLE`, missing parts left empty
    pub display: String,
    /// Every `FIELD=value` entry of the comment, in stream order
    pub fields: Vec<(String, String)>,
    pub vendor: String,
    pub serial: u32,
    pub received_at: DateTime<Utc>,
}

impl TrackEvent {
    /// Same artist and title as `other`
    pub fn same_track(&self, other: &TrackEvent) -> bool {
        self.artist == other.artist && self.title == other.title
    }
}

/// Something that wants to hear about track changes.
///
/// Runs inline on the ingestion thread, so it must not block for long.
pub trait Subscriber: Send + Sync {
    /// Name used when reporting failures
    fn name(&self) -> &str;

    fn deliver(&self, event: &TrackEvent) -> Result<(), SubscriberError>;
}

/// Result of delivering one event
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<(String, SubscriberError)>,
}

/// Turns decoded comments into track events and fans them out.
///
/// The subscriber list is fixed once built; the dispatcher is shared
/// read-only between connections.
pub struct MetadataDispatcher {
    subscribers: Vec<Box<dyn Subscriber>>,
    min_display_len: usize,
}

impl MetadataDispatcher {
    /// Display strings this short or shorter are not announced (" - " is 3)
    pub const DEFAULT_MIN_DISPLAY_LEN: usize = 3;

    pub fn new() -> Self {
        Self { subscribers: Vec::new(), min_display_len: Self::DEFAULT_MIN_DISPLAY_LEN }
    }

    pub fn with_min_display_len(mut self, min_display_len: usize) -> Self {
        self.min_display_len = min_display_len;
        self
    }

    /// Register a subscriber; delivery follows registration order
    pub fn subscribe(mut self, subscriber: impl Subscriber + 'static) -> Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    pub fn subscribe_boxed(&mut self, subscriber: Box<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn min_display_len(&self) -> usize {
        self.min_display_len
    }

    /// Build the event for a comment, or `None` if it does not name a track
    pub fn prepare(&self, comment: &VorbisComment, serial: u32) -> Option<TrackEvent> {
        let artist = non_empty(comment.get(VorbisFields::ARTIST));
        let title = non_empty(comment.get(VorbisFields::TITLE));
        if artist.is_none() && title.is_none() {
            debug!("comment carries neither artist nor title");
            return None;
        }

        let display = format!("{} - {}", artist.as_deref().unwrap_or(""), title.as_deref().unwrap_or(""));
        if display.chars().count() <= self.min_display_len {
            debug!("announcement {:?} too short, not dispatched", display);
            return None;
        }

        Some(TrackEvent {
            artist,
            title,
            display,
            fields: comment.fields().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            vendor: comment.vendor_string.clone(),
            serial,
            received_at: Utc::now(),
        })
    }

    /// Deliver to every subscriber. A failing subscriber is reported and skipped.
    pub fn dispatch(&self, event: &TrackEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for subscriber in &self.subscribers {
            match subscriber.deliver(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("subscriber {} failed on {:?}: {}", subscriber.name(), event.display, e);
                    report.failures.push((subscriber.name().to_string(), e));
                }
            }
        }
        report
    }
}

impl Default for MetadataDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
