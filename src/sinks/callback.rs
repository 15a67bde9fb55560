// Arbitrary handler subscriber

use std::fmt;

use crate::dispatch::{Subscriber, TrackEvent};
use crate::error::SubscriberError;

type Handler = dyn Fn(&TrackEvent) -> Result<(), SubscriberError> + Send + Sync;

/// Wraps a closure as a subscriber
pub struct CallbackSink {
    name: String,
    handler: Box<Handler>,
}

impl CallbackSink {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&TrackEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        Self { name: name.into(), handler: Box::new(handler) }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Subscriber for CallbackSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, event: &TrackEvent) -> Result<(), SubscriberError> {
        (self.handler)(event)
    }
}
