// Output formatting for track events

use clap::ValueEnum;
use serde::Serialize;

use crate::dispatch::TrackEvent;
use crate::error::SubscriberError;

/// How sinks render an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `ARTIST - TITLE`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// Render one event as a single line, without the trailing newline
    pub fn render(&self, event: &TrackEvent) -> Result<String, SubscriberError> {
        match self {
            OutputFormat::Text => Ok(event.display.clone()),
            OutputFormat::Json => Ok(serde_json::to_string(event)?),
        }
    }
}
