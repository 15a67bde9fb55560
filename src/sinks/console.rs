// Console output of track changes

use std::io::{self, Write};

use crate::dispatch::{Subscriber, TrackEvent};
use crate::error::SubscriberError;
use crate::output::OutputFormat;

/// Prints every track to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl Subscriber for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn deliver(&self, event: &TrackEvent) -> Result<(), SubscriberError> {
        let line = self.format.render(event)?;
        let mut out = io::stdout().lock();
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}
