// Built-in subscribers

pub mod callback;
pub mod console;
pub mod file;

use std::path::PathBuf;

use log::info;
use serde::Serialize;

pub use callback::CallbackSink;
pub use console::ConsoleSink;
pub use file::{FileMode, FileSink};

use crate::dispatch::MetadataDispatcher;
use crate::error::SinkError;
use crate::output::OutputFormat;

/// Which built-in sinks to register
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkOptions {
    /// Print tracks to stdout
    pub console: bool,
    pub outfile: Option<PathBuf>,
    pub file_mode: FileMode,
    pub format: OutputFormat,
    pub min_display_len: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            console: true,
            outfile: None,
            file_mode: FileMode::default(),
            format: OutputFormat::default(),
            min_display_len: MetadataDispatcher::DEFAULT_MIN_DISPLAY_LEN,
        }
    }
}

impl SinkOptions {
    /// Dispatcher with the console sink first, then the file sink.
    /// Callers add their own subscribers after these.
    pub fn build(&self) -> Result<MetadataDispatcher, SinkError> {
        let mut dispatcher = MetadataDispatcher::new().with_min_display_len(self.min_display_len);
        if self.console {
            dispatcher.subscribe_boxed(Box::new(ConsoleSink::new(self.format)));
        }
        if let Some(path) = &self.outfile {
            let sink = FileSink::open(path, self.file_mode, self.format)?;
            info!("writing tracks to {}", sink.path().display());
            dispatcher.subscribe_boxed(Box::new(sink));
        }
        Ok(dispatcher)
    }
}
