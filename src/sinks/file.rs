// File output of track changes

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::ValueEnum;
use log::debug;
use serde::Serialize;

use crate::dispatch::{Subscriber, TrackEvent};
use crate::error::{SinkError, SubscriberError};
use crate::output::OutputFormat;

/// What happens to earlier lines when a new track arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Keep a running history, one line per track
    #[default]
    Append,
    /// Keep only the current track
    Overwrite,
}

/// Writes tracks to a file, flushing after every line.
///
/// Writes go through a mutex, so one sink may be shared by several
/// connections. Separate sinks on the same path are not coordinated.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    mode: FileMode,
    format: OutputFormat,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (creating parent directories and the file if needed)
    pub fn open(path: impl AsRef<Path>, mode: FileMode, format: OutputFormat) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if path.is_dir() {
            return Err(SinkError::IsDirectory(path));
        }
        let open_error = |source| SinkError::Open { path: path.clone(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_error)?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            FileMode::Append => options.append(true),
            FileMode::Overwrite => options.write(true),
        };
        let file = options.open(&path).map_err(open_error)?;
        debug!("writing tracks to {} ({:?})", path.display(), mode);

        Ok(Self { path, mode, format, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Subscriber for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn deliver(&self, event: &TrackEvent) -> Result<(), SubscriberError> {
        let line = self.format.render(event)?;
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.mode == FileMode::Overwrite {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
        }
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}
