// Error types for every stage of the ingestion pipeline

use std::io;

use thiserror::Error;

/// The bytes on the wire do not form a valid page
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("bad capture pattern {found:02x?}, stream is desynchronized")]
    BadCapture { found: [u8; 4] },

    #[error("unsupported stream structure version {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch on page {sequence} of stream {serial:#010x}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { serial: u32, sequence: u32, stored: u32, computed: u32 },

    #[error("no capture pattern found within {0} bytes")]
    ResyncExhausted(usize),
}

/// Failure while reading one page from the byte source
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("stream ended after {read} of {expected} bytes of a page")]
    Truncated { read: usize, expected: usize },

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl PageError {
    /// Whether the reader can keep producing pages after this error.
    ///
    /// Checksum mismatches always are: the page was consumed in full. Bad
    /// captures and versions only are when the reader resynchronizes.
    pub fn is_recoverable(&self, resync: bool) -> bool {
        match self {
            PageError::Framing(FramingError::ChecksumMismatch { .. }) => true,
            PageError::Framing(FramingError::BadCapture { .. })
            | PageError::Framing(FramingError::UnsupportedVersion(_)) => resync,
            PageError::Framing(FramingError::ResyncExhausted(_)) => false,
            PageError::Truncated { .. } | PageError::Io(_) => false,
        }
    }

    /// Serial number of the damaged page, when the header was readable
    pub fn serial(&self) -> Option<u32> {
        match self {
            PageError::Framing(FramingError::ChecksumMismatch { serial, .. }) => Some(*serial),
            _ => None,
        }
    }

    /// Transport failures, as opposed to corrupt data
    pub fn is_transport(&self) -> bool {
        matches!(self, PageError::Truncated { .. } | PageError::Io(_))
    }
}

/// Page sequence could not be turned into packets
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("page {sequence} of stream {serial:#010x} continues a packet that was never started, dropped {dropped} bytes")]
    OrphanContinuation { serial: u32, sequence: u32, dropped: usize },

    #[error("page {sequence} of stream {serial:#010x} starts a new packet while {dropped} bytes were pending, dropped them")]
    UnterminatedPacket { serial: u32, sequence: u32, dropped: usize },

    #[error("packet on stream {serial:#010x} exceeds {limit} bytes, dropped")]
    PacketTooLarge { serial: u32, limit: usize },
}

/// Anything the packet stream can yield instead of a packet
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Comment packet that cannot be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("comment packet truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("{field} declares {declared} bytes but only {remaining} remain in the packet")]
    LengthOutOfBounds { field: &'static str, declared: usize, remaining: usize },

    #[error("comment packet declares {count} entries but only {remaining} bytes remain")]
    TooManyEntries { count: usize, remaining: usize },

    #[error("comment packet is missing its framing bit")]
    MissingFramingBit,
}

/// A subscriber failed to take an event
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Callback(String),
}

/// Output sink could not be set up
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{} is a directory", .0.display())]
    IsDirectory(std::path::PathBuf),

    #[error("cannot open {}: {source}", path.display())]
    Open { path: std::path::PathBuf, source: io::Error },
}
