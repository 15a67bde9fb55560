// nowplaying - now-playing metadata from an Ogg Vorbis source stream
//
// Broadcast software pushes its Ogg Vorbis stream to us as if we were an
// Icecast server. Pages are reassembled into packets, comment packets are
// decoded, and every announced track is handed to the registered sinks.

pub mod dispatch;
pub mod error;
pub mod ogg;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod sinks;
pub mod utils;
pub mod vorbis;

#[cfg(feature = "python")]
mod python;

pub use dispatch::{DispatchReport, MetadataDispatcher, Subscriber, TrackEvent};
pub use error::{
    AssemblyError, DecodeError, FramingError, PageError, SinkError, StreamError, SubscriberError,
};
pub use output::OutputFormat;
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport, PipelineSummary, Termination};
pub use server::{ServerConfig, ServerError, SourceServer, DEFAULT_PORT};
pub use sinks::{CallbackSink, ConsoleSink, FileMode, FileSink, SinkOptions};
