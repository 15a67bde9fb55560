// One connection's worth of ingestion: pages -> packets -> comments -> subscribers

use std::io::Read;

use log::{debug, warn};
use serde::Serialize;

use crate::dispatch::{MetadataDispatcher, TrackEvent};
use crate::error::{PageError, StreamError};
use crate::ogg::{AssemblerOptions, Packet, PageReader, Packets, ReaderOptions};
use crate::vorbis::{CommentDecoder, DecoderOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOptions {
    pub reader: ReaderOptions,
    pub assembler: AssemblerOptions,
    pub decoder: DecoderOptions,
    /// Skip announcements repeating the previous artist and title
    pub dedupe: bool,
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub bytes: u64,
    pub pages: u64,
    pub packets: u64,
    pub comment_packets: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    pub duplicates: u64,
    pub framing_errors: u64,
    pub assembly_errors: u64,
    pub decode_errors: u64,
    pub subscriber_failures: u64,
    pub gaps: u64,
    pub ignored_pages: u64,
}

/// Why a pipeline stopped
#[derive(Debug)]
pub enum Termination {
    /// Source closed on a page boundary
    EndOfStream,
    /// Transport failure, or a framing error the reader could not recover from
    Failed(PageError),
}

impl Termination {
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::EndOfStream)
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub summary: PipelineSummary,
    pub termination: Termination,
}

/// Runs the stages in strict stream order on the calling thread.
///
/// All blocking happens inside the source's `read`. Each run owns its own
/// reader, assembler and dedupe state; only the dispatcher is shared.
pub struct Pipeline<'a> {
    dispatcher: &'a MetadataDispatcher,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(dispatcher: &'a MetadataDispatcher, options: PipelineOptions) -> Self {
        Self { dispatcher, options }
    }

    /// Consume `source` until it ends or fails beyond recovery
    pub fn run<R: Read>(&self, source: R) -> PipelineReport {
        let reader = PageReader::with_options(source, self.options.reader);
        let mut packets = Packets::new(reader, self.options.assembler);
        let decoder = CommentDecoder::new(self.options.decoder);
        let resync = self.options.reader.resync.enabled();

        let mut summary = PipelineSummary::default();
        let mut termination = Termination::EndOfStream;
        let mut last_event: Option<TrackEvent> = None;

        for item in packets.by_ref() {
            match item {
                Ok(packet) => {
                    summary.packets += 1;
                    self.process(&decoder, &packet, &mut last_event, &mut summary);
                }
                Err(StreamError::Assembly(e)) => {
                    summary.assembly_errors += 1;
                    warn!("{}", e);
                }
                Err(StreamError::Page(e)) => {
                    if !e.is_transport() {
                        summary.framing_errors += 1;
                    }
                    if e.is_recoverable(resync) {
                        warn!("{}, page dropped", e);
                    } else {
                        termination = Termination::Failed(e);
                    }
                }
            }
        }

        summary.bytes = packets.pages().bytes_consumed();
        summary.pages = packets.pages().pages_read();
        summary.gaps = packets.assembler().gaps();
        summary.ignored_pages = packets.assembler().ignored_pages();

        PipelineReport { summary, termination }
    }

    fn process(
        &self,
        decoder: &CommentDecoder,
        packet: &Packet,
        last_event: &mut Option<TrackEvent>,
        summary: &mut PipelineSummary,
    ) {
        let comment = match decoder.decode(&packet.data) {
            Ok(Some(comment)) => comment,
            Ok(None) => return,
            Err(e) => {
                summary.decode_errors += 1;
                warn!("comment packet on stream {:#010x} dropped: {}", packet.serial, e);
                return;
            }
        };
        summary.comment_packets += 1;
        debug!("comment packet from {:?} with {} entries", comment.vendor_string, comment.entries.len());

        let Some(event) = self.dispatcher.prepare(&comment, packet.serial) else {
            summary.suppressed += 1;
            return;
        };

        if self.options.dedupe && last_event.as_ref().is_some_and(|last| last.same_track(&event)) {
            debug!("{:?} repeats the previous track, skipped", event.display);
            summary.duplicates += 1;
            return;
        }

        debug!("now playing: {}", event.display);
        let report = self.dispatcher.dispatch(&event);
        summary.dispatched += 1;
        summary.subscriber_failures += report.failures.len() as u64;
        *last_event = Some(event);
    }
}
