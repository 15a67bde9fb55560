// Packet reassembly across pages

use std::collections::VecDeque;
use std::mem;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{AssemblyError, PageError, StreamError};
use crate::ogg::page::OggPage;
use crate::ogg::MAX_SEGMENT_SIZE;

/// A complete logical packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub serial: u32,
    /// Sequence number of the page holding the packet's last segment
    pub page_sequence: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssemblerOptions {
    /// Packets growing beyond this are dropped
    pub max_packet_size: usize,
}

impl AssemblerOptions {
    pub const DEFAULT_MAX_PACKET_SIZE: usize = 8 * 1024 * 1024;
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self { max_packet_size: Self::DEFAULT_MAX_PACKET_SIZE }
    }
}

/// Rebuilds packets of a single logical bitstream from its pages.
///
/// Tracks one serial number at a time. A BOS page takes over tracking
/// (chained streams start a fresh bitstream for every track), except while
/// the tracked stream is still in its own BOS group, which is how
/// multiplexed siblings announce themselves. Pages of any other serial are
/// dropped without being buffered, so memory stays bounded by one packet.
#[derive(Debug)]
pub struct PacketAssembler {
    options: AssemblerOptions,
    serial: Option<u32>,
    in_bos_group: bool,
    ended: bool,
    last_sequence: Option<u32>,
    buffer: Vec<u8>,
    discarding: bool,
    gaps: u64,
    ignored_pages: u64,
}

impl PacketAssembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self {
            options,
            serial: None,
            in_bos_group: false,
            ended: false,
            last_sequence: None,
            buffer: Vec::new(),
            discarding: false,
            gaps: 0,
            ignored_pages: 0,
        }
    }

    /// Serial number currently being assembled
    pub fn tracked_serial(&self) -> Option<u32> {
        self.serial
    }

    /// Bytes of the packet in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Page sequence discontinuities seen on tracked streams
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Pages dropped because they belong to another bitstream
    pub fn ignored_pages(&self) -> u64 {
        self.ignored_pages
    }

    /// Forget the packet in progress, e.g. after a page was lost
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            debug!("dropping {} bytes of an unfinished packet", self.buffer.len());
        }
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feed one page. Completed packets go to `out`, problems to `errors`.
    pub fn push_page(&mut self, page: &OggPage, out: &mut VecDeque<Packet>, errors: &mut Vec<AssemblyError>) {
        let header = &page.header;
        let serial = header.bitstream_serial;
        let sequence = header.page_sequence;

        if !header.is_bos() {
            self.in_bos_group = false;
        }
        if !self.track(serial, header.is_bos()) {
            self.ignored_pages += 1;
            return;
        }

        if let Some(last) = self.last_sequence {
            if sequence != last.wrapping_add(1) {
                self.gaps += 1;
                warn!("page sequence gap on stream {:#010x}: {} follows {}", serial, sequence, last);
            }
        }
        self.last_sequence = Some(sequence);

        let mut orphaned = false;
        if header.is_continued() {
            orphaned = self.buffer.is_empty() && !self.discarding;
        } else if !self.buffer.is_empty() || self.discarding {
            if !self.buffer.is_empty() {
                errors.push(AssemblyError::UnterminatedPacket { serial, sequence, dropped: self.buffer.len() });
            }
            self.reset();
        }

        let mut offset = 0usize;
        let mut dropped = 0usize;
        for &lacing in &header.segment_table {
            let len = lacing as usize;
            let Some(segment) = page.data.get(offset..offset + len) else {
                break;
            };
            offset += len;
            let terminates = len < MAX_SEGMENT_SIZE;

            if orphaned {
                dropped += len;
                if terminates {
                    orphaned = false;
                    errors.push(AssemblyError::OrphanContinuation { serial, sequence, dropped });
                }
                continue;
            }

            if self.discarding {
                self.discarding = !terminates;
                continue;
            }

            if self.buffer.len() + len > self.options.max_packet_size {
                errors.push(AssemblyError::PacketTooLarge { serial, limit: self.options.max_packet_size });
                self.buffer = Vec::new();
                self.discarding = !terminates;
                continue;
            }

            self.buffer.extend_from_slice(segment);
            if terminates {
                out.push_back(Packet { serial, page_sequence: sequence, data: mem::take(&mut self.buffer) });
            }
        }

        if orphaned {
            // the orphan runs on into the next page
            errors.push(AssemblyError::OrphanContinuation { serial, sequence, dropped });
            self.discarding = true;
        }

        if header.is_eos() {
            debug!("end of stream {:#010x} at page {}", serial, sequence);
            self.ended = true;
            self.reset();
        }
    }

    /// Decide whether a page belongs to the tracked stream, switching streams on BOS
    fn track(&mut self, serial: u32, bos: bool) -> bool {
        match self.serial {
            Some(current) if current == serial => true,
            Some(current) if bos && (self.ended || !self.in_bos_group) => {
                debug!("following new bitstream {:#010x} (was {:#010x})", serial, current);
                self.adopt(serial, bos);
                true
            }
            Some(_) => false,
            None => {
                debug!("tracking bitstream {:#010x}", serial);
                self.adopt(serial, bos);
                true
            }
        }
    }

    fn adopt(&mut self, serial: u32, bos: bool) {
        self.reset();
        self.serial = Some(serial);
        self.in_bos_group = bos;
        self.ended = false;
        self.last_sequence = None;
    }
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new(AssemblerOptions::default())
    }
}

/// Iterator adapter turning a page stream into a packet stream.
///
/// Assembly errors are yielded in line and the stream carries on. A page
/// error is passed through and drops the packet in progress, unless the page
/// is known to belong to another bitstream. Whether more pages follow is up
/// to the page source.
pub struct Packets<I> {
    pages: I,
    assembler: PacketAssembler,
    ready: VecDeque<Packet>,
    errors: VecDeque<AssemblyError>,
}

impl<I> Packets<I>
where
    I: Iterator<Item = Result<OggPage, PageError>>,
{
    pub fn new(pages: I, options: AssemblerOptions) -> Self {
        Self { pages, assembler: PacketAssembler::new(options), ready: VecDeque::new(), errors: VecDeque::new() }
    }

    pub fn pages(&self) -> &I {
        &self.pages
    }

    pub fn assembler(&self) -> &PacketAssembler {
        &self.assembler
    }
}

impl<I> Iterator for Packets<I>
where
    I: Iterator<Item = Result<OggPage, PageError>>,
{
    type Item = Result<Packet, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(error) = self.errors.pop_front() {
                return Some(Err(error.into()));
            }
            if let Some(packet) = self.ready.pop_front() {
                return Some(Ok(packet));
            }

            match self.pages.next()? {
                Ok(page) => {
                    let mut errors = Vec::new();
                    self.assembler.push_page(&page, &mut self.ready, &mut errors);
                    self.errors.extend(errors);
                }
                Err(error) => {
                    let tracked = self.assembler.tracked_serial();
                    if error.serial().is_none() || error.serial() == tracked {
                        self.assembler.reset();
                    }
                    return Some(Err(error.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramingError;
    use crate::ogg::{PageReader, PageWriter, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION};
    use std::io::Cursor;

    fn pages(bytes: Vec<u8>) -> Vec<OggPage> {
        PageReader::new(Cursor::new(bytes)).collect::<Result<_, _>>().unwrap()
    }

    fn assemble(bytes: Vec<u8>) -> (Vec<Packet>, Vec<AssemblyError>) {
        let mut assembler = PacketAssembler::default();
        let mut out = VecDeque::new();
        let mut errors = Vec::new();
        for page in pages(bytes) {
            assembler.push_page(&page, &mut out, &mut errors);
        }
        (out.into_iter().collect(), errors)
    }

    #[test]
    fn packet_spanning_many_pages_is_concatenated() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        for max_segments in [1, 2, 7, 255] {
            let mut writer = PageWriter::new(42).with_max_segments(max_segments);
            let bytes = writer.write_packet(&payload, true, false);
            let (packets, errors) = assemble(bytes);
            assert!(errors.is_empty());
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].data, payload);
            assert_eq!(packets[0].serial, 42);
        }
    }

    #[test]
    fn several_packets_on_one_page() {
        let mut writer = PageWriter::new(1);
        let bytes = writer.write_page(OGG_HEADER_TYPE_BOS, vec![3, 0, 5], b"abcdefgh");
        let (packets, errors) = assemble(bytes);
        assert!(errors.is_empty());
        let bodies: Vec<&[u8]> = packets.iter().map(|p| p.data.as_slice()).collect();
        assert_eq!(bodies, vec![&b"abc"[..], &b""[..], &b"defgh"[..]]);
    }

    #[test]
    fn packet_starting_mid_page() {
        let mut writer = PageWriter::new(1);
        let mut first = vec![1u8; 4];
        first.extend(vec![2u8; 255]);
        let mut bytes = writer.write_page(OGG_HEADER_TYPE_BOS, vec![4, 255], &first);
        bytes.extend(writer.write_page(OGG_HEADER_TYPE_CONTINUATION, vec![10], &[3u8; 10]));

        let (packets, errors) = assemble(bytes);
        assert!(errors.is_empty());
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data, vec![1u8; 4]);
        assert_eq!(packets[1].data.len(), 265);
        assert_eq!(packets[1].page_sequence, 1);
    }

    #[test]
    fn orphan_continuation_is_dropped_and_assembly_resumes() {
        let mut writer = PageWriter::new(5);
        let mut data = vec![9u8; 20];
        data.extend_from_slice(b"next");
        let bytes = writer.write_page(OGG_HEADER_TYPE_CONTINUATION, vec![20, 4], &data);

        let (packets, errors) = assemble(bytes);
        assert_eq!(errors, vec![AssemblyError::OrphanContinuation { serial: 5, sequence: 0, dropped: 20 }]);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, b"next");
    }

    #[test]
    fn orphan_running_over_page_end_is_skipped_whole() {
        let mut writer = PageWriter::new(5);
        let mut bytes = writer.write_page(OGG_HEADER_TYPE_CONTINUATION, vec![255], &[0u8; 255]);
        bytes.extend(writer.write_page(OGG_HEADER_TYPE_CONTINUATION, vec![3, 2], b"endok"));

        let (packets, errors) = assemble(bytes);
        assert_eq!(errors.len(), 1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, b"ok");
    }

    #[test]
    fn unterminated_packet_is_replaced() {
        let mut writer = PageWriter::new(5);
        let mut bytes = writer.write_page(OGG_HEADER_TYPE_BOS, vec![255], &[0u8; 255]);
        bytes.extend(writer.write_page(0, vec![2], b"hi"));

        let (packets, errors) = assemble(bytes);
        assert_eq!(errors, vec![AssemblyError::UnterminatedPacket { serial: 5, sequence: 1, dropped: 255 }]);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, b"hi");
    }

    #[test]
    fn other_bitstreams_are_ignored() {
        let mut tracked = PageWriter::new(1);
        let mut sibling = PageWriter::new(2);
        let mut bytes = tracked.write_packet(b"head-a", true, false);
        bytes.extend(sibling.write_packet(b"head-b", true, false));
        bytes.extend(sibling.write_packet(b"data-b", false, false));
        bytes.extend(tracked.write_packet(b"data-a", false, false));

        let mut assembler = PacketAssembler::default();
        let mut out = VecDeque::new();
        let mut errors = Vec::new();
        for page in pages(bytes) {
            assembler.push_page(&page, &mut out, &mut errors);
        }
        let bodies: Vec<Vec<u8>> = out.into_iter().map(|p| p.data).collect();
        assert_eq!(bodies, vec![b"head-a".to_vec(), b"data-a".to_vec()]);
        assert_eq!(assembler.ignored_pages(), 2);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn chained_stream_switches_serial() {
        let mut first = PageWriter::new(1);
        let mut second = PageWriter::new(2);
        let mut bytes = first.write_packet(b"one", true, false);
        bytes.extend(first.write_packet(b"audio", false, true));
        bytes.extend(second.write_packet(b"two", true, false));
        bytes.extend(second.write_packet(b"more", false, false));

        let (packets, errors) = assemble(bytes);
        assert!(errors.is_empty());
        let serials: Vec<u32> = packets.iter().map(|p| p.serial).collect();
        assert_eq!(serials, vec![1, 1, 2, 2]);
    }

    #[test]
    fn new_chain_without_eos_still_switches() {
        let mut first = PageWriter::new(1);
        let mut second = PageWriter::new(2);
        let mut bytes = first.write_packet(b"one", true, false);
        bytes.extend(first.write_packet(b"audio", false, false));
        bytes.extend(second.write_packet(b"two", true, false));

        let (packets, _) = assemble(bytes);
        assert_eq!(packets.last().map(|p| p.serial), Some(2));
    }

    #[test]
    fn oversized_packet_is_dropped() {
        let mut writer = PageWriter::new(3).with_max_segments(2);
        let mut bytes = writer.write_packet(&[0u8; 2000], true, false);
        bytes.extend(writer.write_packet(b"small", false, false));

        let mut assembler = PacketAssembler::new(AssemblerOptions { max_packet_size: 1000 });
        let mut out = VecDeque::new();
        let mut errors = Vec::new();
        for page in pages(bytes) {
            assembler.push_page(&page, &mut out, &mut errors);
            assert!(assembler.pending_len() <= 1000);
        }
        assert_eq!(errors, vec![AssemblyError::PacketTooLarge { serial: 3, limit: 1000 }]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, b"small");
    }

    #[test]
    fn sequence_gaps_are_counted() {
        let mut writer = PageWriter::new(3);
        let mut bytes = writer.write_packet(b"a", true, false);
        writer.skip_pages(2);
        bytes.extend(writer.write_packet(b"b", false, false));

        let mut assembler = PacketAssembler::default();
        let mut out = VecDeque::new();
        let mut errors = Vec::new();
        for page in pages(bytes) {
            assembler.push_page(&page, &mut out, &mut errors);
        }
        assert_eq!(assembler.gaps(), 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn packets_iterator_passes_errors_through() {
        let mut writer = PageWriter::new(8);
        let mut bytes = writer.write_packet(b"good", true, false);
        let mut corrupt = writer.write_packet(b"bad!", false, false);
        corrupt[28] ^= 0xff;
        bytes.extend(corrupt);
        bytes.extend(writer.write_packet(b"after", false, false));

        let reader = PageReader::new(Cursor::new(bytes));
        let items: Vec<_> = Packets::new(reader, AssemblerOptions::default()).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().data, b"good");
        assert!(matches!(items[1], Err(StreamError::Page(_))));
        assert_eq!(items[2].as_ref().unwrap().data, b"after");
    }

    #[test]
    fn damaged_sibling_page_keeps_packet_in_progress() {
        let mut tracked = PageWriter::new(1).with_max_segments(1);
        let mut sibling = PageWriter::new(2);
        let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let both = tracked.write_packet(&payload, true, false);
        let first_page = 27 + 1 + 255;

        let mut bytes = both[..first_page].to_vec();
        let mut noise = sibling.write_packet(b"noise", false, false);
        noise[28] ^= 0xff;
        bytes.extend(noise);
        bytes.extend_from_slice(&both[first_page..]);

        let reader = PageReader::new(Cursor::new(bytes));
        let items: Vec<_> = Packets::new(reader, AssemblerOptions::default()).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            Err(StreamError::Page(PageError::Framing(FramingError::ChecksumMismatch { serial: 2, .. })))
        ));
        assert_eq!(items[1].as_ref().unwrap().data, payload);
    }
}
