// OGG page writing
//
// Lays packets out into checksummed pages, for building test streams.

use crate::ogg::page::{OggPage, OggPageHeader};
use crate::ogg::{
    MAX_SEGMENT_SIZE, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS,
    OGG_VERSION,
};

/// Builds the pages of one logical bitstream
#[derive(Debug, Clone)]
pub struct PageWriter {
    serial: u32,
    sequence: u32,
    max_segments: usize,
}

impl PageWriter {
    pub fn new(serial: u32) -> Self {
        Self { serial, sequence: 0, max_segments: 255 }
    }

    /// Cap the segment table size so that packets spill over more pages
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments.clamp(1, 255);
        self
    }

    /// Sequence number the next page will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Skip sequence numbers, as if pages had been lost
    pub fn skip_pages(&mut self, count: u32) {
        self.sequence = self.sequence.wrapping_add(count);
    }

    /// Write one packet, spread over as many pages as its lacing needs
    pub fn write_packet(&mut self, packet: &[u8], bos: bool, eos: bool) -> Vec<u8> {
        let lacing = lacing_values(packet.len());
        let chunks: Vec<&[u8]> = lacing.chunks(self.max_segments).collect();
        let last = chunks.len() - 1;

        let mut out = Vec::new();
        let mut offset = 0usize;
        for (i, table) in chunks.into_iter().enumerate() {
            let len: usize = table.iter().map(|&x| x as usize).sum();
            let mut header_type = 0u8;
            if i > 0 {
                header_type |= OGG_HEADER_TYPE_CONTINUATION;
            }
            if bos && i == 0 {
                header_type |= OGG_HEADER_TYPE_BOS;
            }
            if eos && i == last {
                header_type |= OGG_HEADER_TYPE_EOS;
            }
            out.extend(self.write_page(header_type, table.to_vec(), &packet[offset..offset + len]));
            offset += len;
        }
        out
    }

    /// Write a page that carries no segments at all
    pub fn write_control_page(&mut self, eos: bool) -> Vec<u8> {
        let header_type = if eos { OGG_HEADER_TYPE_EOS } else { 0 };
        self.write_page(header_type, Vec::new(), &[])
    }

    /// Write a page with an explicit segment table.
    ///
    /// `data` must be exactly as long as the table says.
    pub fn write_page(&mut self, header_type: u8, segment_table: Vec<u8>, data: &[u8]) -> Vec<u8> {
        let mut page = OggPage {
            header: OggPageHeader {
                version: OGG_VERSION,
                header_type,
                granule_position: 0,
                bitstream_serial: self.serial,
                page_sequence: self.sequence,
                crc: 0,
                segment_table,
            },
            data: data.to_vec(),
        };
        page.header.crc = page.compute_checksum();
        self.sequence = self.sequence.wrapping_add(1);
        page.to_bytes()
    }
}

/// Lacing values for a packet of `size` bytes.
///
/// A packet whose length is a multiple of 255 ends with a zero length segment.
pub fn lacing_values(size: usize) -> Vec<u8> {
    let mut table = vec![MAX_SEGMENT_SIZE as u8; size / MAX_SEGMENT_SIZE];
    table.push((size % MAX_SEGMENT_SIZE) as u8);
    table
}
