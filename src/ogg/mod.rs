// OGG container demuxing
//
// OGG Page Layout:
// - Capture Pattern: "OggS" (4 bytes)
// - Version: 0 (1 byte)
// - Header Type: 1=continuation, 2=bos, 4=eos (1 byte)
// - Granule Position (8 bytes)
// - Bitstream Serial Number (4 bytes)
// - Page Sequence Number (4 bytes)
// - CRC Checksum (4 bytes)
// - Number of Page Segments (1 byte)
// - Segment Table (variable)
// - Payload (sum of the segment table)
//
// A lacing value of 255 means the packet continues in the next segment,
// possibly on the next page. Anything below 255 ends the packet.

pub mod crc;
pub mod packet;
pub mod page;
pub mod writer;

pub use packet::{AssemblerOptions, Packet, PacketAssembler, Packets};
pub use page::{OggPage, OggPageHeader, PageReader, ReaderOptions, ResyncPolicy};
pub use writer::PageWriter;

// OGG signature
pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";

/// Only stream structure version defined by the format
pub const OGG_VERSION: u8 = 0;

/// Size of the fixed part of a page header, up to and including the segment count
pub const OGG_HEADER_SIZE: usize = 27;

/// Byte offset of the checksum field inside the page header
pub(crate) const OGG_CRC_OFFSET: usize = 22;

/// Largest lacing value; a segment of this size does not terminate its packet
pub const MAX_SEGMENT_SIZE: usize = 255;

// OGG page header types
pub const OGG_HEADER_TYPE_CONTINUATION: u8 = 0x01;
pub const OGG_HEADER_TYPE_BOS: u8 = 0x02; // Beginning of Stream
pub const OGG_HEADER_TYPE_EOS: u8 = 0x04; // End of Stream
