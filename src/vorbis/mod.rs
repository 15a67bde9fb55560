// Vorbis comment header support
//
// Comment Header Packet:
// - Packet Type: 0x03 (1 byte)
// - Codec Identifier: "vorbis" (6 bytes)
// - Vendor Length (4 bytes, little-endian) + Vendor String
// - Comment Count (4 bytes, little-endian)
// - For each comment: Length (4 bytes, little-endian) + "FIELD=value"
// - Framing Bit (1 byte, lowest bit set)

pub mod comment;
pub mod decoder;
pub mod fields;

pub use comment::VorbisComment;
pub use decoder::{CommentDecoder, DecoderOptions};
pub use fields::VorbisFields;

/// Packet type byte of the comment header
pub const VORBIS_COMMENT_PACKET_TYPE: u8 = 0x03;

/// Codec identifier following the packet type in every Vorbis header
pub const VORBIS_MAGIC: &[u8; 6] = b"vorbis";

/// Length of packet type plus codec identifier
pub const VORBIS_HEADER_PREFIX_LEN: usize = 7;
