// Comment header recognition and decoding

use serde::Serialize;

use crate::error::DecodeError;
use crate::utils::io::check_signature;
use crate::vorbis::comment::VorbisComment;
use crate::vorbis::{VORBIS_COMMENT_PACKET_TYPE, VORBIS_HEADER_PREFIX_LEN, VORBIS_MAGIC};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderOptions {
    /// Reject comment packets whose framing bit is absent or clear
    pub strict_framing: bool,
}

/// Picks the comment header out of the packet stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentDecoder {
    options: DecoderOptions,
}

impl CommentDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Whether the packet announces itself as a comment header
    pub fn is_comment_packet(packet: &[u8]) -> bool {
        packet.first() == Some(&VORBIS_COMMENT_PACKET_TYPE) && check_signature(&packet[1..], VORBIS_MAGIC)
    }

    /// Decode a packet.
    ///
    /// `Ok(None)` for anything that is not a comment header, which is the
    /// common case: audio packets and the other two Vorbis headers.
    pub fn decode(&self, packet: &[u8]) -> Result<Option<VorbisComment>, DecodeError> {
        if !Self::is_comment_packet(packet) {
            return Ok(None);
        }

        let mut rest = &packet[VORBIS_HEADER_PREFIX_LEN..];
        let comment = VorbisComment::read(&mut rest)?;

        if self.options.strict_framing && rest.first().map_or(true, |b| b & 0x01 == 0) {
            return Err(DecodeError::MissingFramingBit);
        }

        Ok(Some(comment))
    }
}
