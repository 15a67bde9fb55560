// Vorbis comment structure

use serde::Serialize;

use crate::error::DecodeError;
use crate::utils::encoding::decode_text;
use crate::utils::io::{read_le_u32, take_bytes};
use crate::vorbis::{VORBIS_COMMENT_PACKET_TYPE, VORBIS_MAGIC};

/// Vendor string plus the raw comment entries, in stream order.
///
/// Entries are kept as written; those without a `=` are preserved but never
/// show up in [`VorbisComment::fields`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VorbisComment {
    pub vendor_string: String,
    pub entries: Vec<String>,
}

impl VorbisComment {
    pub fn new(vendor_string: impl Into<String>) -> Self {
        Self { vendor_string: vendor_string.into(), entries: Vec::new() }
    }

    /// Append a `FIELD=value` entry
    pub fn push(&mut self, field: &str, value: &str) {
        self.entries.push(format!("{}={}", field, value));
    }

    /// Builder form of [`VorbisComment::push`]
    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.push(field, value);
        self
    }

    /// Read the comment body that follows the packet type and codec identifier.
    ///
    /// `data` is advanced past the last entry, leaving the framing byte (if
    /// any) in place. Nothing beyond the slice is ever touched.
    pub fn read(data: &mut &[u8]) -> Result<Self, DecodeError> {
        // Read vendor string
        let vendor_length = read_length(data, "vendor length")?;
        let vendor_bytes = take_field(data, vendor_length, "vendor string")?;
        let vendor_string = decode_text(vendor_bytes);

        // Read comment count (little-endian 32-bit)
        let comment_count = read_length(data, "comment count")?;
        if comment_count > data.len() / 4 {
            return Err(DecodeError::TooManyEntries { count: comment_count, remaining: data.len() });
        }

        // Read comments
        let mut entries = Vec::with_capacity(comment_count);
        for _ in 0..comment_count {
            let comment_length = read_length(data, "comment length")?;
            let comment_bytes = take_field(data, comment_length, "comment")?;
            entries.push(decode_text(comment_bytes));
        }

        Ok(VorbisComment { vendor_string, entries })
    }

    /// `(field, value)` pairs of every entry containing a `=`
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| entry.split_once('='))
    }

    /// Get a comment value by field name.
    ///
    /// Field names compare case-insensitively; when a field repeats, the
    /// last occurrence wins.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields()
            .filter(|(f, _)| f.eq_ignore_ascii_case(field))
            .last()
            .map(|(_, v)| v)
    }

    /// Serialize the comment body, without packet header or framing bit
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.vendor_string.len() as u32).to_le_bytes());
        out.extend_from_slice(self.vendor_string.as_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.as_bytes());
        }
        out
    }

    /// Serialize a complete comment header packet
    pub fn to_packet(&self) -> Vec<u8> {
        let mut packet = vec![VORBIS_COMMENT_PACKET_TYPE];
        packet.extend_from_slice(VORBIS_MAGIC);
        packet.extend(self.to_bytes());
        packet.push(0x01);
        packet
    }
}

fn read_length(data: &mut &[u8], field: &'static str) -> Result<usize, DecodeError> {
    read_le_u32(data)
        .map(|value| value as usize)
        .map_err(|_| DecodeError::Truncated { field })
}

fn take_field<'a>(data: &mut &'a [u8], len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
    let remaining = data.len();
    take_bytes(data, len).ok_or(DecodeError::LengthOutOfBounds { field, declared: len, remaining })
}
