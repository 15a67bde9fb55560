// OGG page reading from an open-ended byte stream

use std::io::{self, Read};

use log::{debug, warn};
use serde::Serialize;

use crate::error::{FramingError, PageError};
use crate::ogg::{
    crc, MAX_SEGMENT_SIZE, OGG_CRC_OFFSET, OGG_HEADER_SIZE, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION,
    OGG_HEADER_TYPE_EOS, OGG_SIGNATURE, OGG_VERSION,
};

/// OGG Page Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPageHeader {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: u64,
    pub bitstream_serial: u32,
    pub page_sequence: u32,
    pub crc: u32,
    pub segment_table: Vec<u8>,
}

/// OGG Page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPage {
    pub header: OggPageHeader,
    pub data: Vec<u8>,
}

impl OggPageHeader {
    /// Decode the fixed 27 byte header. The segment table is read separately.
    fn parse(fixed: &[u8; OGG_HEADER_SIZE]) -> Result<(Self, usize), FramingError> {
        if &fixed[0..4] != OGG_SIGNATURE {
            let mut found = [0u8; 4];
            found.copy_from_slice(&fixed[0..4]);
            return Err(FramingError::BadCapture { found });
        }

        let version = fixed[4];
        if version != OGG_VERSION {
            return Err(FramingError::UnsupportedVersion(version));
        }

        let header = OggPageHeader {
            version,
            header_type: fixed[5],
            granule_position: u64::from_le_bytes(le_array(&fixed[6..14])),
            bitstream_serial: u32::from_le_bytes(le_array(&fixed[14..18])),
            page_sequence: u32::from_le_bytes(le_array(&fixed[18..22])),
            crc: u32::from_le_bytes(le_array(&fixed[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4])),
            segment_table: Vec::new(),
        };
        Ok((header, fixed[26] as usize))
    }

    /// Calculate total page data size from segment table
    pub fn get_data_size(&self) -> usize {
        self.segment_table.iter().map(|&x| x as usize).sum()
    }

    /// Header size on the wire, segment table included
    pub fn encoded_len(&self) -> usize {
        OGG_HEADER_SIZE + self.segment_table.len()
    }

    /// First page continues a packet from the previous page
    pub fn is_continued(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_CONTINUATION != 0
    }

    /// Check if this is the beginning of a stream
    pub fn is_bos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_BOS != 0
    }

    /// Check if this is the end of a stream
    pub fn is_eos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_EOS != 0
    }

    /// Serialize the header as it appears on the wire.
    ///
    /// A page holds at most 255 segments; a longer table is a caller bug.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(
            self.segment_table.len() <= MAX_SEGMENT_SIZE,
            "segment table of {} entries does not fit in a page",
            self.segment_table.len()
        );
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(OGG_SIGNATURE);
        out.push(self.version);
        out.push(self.header_type);
        out.extend_from_slice(&self.granule_position.to_le_bytes());
        out.extend_from_slice(&self.bitstream_serial.to_le_bytes());
        out.extend_from_slice(&self.page_sequence.to_le_bytes());
        out.extend_from_slice(&self.crc.to_le_bytes());
        out.push(self.segment_table.len() as u8);
        out.extend_from_slice(&self.segment_table);
        out
    }
}

impl OggPage {
    /// Bytes this page occupied in the stream
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.data.len()
    }

    /// Checksum of the page as currently laid out
    pub fn compute_checksum(&self) -> u32 {
        crc::page_checksum(&self.header.to_bytes(), &self.data)
    }

    /// Serialize the whole page
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        out.extend_from_slice(&self.data);
        out
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// What to do after a bad capture pattern or version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Give up on the stream
    #[default]
    Fail,
    /// Scan forward for the next capture pattern, at most `max_bytes` far
    Scan { max_bytes: usize },
}

impl ResyncPolicy {
    pub const DEFAULT_SCAN_LIMIT: usize = 1 << 20;

    pub fn enabled(&self) -> bool {
        matches!(self, ResyncPolicy::Scan { .. })
    }
}

/// Page reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReaderOptions {
    pub verify_checksum: bool,
    pub resync: ResyncPolicy,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { verify_checksum: true, resync: ResyncPolicy::Fail }
    }
}

/// Pulls pages one at a time out of a byte source.
///
/// Never reads further than the end of the page it is currently parsing, so
/// a stalled source simply blocks inside [`Read::read`]. After a fatal error
/// or end of input every further call returns `Ok(None)`.
pub struct PageReader<R> {
    reader: R,
    options: ReaderOptions,
    consumed: u64,
    pages: u64,
    resync_seed: Option<[u8; 4]>,
    /// Bytes already taken from the source that must be read again
    pending: Vec<u8>,
    done: bool,
}

impl<R: Read> PageReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ReaderOptions::default())
    }

    pub fn with_options(reader: R, options: ReaderOptions) -> Self {
        Self { reader, options, consumed: 0, pages: 0, resync_seed: None, pending: Vec::new(), done: false }
    }

    /// Total bytes taken from the source so far
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Pages returned successfully so far
    pub fn pages_read(&self) -> u64 {
        self.pages
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next page.
    ///
    /// `Ok(None)` means the source ended cleanly on a page boundary.
    pub fn next_page(&mut self) -> Result<Option<OggPage>, PageError> {
        if self.done {
            return Ok(None);
        }

        let result = self.read_page();
        match &result {
            Ok(Some(_)) => self.pages += 1,
            Ok(None) => self.done = true,
            Err(e) if !e.is_recoverable(self.options.resync.enabled()) => self.done = true,
            Err(_) => {}
        }
        result
    }

    fn read_page(&mut self) -> Result<Option<OggPage>, PageError> {
        let mut fixed = [0u8; OGG_HEADER_SIZE];

        let mut page_read = if let Some(seed) = self.resync_seed.take() {
            if !self.scan_for_capture(seed)? {
                return Ok(None);
            }
            fixed[..4].copy_from_slice(OGG_SIGNATURE);
            4
        } else {
            let n = self.fill(&mut fixed[..4])?;
            if n == 0 {
                return Ok(None);
            }
            if n < 4 {
                return Err(PageError::Truncated { read: n, expected: OGG_HEADER_SIZE });
            }
            if &fixed[..4] != OGG_SIGNATURE {
                let found = le_array(&fixed[..4]);
                self.resync_seed = self.options.resync.enabled().then_some(found);
                return Err(FramingError::BadCapture { found }.into());
            }
            n
        };

        self.read_part(&mut fixed[4..], &mut page_read, OGG_HEADER_SIZE)?;
        let (mut header, segment_count) = match OggPageHeader::parse(&fixed) {
            Ok(parsed) => parsed,
            Err(e) => {
                if self.options.resync.enabled() {
                    // rescan from the byte after the false capture
                    self.resync_seed = Some(le_array(&fixed[1..5]));
                    self.pending = fixed[5..].to_vec();
                }
                return Err(e.into());
            }
        };

        // Read segment table
        let mut segment_table = vec![0u8; segment_count];
        self.read_part(&mut segment_table, &mut page_read, OGG_HEADER_SIZE + segment_count)?;
        header.segment_table = segment_table;

        // Read page data
        let data_size = header.get_data_size();
        let expected = header.encoded_len() + data_size;
        let mut data = vec![0u8; data_size];
        self.read_part(&mut data, &mut page_read, expected)?;

        if self.options.verify_checksum {
            let computed = crc::page_checksum(&header.to_bytes(), &data);
            if computed != header.crc {
                return Err(FramingError::ChecksumMismatch {
                    serial: header.bitstream_serial,
                    sequence: header.page_sequence,
                    stored: header.crc,
                    computed,
                }
                .into());
            }
        }

        Ok(Some(OggPage { header, data }))
    }

    /// Slide a four byte window forward until it holds the capture pattern.
    ///
    /// Returns `false` when the source ends before a pattern turns up.
    fn scan_for_capture(&mut self, seed: [u8; 4]) -> Result<bool, PageError> {
        let limit = match self.options.resync {
            ResyncPolicy::Scan { max_bytes } => max_bytes,
            ResyncPolicy::Fail => 0,
        };

        let mut window = seed;
        let mut skipped = 0usize;
        let mut byte = [0u8; 1];
        while &window != OGG_SIGNATURE {
            if skipped >= limit {
                return Err(FramingError::ResyncExhausted(limit).into());
            }
            if self.fill(&mut byte)? == 0 {
                debug!("source ended while resynchronizing after {} bytes", skipped);
                return Ok(false);
            }
            window.rotate_left(1);
            window[3] = byte[0];
            skipped += 1;
        }

        warn!("resynchronized on capture pattern after skipping {} bytes", skipped);
        Ok(true)
    }

    fn read_part(&mut self, buf: &mut [u8], page_read: &mut usize, expected: usize) -> Result<(), PageError> {
        let n = self.fill(buf)?;
        *page_read += n;
        if n < buf.len() {
            return Err(PageError::Truncated { read: *page_read, expected });
        }
        Ok(())
    }

    /// Read until `buf` is full or the source ends, returning the byte count.
    ///
    /// Pending bytes come first and are not counted as consumed again.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = self.pending.len().min(buf.len());
        buf[..filled].copy_from_slice(&self.pending[..filled]);
        self.pending.drain(..filled);

        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.consumed += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for PageReader<R> {
    type Item = Result<OggPage, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::PageWriter;
    use std::io::Cursor;

    fn two_page_stream() -> Vec<u8> {
        let mut writer = PageWriter::new(0x1234);
        let mut out = writer.write_packet(b"first packet", true, false);
        out.extend(writer.write_packet(&[7u8; 600], false, true));
        out
    }

    #[test]
    fn consumes_exactly_one_page() {
        let stream = two_page_stream();
        let mut reader = PageReader::new(Cursor::new(stream));

        let page = reader.next_page().unwrap().unwrap();
        assert_eq!(page.header.segment_table, vec![12]);
        assert_eq!(reader.bytes_consumed(), (27 + 1 + 12) as u64);
        assert_eq!(reader.into_inner().position(), 40);
    }

    #[test]
    fn reads_header_fields() {
        let mut reader = PageReader::new(Cursor::new(two_page_stream()));
        let first = reader.next_page().unwrap().unwrap();
        assert!(first.header.is_bos());
        assert!(!first.header.is_eos());
        assert_eq!(first.header.bitstream_serial, 0x1234);
        assert_eq!(first.header.page_sequence, 0);
        assert_eq!(first.data, b"first packet");

        let second = reader.next_page().unwrap().unwrap();
        assert!(second.header.is_eos());
        assert_eq!(second.header.page_sequence, 1);
        assert_eq!(second.header.segment_table, vec![255, 255, 90]);
        assert_eq!(second.data.len(), 600);

        assert!(reader.next_page().unwrap().is_none());
        assert_eq!(reader.pages_read(), 2);
    }

    #[test]
    fn empty_source_ends_cleanly() {
        let mut reader = PageReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn empty_segment_table_has_no_payload() {
        let mut writer = PageWriter::new(9);
        let bytes = writer.write_control_page(true);
        let mut reader = PageReader::new(Cursor::new(bytes));
        let page = reader.next_page().unwrap().unwrap();
        assert!(page.header.segment_table.is_empty());
        assert!(page.data.is_empty());
        assert_eq!(reader.bytes_consumed(), 27);
    }

    #[test]
    fn truncated_payload_is_fatal() {
        let mut stream = two_page_stream();
        stream.truncate(30);
        let mut reader = PageReader::new(Cursor::new(stream));
        match reader.next_page() {
            Err(PageError::Truncated { read, expected }) => {
                assert_eq!(read, 30);
                assert_eq!(expected, 40);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn bad_capture_without_resync_stops_reader() {
        let mut stream = b"junk".to_vec();
        stream.extend(two_page_stream());
        let mut reader = PageReader::new(Cursor::new(stream));
        assert!(matches!(
            reader.next_page(),
            Err(PageError::Framing(FramingError::BadCapture { found })) if &found == b"junk"
        ));
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn bad_capture_with_resync_finds_next_page() {
        let mut stream = b"xxOg".to_vec();
        stream.extend(b"garbage");
        stream.extend(two_page_stream());
        let options = ReaderOptions { verify_checksum: true, resync: ResyncPolicy::Scan { max_bytes: 64 } };
        let mut reader = PageReader::with_options(Cursor::new(stream), options);

        assert!(reader.next_page().is_err());
        let page = reader.next_page().unwrap().unwrap();
        assert_eq!(page.data, b"first packet");
        assert!(reader.next_page().unwrap().is_some());
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn resync_gives_up_after_limit() {
        let mut stream = vec![0u8; 100];
        stream.extend(two_page_stream());
        let options = ReaderOptions { verify_checksum: true, resync: ResyncPolicy::Scan { max_bytes: 16 } };
        let mut reader = PageReader::with_options(Cursor::new(stream), options);

        assert!(reader.next_page().is_err());
        assert!(matches!(
            reader.next_page(),
            Err(PageError::Framing(FramingError::ResyncExhausted(16)))
        ));
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut stream = two_page_stream();
        stream[4] = 1;
        let mut reader = PageReader::new(Cursor::new(stream));
        assert!(matches!(
            reader.next_page(),
            Err(PageError::Framing(FramingError::UnsupportedVersion(1)))
        ));
    }

    #[test]
    fn resync_after_bad_version_rescans_the_header_bytes() {
        let mut writer = PageWriter::new(5);
        let mut stream = b"OggS\x01".to_vec();
        stream.extend(writer.write_packet(b"page A", true, false));
        stream.extend(writer.write_packet(b"page B", false, false));
        let total = stream.len() as u64;

        let options = ReaderOptions { verify_checksum: true, resync: ResyncPolicy::Scan { max_bytes: 4096 } };
        let mut reader = PageReader::with_options(Cursor::new(stream), options);

        assert!(matches!(
            reader.next_page(),
            Err(PageError::Framing(FramingError::UnsupportedVersion(1)))
        ));
        assert_eq!(reader.next_page().unwrap().unwrap().data, b"page A");
        assert_eq!(reader.next_page().unwrap().unwrap().data, b"page B");
        assert!(reader.next_page().unwrap().is_none());
        assert_eq!(reader.bytes_consumed(), total);
    }

    #[test]
    fn checksum_mismatch_skips_only_that_page() {
        let mut stream = two_page_stream();
        // flip a payload byte of the first page
        stream[30] ^= 0xff;
        let mut reader = PageReader::new(Cursor::new(stream));

        assert!(matches!(
            reader.next_page(),
            Err(PageError::Framing(FramingError::ChecksumMismatch { sequence: 0, .. }))
        ));
        let second = reader.next_page().unwrap().unwrap();
        assert_eq!(second.header.page_sequence, 1);
    }

    #[test]
    fn checksum_can_be_ignored() {
        let mut stream = two_page_stream();
        stream[30] ^= 0xff;
        let options = ReaderOptions { verify_checksum: false, ..ReaderOptions::default() };
        let reader = PageReader::with_options(Cursor::new(stream), options);
        let pages: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(pages.len(), 2);
    }
}
