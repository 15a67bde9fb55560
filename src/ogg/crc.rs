// OGG page checksum
//
// CRC-32 with polynomial 0x04c11db7, zero initial value, no reflection and
// no final xor, computed over the whole page with the CRC field zeroed.

use crc::{Algorithm, Crc};

use crate::ogg::OGG_CRC_OFFSET;

const CRC_32_OGG: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0x0000_0000,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x89a1_897f,
    residue: 0x0000_0000,
};

static OGG_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_OGG);

/// Compute the checksum of a page split into header and payload.
///
/// `header` is the full page header including the segment table. The four
/// checksum bytes are treated as zero whatever they contain.
pub fn page_checksum(header: &[u8], payload: &[u8]) -> u32 {
    let mut digest = OGG_CRC.digest();
    if header.len() >= OGG_CRC_OFFSET + 4 {
        digest.update(&header[..OGG_CRC_OFFSET]);
        digest.update(&[0u8; 4]);
        digest.update(&header[OGG_CRC_OFFSET + 4..]);
    } else {
        digest.update(header);
    }
    digest.update(payload);
    digest.finalize()
}
