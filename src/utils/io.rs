// Little-endian field readers over in-memory packets
//
// A `&[u8]` is consumed from the front as fields are read, so whatever is
// left in the slice is exactly what remains of the packet.

use std::io::Read;

/// Read little-endian 32-bit integer
pub fn read_le_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

/// Split `len` bytes off the front of `data`, or `None` if fewer remain
pub fn take_bytes<'a>(data: &mut &'a [u8], len: usize) -> Option<&'a [u8]> {
    if len > data.len() {
        return None;
    }
    let (head, tail) = data.split_at(len);
    *data = tail;
    Some(head)
}

/// Check if data starts with signature
pub fn check_signature(data: &[u8], signature: &[u8]) -> bool {
    data.len() >= signature.len() && &data[..signature.len()] == signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_consume_the_slice() {
        let bytes = [5u8, 0, 0, 0, b'h', b'e', b'l', b'l', b'o', b'!'];
        let mut rest = &bytes[..];
        assert_eq!(read_le_u32(&mut rest).unwrap(), 5);
        assert_eq!(take_bytes(&mut rest, 5), Some(&b"hello"[..]));
        assert_eq!(rest, b"!");
        assert_eq!(take_bytes(&mut rest, 2), None);
        assert_eq!(rest, b"!");
    }

    #[test]
    fn short_integer_is_an_error() {
        let mut rest = &[1u8, 2][..];
        assert!(read_le_u32(&mut rest).is_err());
    }
}
