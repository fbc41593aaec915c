//! Unsigned LEB128 varints, used as frame length prefixes.
//!
//! Values are limited to 32 bits, so an encoding never exceeds
//! [`MAX_VARINT32_LEN`] bytes.

use std::io::{self, ErrorKind, Read, Write};

/// Longest encoding of a `u32`.
pub const MAX_VARINT32_LEN: usize = 5;

/// Encode `value` into `out`, returning the number of bytes used.
pub fn encode_varint32(mut value: u32, out: &mut [u8; MAX_VARINT32_LEN]) -> usize {
    let mut i = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out[i] = byte;
            return i + 1;
        }
        out[i] = byte | 0x80;
        i += 1;
    }
}

/// Write `value` as a varint.
///
/// # Errors
/// Propagates write failures from `w`.
pub fn write_varint32<W: Write + ?Sized>(w: &mut W, value: u32) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    let n = encode_varint32(value, &mut buf);
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// Read one varint.
///
/// Returns `Ok(None)` if the stream ends cleanly before the first byte.
///
/// # Errors
/// `UnexpectedEof` if the stream ends mid-varint, `InvalidData` if the value
/// overflows 32 bits, or any error from `r`.
pub fn read_varint32<R: Read + ?Sized>(r: &mut R) -> io::Result<Option<u32>> {
    let mut result: u32 = 0;
    for i in 0..MAX_VARINT32_LEN {
        let mut byte = [0u8; 1];
        let n = loop {
            match r.read(&mut byte) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "stream ended inside a varint",
            ));
        }
        let payload = u32::from(byte[0] & 0x7f);
        let shift = 7 * i as u32;
        if i == MAX_VARINT32_LEN - 1 && payload > 0x0f {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "varint overflows 32 bits",
            ));
        }
        result |= payload << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(Some(result));
        }
    }
    Err(io::Error::new(
        ErrorKind::InvalidData,
        "varint longer than 5 bytes",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn known_encodings() {
        let mut buf = [0u8; MAX_VARINT32_LEN];
        assert_eq!(encode_varint32(0, &mut buf), 1);
        assert_eq!(buf[0], 0);
        assert_eq!(encode_varint32(300, &mut buf), 2);
        assert_eq!(&buf[..2], &[0xac, 0x02]);
        assert_eq!(encode_varint32(u32::MAX, &mut buf), 5);
        assert_eq!(&buf, &[0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn reads_back_boundary_values() {
        for value in [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX] {
            let mut out = Vec::new();
            write_varint32(&mut out, value).unwrap();
            let mut cur = Cursor::new(out);
            assert_eq!(read_varint32(&mut cur).unwrap(), Some(value));
            assert_eq!(read_varint32(&mut cur).unwrap(), None);
        }
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let mut cur = Cursor::new(vec![0x80u8]);
        let err = read_varint32(&mut cur).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn overflowing_varint_is_rejected() {
        let mut cur = Cursor::new(vec![0xff, 0xff, 0xff, 0xff, 0x1f]);
        let err = read_varint32(&mut cur).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
