//! Unsigned LEB128, the length prefix of osu! binary strings.

use super::FormatError;

/// Longest encoding of a `u32`.
pub const MAX_U32_LEN: usize = 5;

/// Appends `value` as ULEB128: seven bits per byte, least significant group first, high bit
/// set on every byte but the last.
pub fn encode(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes a ULEB128 `u32` from the front of `bytes`, returning the value and the number of
/// bytes consumed. `offset` is only used to position errors.
///
/// # Errors
///
/// - [`FormatError::UnexpectedEof`] when `bytes` ends inside the number.
/// - [`FormatError::Uleb128Overflow`] when the value needs more than 32 bits or more than
///   [`MAX_U32_LEN`] bytes.
pub fn decode(bytes: &[u8], offset: usize) -> Result<(u32, usize), FormatError> {
    let mut value = 0u64;
    for (index, &byte) in bytes.iter().enumerate() {
        if index >= MAX_U32_LEN {
            return Err(FormatError::Uleb128Overflow { offset });
        }
        value |= u64::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            let value = u32::try_from(value).map_err(|_| FormatError::Uleb128Overflow { offset })?;
            return Ok((value, index + 1));
        }
    }
    Err(FormatError::UnexpectedEof {
        offset: offset + bytes.len(),
        needed: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        let cases: [(u32, &[u8]); 4] = [
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (value, bytes) in cases {
            let mut out = Vec::new();
            encode(value, &mut out);
            assert_eq!(out, bytes);
            assert_eq!(decode(bytes, 0), Ok((value, bytes.len())));
        }
    }

    #[test]
    fn rejects_oversized() {
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xff, 0x1f], 7),
            Err(FormatError::Uleb128Overflow { offset: 7 })
        );
        assert_eq!(
            decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00], 0),
            Err(FormatError::Uleb128Overflow { offset: 0 })
        );
        assert_eq!(
            decode(&[0x80], 3),
            Err(FormatError::UnexpectedEof { offset: 4, needed: 1 })
        );
    }
}
