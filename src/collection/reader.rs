//! Cursor over the bytes of an osu! binary database.

use super::{FormatError, OsuBinary, uleb128};

/// Flag byte of an absent string.
pub const STRING_ABSENT: u8 = 0x00;
/// Flag byte of a present string.
pub const STRING_PRESENT: u8 = 0x0b;

/// Reads little-endian values and osu-strings, tracking the current offset for error
/// positions.
#[derive(Debug, Clone)]
pub struct CollectionReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> CollectionReader<'a> {
    /// Starts reading at the beginning of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Whether any byte is left.
    #[must_use]
    pub const fn can_read(&self) -> bool {
        self.remaining() > 0
    }

    fn check_bounds(&self, size: usize) -> Result<(), FormatError> {
        if self.remaining() < size {
            return Err(FormatError::UnexpectedEof {
                offset: self.offset,
                needed: size - self.remaining(),
            });
        }
        Ok(())
    }

    /// Takes the next `size` bytes.
    ///
    /// # Errors
    ///
    /// [`FormatError::UnexpectedEof`] when fewer bytes remain.
    pub fn read_slice(&mut self, size: usize) -> Result<&'a [u8], FormatError> {
        self.check_bounds(size)?;
        let slice = self
            .data
            .get(self.offset..self.offset + size)
            .ok_or(FormatError::UnexpectedEof {
                offset: self.offset,
                needed: size,
            })?;
        self.offset += size;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let offset = self.offset;
        self.read_slice(N)?
            .try_into()
            .map_err(|_| FormatError::UnexpectedEof { offset, needed: N })
    }

    /// Reads any [`OsuBinary`] value.
    ///
    /// # Errors
    ///
    /// Whatever the value's reader reports.
    pub fn read<R: OsuBinary>(&mut self) -> Result<R, FormatError> {
        R::read(self)
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// [`FormatError::UnexpectedEof`] at the end of the data.
    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    /// Reads a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// [`FormatError::UnexpectedEof`] when fewer than four bytes remain.
    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a non-negative little-endian `i32` element count.
    ///
    /// # Errors
    ///
    /// [`FormatError::NegativeCount`] for negative values, plus the errors of
    /// [`Self::read_i32`].
    pub fn read_count(&mut self) -> Result<usize, FormatError> {
        let offset = self.offset;
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| FormatError::NegativeCount { offset, count })
    }

    /// Reads a ULEB128 `u32`.
    ///
    /// # Errors
    ///
    /// See [`uleb128::decode`].
    pub fn read_uleb128(&mut self) -> Result<u32, FormatError> {
        let rest = self.data.get(self.offset..).unwrap_or_default();
        let (value, consumed) = uleb128::decode(rest, self.offset)?;
        self.offset += consumed;
        Ok(value)
    }

    /// Reads an osu-string: `0x00` for an absent string, or `0x0b`, a ULEB128 byte length and
    /// UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// [`FormatError::InvalidStringFlag`] for any other flag byte,
    /// [`FormatError::InvalidUtf8`] for bad text, and the bounds errors of the other readers.
    pub fn read_osu_string(&mut self) -> Result<Option<String>, FormatError> {
        let offset = self.offset;
        match self.read_u8()? {
            STRING_ABSENT => Ok(None),
            STRING_PRESENT => {
                let len = self.read_uleb128()? as usize;
                let text_offset = self.offset;
                let bytes = self.read_slice(len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Some)
                    .map_err(|_| FormatError::InvalidUtf8 {
                        offset: text_offset,
                    })
            }
            flag => Err(FormatError::InvalidStringFlag { offset, flag }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_strings_and_ints() {
        let data = [0x0b, 0x03, b'a', b'b', b'c', 0x00, 0x2a, 0x00, 0x00, 0x00];
        let mut reader = CollectionReader::new(&data);
        assert_eq!(reader.read_osu_string(), Ok(Some("abc".to_string())));
        assert_eq!(reader.read_osu_string(), Ok(None));
        assert_eq!(reader.read_i32(), Ok(42));
        assert!(!reader.can_read());
    }

    #[test]
    fn bad_flag() {
        let mut reader = CollectionReader::new(&[0x07]);
        assert_eq!(
            reader.read_osu_string(),
            Err(FormatError::InvalidStringFlag { offset: 0, flag: 7 })
        );
    }

    #[test]
    fn truncated_string() {
        let mut reader = CollectionReader::new(&[0x0b, 0x05, b'a']);
        assert_eq!(
            reader.read_osu_string(),
            Err(FormatError::UnexpectedEof { offset: 2, needed: 4 })
        );
    }
}
