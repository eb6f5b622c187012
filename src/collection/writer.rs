//! Byte sink for osu! binary databases.

use super::{
    OsuBinary,
    reader::{STRING_ABSENT, STRING_PRESENT},
    uleb128,
};

/// Accumulates little-endian values and osu-strings.
#[derive(Debug, Clone, Default)]
pub struct CollectionWriter {
    data: Vec<u8>,
}

impl CollectionWriter {
    /// An empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn data(self) -> Vec<u8> {
        self.data
    }

    /// Writes any [`OsuBinary`] value.
    pub fn write<S: OsuBinary>(&mut self, value: &S) {
        value.write(self);
    }

    /// Appends bytes unchanged.
    pub fn write_raw_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.write_raw_bytes(&value.to_le_bytes());
    }

    /// Writes an element count. Counts beyond `i32::MAX` are clamped, which no database
    /// reaches.
    pub fn write_count(&mut self, count: usize) {
        self.write_i32(i32::try_from(count).unwrap_or(i32::MAX));
    }

    /// Writes a ULEB128 `u32`.
    pub fn write_uleb128(&mut self, value: u32) {
        uleb128::encode(value, &mut self.data);
    }

    /// Writes an osu-string; `None` becomes the single absent flag byte.
    pub fn write_osu_string(&mut self, value: Option<&str>) {
        let Some(text) = value else {
            self.data.push(STRING_ABSENT);
            return;
        };
        self.data.push(STRING_PRESENT);
        self.write_uleb128(u32::try_from(text.len()).unwrap_or(u32::MAX));
        self.write_raw_bytes(text.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_strings() {
        let mut writer = CollectionWriter::new();
        writer.write_osu_string(Some("abc"));
        writer.write_osu_string(None);
        writer.write_osu_string(Some(""));
        assert_eq!(
            writer.data(),
            vec![0x0b, 0x03, b'a', b'b', b'c', 0x00, 0x0b, 0x00]
        );
    }
}
