//! Writing a [`BeatmapDocument`] back to `.osu` text.

use std::fmt;

use super::{BeatmapDocument, KeyValueLine, SectionBody};

impl fmt::Display for BeatmapDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bom {
            f.write_str("\u{feff}")?;
        }
        for line in &self.preamble {
            writeln!(f, "{line}")?;
        }
        for section in &self.sections {
            writeln!(f, "{}", section.header)?;
            match &section.body {
                SectionBody::KeyValue(lines) => {
                    for line in lines {
                        match line {
                            KeyValueLine::Entry(entry) => {
                                writeln!(f, "{}{}{}", entry.key, entry.separator, entry.value)?;
                            }
                            KeyValueLine::Layout(text) => writeln!(f, "{text}")?,
                        }
                    }
                }
                SectionBody::RawLines(lines) => {
                    for line in lines {
                        writeln!(f, "{line}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl BeatmapDocument {
    /// Serializes the document with `\n` line endings and a single trailing newline.
    #[must_use]
    pub fn to_osu_string(&self) -> String {
        self.to_string()
    }
}
