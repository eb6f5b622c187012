//! Splitting `.osu` text into sections.

use super::{
    BeatmapDocument, DocumentError, DocumentOutput, KeyValueEntry, KeyValueLine,
    LineWarning, LineWarningKind, MalformedReason, REQUIRED_SECTIONS, Section, SectionBody,
    is_layout,
};

const FORMAT_HEADER: &str = "osu file format v";

/// Name of the section opened by `line`, if it is a `[Name]` header.
fn section_name(line: &str) -> Option<&str> {
    let name = line.trim().strip_prefix('[')?.strip_suffix(']')?;
    (!name.is_empty() && !name.contains(['[', ']'])).then_some(name)
}

fn format_version(line: &str) -> Option<u32> {
    line.trim().strip_prefix(FORMAT_HEADER)?.trim().parse().ok()
}

impl Section {
    fn open(name: &str, header: &str, line: usize) -> Self {
        Self {
            header: header.to_string(),
            line,
            ..Self::new(name)
        }
    }

    fn push_source_line(&mut self, line: &str, line_number: usize, warnings: &mut Vec<LineWarning>) {
        match &mut self.body {
            SectionBody::RawLines(lines) => lines.push(line.to_string()),
            SectionBody::KeyValue(lines) => {
                if is_layout(line) {
                    lines.push(KeyValueLine::Layout(line.to_string()));
                    return;
                }
                match KeyValueEntry::split(line) {
                    Some(entry) => lines.push(KeyValueLine::Entry(entry)),
                    None => {
                        let warning = LineWarning {
                            section: self.name.clone(),
                            line: line_number,
                            content: line.to_string(),
                            kind: LineWarningKind::NotKeyValue,
                        };
                        log::warn!("{warning}");
                        warnings.push(warning);
                        lines.push(KeyValueLine::Layout(line.to_string()));
                    }
                }
            }
        }
    }
}

impl BeatmapDocument {
    /// Parses `.osu` text.
    ///
    /// `\r\n` line endings are accepted and a leading UTF-8 byte order mark is remembered.
    /// Lines that are kept but not understood are reported in [`DocumentOutput::warnings`].
    ///
    /// # Errors
    ///
    /// [`DocumentError::Malformed`] when
    /// - something other than the format header, a blank line or a comment precedes the first
    ///   section,
    /// - there is no section at all, or
    /// - one of [`REQUIRED_SECTIONS`] is missing.
    pub fn parse(source: &str) -> Result<DocumentOutput, DocumentError> {
        let (bom, text) = match source.strip_prefix('\u{feff}') {
            Some(rest) => (true, rest),
            None => (false, source),
        };
        let mut document = Self {
            bom,
            ..Self::default()
        };
        let mut warnings = Vec::new();
        let mut line_count = 0;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            line_count = line_number;
            if let Some(name) = section_name(line) {
                document.sections.push(Section::open(name, line, line_number));
                continue;
            }
            match document.sections.last_mut() {
                Some(section) => section.push_source_line(line, line_number, &mut warnings),
                None => {
                    if let Some(version) = format_version(line) {
                        document.format_version.get_or_insert(version);
                    } else if !is_layout(line) {
                        return Err(DocumentError::Malformed {
                            line: line_number,
                            reason: MalformedReason::ContentBeforeSection,
                        });
                    }
                    document.preamble.push(line.to_string());
                }
            }
        }

        if document.sections.is_empty() {
            return Err(DocumentError::Malformed {
                line: line_count + 1,
                reason: MalformedReason::NoSections,
            });
        }
        if let Some(missing) = REQUIRED_SECTIONS
            .iter()
            .find(|name| document.section(name).is_none())
        {
            return Err(DocumentError::Malformed {
                line: line_count + 1,
                reason: MalformedReason::MissingSection((*missing).to_string()),
            });
        }
        Ok(DocumentOutput { document, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_detection() {
        assert_eq!(section_name("[General]"), Some("General"));
        assert_eq!(section_name("  [Colours]  "), Some("Colours"));
        assert_eq!(section_name("[]"), None);
        assert_eq!(section_name("Key: [x]"), None);
    }

    #[test]
    fn format_header() {
        assert_eq!(format_version("osu file format v14"), Some(14));
        assert_eq!(format_version("osu file format vX"), None);
    }

    #[test]
    fn rejects_content_before_sections() {
        let err = BeatmapDocument::parse("hello\n[General]\n").unwrap_err();
        assert_eq!(
            err,
            DocumentError::Malformed {
                line: 1,
                reason: MalformedReason::ContentBeforeSection,
            }
        );
    }
}
