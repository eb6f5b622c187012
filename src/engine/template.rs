//! Difficulty-name templates such as `[[name]] [[rate]]x ([[bpm]]bpm)`.

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "[[name]] [[rate]]x ([[bpm]]bpm)";

/// Formats a number with at most two decimals and no trailing zeros: `180`, `7.5`, `1.25`.
#[must_use]
pub fn format_number(value: f64) -> String {
    let text = format!("{:.2}", (value * 100.0).round() / 100.0);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        _ => text.to_string(),
    }
}

/// Formats a rate like [`format_number`] but always with a decimal point: `1.0`, `1.5`, `1.25`.
#[must_use]
pub fn format_rate(rate: f64) -> String {
    let text = format_number(rate);
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Tempo shown by the `[[bpm]]` token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BpmDisplay {
    /// The tempo covering most of the map.
    Dominant(f64),
    /// Lowest and highest tempo, used when no dominant tempo is known.
    Range(f64, f64),
}

impl BpmDisplay {
    fn render(self) -> String {
        match self {
            Self::Dominant(bpm) => format_number(bpm),
            Self::Range(min, max) if (max - min).abs() < 0.005 => format_number(min),
            Self::Range(min, max) => format!("{}-{}", format_number(min), format_number(max)),
        }
    }
}

/// Values substituted into a template. Absent values leave their token as written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateValues {
    /// `[[name]]`, the source difficulty name.
    pub name: String,
    /// `[[rate]]`.
    pub rate: Option<f64>,
    /// `[[bpm]]`.
    pub bpm: Option<BpmDisplay>,
    /// `[[od]]`.
    pub od: Option<f64>,
    /// `[[hp]]`.
    pub hp: Option<f64>,
    /// `[[cs]]`.
    pub cs: Option<f64>,
    /// `[[ar]]`.
    pub ar: Option<f64>,
}

impl TemplateValues {
    fn resolve(&self, token: &str) -> Option<String> {
        match token {
            "name" => Some(self.name.clone()),
            "rate" => self.rate.map(format_rate),
            "bpm" => self.bpm.map(BpmDisplay::render),
            "od" => self.od.map(format_number),
            "hp" => self.hp.map(format_number),
            "cs" => self.cs.map(format_number),
            "ar" => self.ar.map(format_number),
            _ => None,
        }
    }
}

/// Replaces `[[token]]` occurrences. Unknown or unavailable tokens are left literal.
#[must_use]
pub fn render(template: &str, values: &TemplateValues) -> String {
    let mut output = String::with_capacity(template.len() + values.name.len());
    let mut rest = template;
    while let Some(start) = rest.find("[[") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let token = &after[..end];
        if token.contains("[[") {
            output.push_str("[[");
            rest = after;
            continue;
        }
        match values.resolve(token) {
            Some(value) => output.push_str(&value),
            None => output.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(format_number(180.0), "180");
        assert_eq!(format_number(224.99999), "225");
        assert_eq!(format_number(7.5), "7.5");
        assert_eq!(format_number(-0.001), "0");
        assert_eq!(format_rate(1.0), "1.0");
        assert_eq!(format_rate(1.25), "1.25");
    }

    #[test]
    fn default_template() {
        let values = TemplateValues {
            name: "Hard".into(),
            rate: Some(1.5),
            bpm: Some(BpmDisplay::Dominant(180.0)),
            ..TemplateValues::default()
        };
        assert_eq!(render(DEFAULT_TEMPLATE, &values), "Hard 1.5x (180bpm)");
    }

    #[test]
    fn unknown_tokens_stay() {
        let values = TemplateValues {
            name: "Insane".into(),
            od: Some(8.0),
            ..TemplateValues::default()
        };
        assert_eq!(
            render("[[name]] OD[[od]] [[foo]] [[ar]] [[x [[name]]", &values),
            "Insane OD8 [[foo]] [[ar]] [[x Insane"
        );
        assert_eq!(render("[[name]] [[open", &values), "Insane [[open");
    }
}
