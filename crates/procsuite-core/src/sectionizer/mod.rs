//! Splits a scrubbed note into labeled sections and returns the
//! procedure-focused substring the extractors work on.
//!
//! Focusing never affects auditing: the auditor always receives the full
//! scrubbed text. When no recognizable headers exist the focuser falls
//! back to the whole note and says so in a warning.

use crate::phi::ScrubbedText;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref SECTION_HEADER: Regex =
        Regex::new(r"(?mi)^[ \t]*([A-Z][A-Za-z /&-]{2,48}?)[ \t]*:").expect("section header");
}

/// Sections whose content feeds extraction. Everything else (history,
/// plan, signatures) is noise for the extractors.
const FOCUS_SECTIONS: &[&str] = &[
    "indication",
    "indications",
    "procedure",
    "procedures",
    "procedure performed",
    "procedures performed",
    "procedure in detail",
    "description of procedure",
    "operative report",
    "findings",
    "sedation",
    "anesthesia",
    "medications",
    "complications",
    "specimens",
    "impression",
    "disposition",
];

#[derive(Debug, Clone, Serialize)]
pub struct SectionSpan {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusMeta {
    pub sections: Vec<SectionSpan>,
    pub used_fallback: bool,
    pub focused_len: usize,
    pub full_len: usize,
}

#[derive(Debug, Clone)]
pub struct FocusResult {
    pub focused_text: ScrubbedText,
    pub meta: FocusMeta,
    pub warnings: Vec<String>,
}

pub fn focus(text: &ScrubbedText) -> FocusResult {
    let raw = text.as_str();
    let mut sections = Vec::new();

    let mut headers: Vec<(usize, usize, String)> = SECTION_HEADER
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?.as_str().trim().to_lowercase();
            Some((whole.start(), whole.end(), label))
        })
        .collect();
    headers.sort_by_key(|(start, _, _)| *start);

    for (idx, (start, body_start, label)) in headers.iter().enumerate() {
        let end = headers
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(raw.len());
        let _ = body_start;
        sections.push(SectionSpan {
            label: label.clone(),
            start: *start,
            end,
        });
    }

    let mut focused = String::new();
    for section in &sections {
        if FOCUS_SECTIONS.contains(&section.label.as_str()) {
            if !focused.is_empty() {
                focused.push('\n');
            }
            focused.push_str(raw[section.start..section.end].trim_end());
        }
    }

    let mut warnings = Vec::new();
    let used_fallback = focused.trim().is_empty();
    if used_fallback {
        if !sections.is_empty() {
            warnings.push(
                "sectionizer: headers found but none procedure-relevant; using full note"
                    .to_string(),
            );
        } else if !raw.trim().is_empty() {
            warnings.push("sectionizer: no section headers found; using full note".to_string());
        }
        focused = raw.to_string();
    }

    let meta = FocusMeta {
        focused_len: focused.len(),
        full_len: raw.len(),
        sections,
        used_fallback,
    };

    FocusResult {
        focused_text: ScrubbedText::from_scrubbed(focused),
        meta,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phi;

    fn scrub(text: &str) -> ScrubbedText {
        phi::redact(text).unwrap().scrubbed_text
    }

    #[test]
    fn relevant_sections_selected() {
        let note = "HISTORY: long smoking history.\n\
                    INDICATION: RUL nodule.\n\
                    PROCEDURE: flexible bronchoscopy with BAL.\n\
                    FINDINGS: patent airways.\n\
                    PLAN: follow up imaging.";
        let result = focus(&scrub(note));
        let focused = result.focused_text.as_str();
        assert!(focused.contains("INDICATION"));
        assert!(focused.contains("PROCEDURE"));
        assert!(focused.contains("FINDINGS"));
        assert!(!focused.contains("smoking history"));
        assert!(!focused.contains("PLAN"));
        assert!(!result.meta.used_fallback);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn headerless_note_falls_back_whole() {
        let note = "Flexible bronchoscopy was performed with BAL of the right lower lobe.";
        let result = focus(&scrub(note));
        assert!(result.meta.used_fallback);
        assert_eq!(result.focused_text.as_str(), note);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn headers_are_case_insensitive() {
        let note = "Procedure: EBUS-TBNA of station 7.\nImpression: adequate samples.";
        let result = focus(&scrub(note));
        assert!(!result.meta.used_fallback);
        assert!(result.focused_text.as_str().contains("EBUS-TBNA"));
    }

    #[test]
    fn empty_note_has_no_warning_spam() {
        let result = focus(&scrub(""));
        assert!(result.meta.used_fallback);
        assert!(result.warnings.is_empty());
    }
}
