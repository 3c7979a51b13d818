//! PHI redaction: the input gate every note passes before anything else
//! sees it.
//!
//! Redaction is deterministic and idempotent: regex patterns for
//! structured identifiers, a heuristic name pass for free-text mentions,
//! and a veto list that protects clinical tokens (lymph-node stations,
//! segment labels, device names, CPT digits) from false positives. All
//! detected spans collapse to the single fixed placeholder so downstream
//! models see stable statistics.
//!
//! If this module fails, the pipeline fails closed: no LLM call may ever
//! receive unscrubbed text, which is why [`ScrubbedText`] can only be
//! produced here.

mod ner;
mod patterns;

use crate::errors::PipelineError;
use serde::Serialize;

pub const PLACEHOLDER: &str = "[REDACTED]";

/// Text that has passed the redaction gate. Construction is private to
/// this module: holding one is proof the content was scrubbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubbedText(String);

impl ScrubbedText {
    pub(crate) fn from_scrubbed(text: String) -> Self {
        ScrubbedText(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ScrubbedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One redacted region, in byte offsets of the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhiSpan {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
    pub original: String,
}

#[derive(Debug, Clone)]
pub struct RedactionResult {
    pub scrubbed_text: ScrubbedText,
    pub span_map: Vec<PhiSpan>,
    pub entity_types: Vec<String>,
}

/// Scrub a raw note. Errors here abort the whole request.
pub fn redact(text: &str) -> Result<RedactionResult, PipelineError> {
    let mut spans = Vec::new();
    patterns::collect_pattern_spans(text, &mut spans);
    ner::collect_name_spans(text, &mut spans);

    spans.retain(|s| !patterns::is_vetoed(&s.original, text, s.start));
    let spans = merge_overlapping(spans);

    let mut scrubbed = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for span in &spans {
        if span.start < cursor || span.end > text.len() || !text.is_char_boundary(span.start) {
            return Err(PipelineError::phi_redaction_failed(format!(
                "span {}..{} out of bounds or misaligned",
                span.start, span.end
            )));
        }
        scrubbed.push_str(&text[cursor..span.start]);
        scrubbed.push_str(PLACEHOLDER);
        cursor = span.end;
    }
    scrubbed.push_str(&text[cursor..]);

    let mut entity_types: Vec<String> = spans.iter().map(|s| s.entity_type.clone()).collect();
    entity_types.sort();
    entity_types.dedup();

    Ok(RedactionResult {
        scrubbed_text: ScrubbedText(scrubbed),
        span_map: spans,
        entity_types,
    })
}

fn merge_overlapping(mut spans: Vec<PhiSpan>) -> Vec<PhiSpan> {
    spans.sort_by_key(|s| (s.start, s.end));
    let mut merged: Vec<PhiSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start < last.end => {
                if span.end > last.end {
                    last.end = span.end;
                    last.original.clear();
                }
            }
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mrn_and_phone_redacted() {
        let result = redact("MRN: 00472913. Call 555-301-2849 with questions.").unwrap();
        let out = result.scrubbed_text.as_str();
        assert!(!out.contains("00472913"));
        assert!(!out.contains("555-301-2849"));
        assert!(out.contains(PLACEHOLDER));
        assert!(result.entity_types.iter().any(|t| t == "mrn"));
    }

    #[test]
    fn clinical_tokens_survive() {
        let note = "EBUS-TBNA of stations 4R, 7, and 11L. RB1 segment inspected. \
                    Zephyr valve placed. CPT 31653 anticipated.";
        let result = redact(note).unwrap();
        let out = result.scrubbed_text.as_str();
        assert!(out.contains("4R"));
        assert!(out.contains("11L"));
        assert!(out.contains("RB1"));
        assert!(out.contains("Zephyr"));
        assert!(out.contains("31653"));
    }

    #[test]
    fn redaction_is_idempotent() {
        let note = "Patient: John Carpenter. DOB: 04/12/1958. Dr. Whitfield performed the case.";
        let once = redact(note).unwrap();
        let twice = redact(once.scrubbed_text.as_str()).unwrap();
        assert_eq!(once.scrubbed_text, twice.scrubbed_text);
        assert!(twice.span_map.is_empty(), "second pass must find nothing");
    }

    #[test]
    fn span_map_records_originals() {
        let result = redact("DOB: 04/12/1958").unwrap();
        assert!(result
            .span_map
            .iter()
            .any(|s| s.original.contains("04/12/1958")));
    }

    #[test]
    fn names_after_headers_redacted() {
        let result = redact("Patient: Mary Ellen Shaw\nPROCEDURE: flexible bronchoscopy").unwrap();
        let out = result.scrubbed_text.as_str();
        assert!(!out.contains("Mary Ellen Shaw"));
        assert!(out.contains("PROCEDURE: flexible bronchoscopy"));
    }

    #[test]
    fn dr_names_redacted() {
        let result = redact("Performed by Dr. Okafor with fellow Dr. Lindqvist.").unwrap();
        let out = result.scrubbed_text.as_str();
        assert!(!out.contains("Okafor"));
        assert!(!out.contains("Lindqvist"));
    }
}
