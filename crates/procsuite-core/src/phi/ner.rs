//! Heuristic name recognition for mentions the structured patterns miss.
//!
//! Deliberately small: capitalized first-last pairs following a person
//! cue ("patient", "seen by", "consented"). Clinical vocabulary is
//! protected downstream by the shared veto list, and anything uncertain
//! is left alone; the structured patterns carry the bulk of the load.

use super::PhiSpan;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CUED_NAME: Regex = Regex::new(
        r"(?i)\b(?:patient|pt|seen by|consented by|consent obtained by|accompanied by)\b[ \t]+(?-i:([A-Z][a-z'-]+[ \t]+[A-Z][a-z'-]+))"
    )
    .expect("cued name pattern");
}

/// Words that begin sentences inside clinical prose and would otherwise
/// look like a name's first token.
const STOPWORDS: &[&str] = &[
    "The", "This", "There", "Then", "After", "Before", "During", "Patient", "Right", "Left",
    "Upper", "Lower", "Middle", "General", "Moderate", "Flexible", "Rigid",
];

pub(super) fn collect_name_spans(text: &str, spans: &mut Vec<PhiSpan>) {
    for caps in CUED_NAME.captures_iter(text) {
        let m = match caps.get(1) {
            Some(m) => m,
            None => continue,
        };
        let first_word = m.as_str().split_whitespace().next().unwrap_or("");
        if STOPWORDS.contains(&first_word) {
            continue;
        }
        spans.push(PhiSpan {
            start: m.start(),
            end: m.end(),
            entity_type: "name".to_string(),
            original: m.as_str().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cued_pair_detected() {
        let mut spans = Vec::new();
        collect_name_spans("The patient Harold Jensen tolerated the procedure.", &mut spans);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].original, "Harold Jensen");
    }

    #[test]
    fn clinical_sentence_not_flagged() {
        let mut spans = Vec::new();
        collect_name_spans(
            "The patient tolerated the procedure well. Right Upper lobe inspected.",
            &mut spans,
        );
        assert!(spans.is_empty());
    }
}
