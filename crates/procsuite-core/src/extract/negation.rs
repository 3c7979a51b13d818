//! Negation scoping for keyword matches.
//!
//! A phrase counts as negated when a cue appears shortly before it
//! ("no", "without") or a denial follows it within the same sentence
//! ("was not performed", "aborted"). Windows stop at sentence
//! boundaries so a denial in the next sentence does not leak backwards.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PRE_CUES: Regex = Regex::new(
        r"(?i)\b(?:no|not|without|denies|declined|negative for|rather than|instead of)\b[^.;:\n]{0,40}$"
    )
    .expect("pre-negation cues");
    static ref POST_CUES: Regex = Regex::new(
        r"(?i)^[^.;\n]{0,60}?\b(?:was not|were not|not performed|not attempted|not completed|aborted|deferred|cancelled|unable to|could not)\b"
    )
    .expect("post-negation cues");
}

/// Is the phrase at `start..end` negated in its sentence?
pub fn is_negated(text: &str, start: usize, end: usize) -> bool {
    let before_start = sentence_start(text, start);
    let before = &text[before_start..start];
    if PRE_CUES.is_match(before) {
        return true;
    }
    let after_end = sentence_end(text, end);
    let after = &text[end..after_end];
    POST_CUES.is_match(after)
}

fn sentence_start(text: &str, idx: usize) -> usize {
    let bytes = text.as_bytes();
    let floor = idx.saturating_sub(80);
    let mut i = idx;
    while i > floor {
        let c = bytes[i - 1];
        if c == b'.' || c == b';' || c == b'\n' {
            break;
        }
        i -= 1;
    }
    super::floor_boundary(text, i)
}

fn sentence_end(text: &str, idx: usize) -> usize {
    let bytes = text.as_bytes();
    let ceiling = (idx + 80).min(text.len());
    let mut i = idx;
    while i < ceiling {
        let c = bytes[i];
        if c == b'.' || c == b';' || c == b'\n' {
            break;
        }
        i += 1;
    }
    super::ceil_boundary(text, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(text: &str, phrase: &str) -> (usize, usize) {
        let start = text.find(phrase).expect("phrase present");
        (start, start + phrase.len())
    }

    #[test]
    fn post_denial_detected() {
        let text = "Planned transbronchial biopsy was NOT performed due to hypoxia.";
        let (s, e) = span_of(text, "transbronchial biopsy");
        assert!(is_negated(text, s, e));
    }

    #[test]
    fn pre_cue_detected() {
        let text = "There was no endobronchial biopsy taken.";
        let (s, e) = span_of(text, "endobronchial biopsy");
        assert!(is_negated(text, s, e));
    }

    #[test]
    fn plain_mention_not_negated() {
        let text = "Transbronchial biopsy of the right lower lobe was performed.";
        let (s, e) = span_of(text, "ransbronchial biopsy");
        assert!(!is_negated(text, s, e));
    }

    #[test]
    fn denial_in_next_sentence_does_not_leak() {
        let text = "BAL was performed in the RLL. Brushings were not obtained.";
        let (s, e) = span_of(text, "BAL");
        assert!(!is_negated(text, s, e));
    }
}
