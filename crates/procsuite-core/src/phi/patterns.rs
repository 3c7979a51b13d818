//! Regex patterns for structured identifiers, and the veto list that
//! protects clinical vocabulary from over-eager matches.

use super::PhiSpan;
use lazy_static::lazy_static;
use regex::Regex;

struct PhiPattern {
    entity_type: &'static str,
    regex: Regex,
    /// Which capture group is the PHI; 0 means the whole match.
    group: usize,
}

lazy_static! {
    static ref PATTERNS: Vec<PhiPattern> = vec![
        PhiPattern {
            entity_type: "mrn",
            regex: Regex::new(
                r"(?i)\b(?:MRN|medical record (?:number|no\.?|#)|record #|account #|acct #)\s*[:#]?\s*([A-Z]?\d[\d-]{4,})"
            ).expect("mrn pattern"),
            group: 1,
        },
        PhiPattern {
            entity_type: "ssn",
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "phone",
            regex: Regex::new(r"\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").expect("phone pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "date",
            regex: Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("slash date pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "date",
            regex: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "date",
            regex: Regex::new(
                r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b"
            ).expect("written date pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "email",
            regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("email pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "name",
            regex: Regex::new(
                r"(?im)^[ \t]*(?:patient(?: name)?|pt|name|physician|attending|fellow|referring(?: md)?|performed by|proceduralist|surgeon)[ \t]*:[ \t]*([A-Z][A-Za-z'.-]+(?:,?[ \t]+[A-Z][a-z'.-][A-Za-z'.-]*){0,3})"
            ).expect("labeled name pattern"),
            group: 1,
        },
        PhiPattern {
            entity_type: "name",
            regex: Regex::new(
                r"\b(?:Dr|Mr|Mrs|Ms)\.?\s+[A-Z][a-z][A-Za-z'-]*(?:\s+[A-Z][a-z][A-Za-z'-]*)?"
            ).expect("titled name pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "address",
            regex: Regex::new(
                r"\b\d{1,5}\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Lane|Ln|Boulevard|Blvd|Court|Ct)\b\.?"
            ).expect("address pattern"),
            group: 0,
        },
        PhiPattern {
            entity_type: "id",
            regex: Regex::new(
                r"(?i)\b(?:accession|specimen|visit|encounter|csn|fin)\s*[:#]\s*([A-Z]{0,3}\d{5,})"
            ).expect("id header pattern"),
            group: 1,
        },
    ];

    static ref STATION_LABEL: Regex = Regex::new(r"^\d{1,2}[RL]?$").expect("station label");
    static ref SEGMENT_LABEL: Regex = Regex::new(r"^(?:RB|LB)\d{1,2}[a-c]?$").expect("segment label");
    static ref CPT_DIGITS: Regex = Regex::new(r"^\d{5}$").expect("cpt digits");
}

/// Device names that look like surnames to a naive name pass.
const DEVICE_LEXICON: &[&str] = &[
    "Zephyr", "Spiration", "Ultraflex", "Dumon", "Aero", "PleurX", "Aspira", "Monarch", "Ion",
    "Chartis", "Alair", "Bonastent", "Silmet",
];

pub(super) fn collect_pattern_spans(text: &str, spans: &mut Vec<PhiSpan>) {
    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            let m = match caps.get(pattern.group) {
                Some(m) => m,
                None => continue,
            };
            spans.push(PhiSpan {
                start: m.start(),
                end: m.end(),
                entity_type: pattern.entity_type.to_string(),
                original: m.as_str().to_string(),
            });
        }
    }
}

/// True when a candidate match is protected clinical vocabulary.
pub(super) fn is_vetoed(matched: &str, text: &str, start: usize) -> bool {
    let trimmed = matched.trim().trim_end_matches('.');
    if STATION_LABEL.is_match(trimmed) || SEGMENT_LABEL.is_match(trimmed) {
        return true;
    }
    if DEVICE_LEXICON
        .iter()
        .any(|d| trimmed.eq_ignore_ascii_case(d))
    {
        return true;
    }
    // Five bare digits next to a CPT mention are a billing code.
    if CPT_DIGITS.is_match(trimmed) {
        let window_start = start.saturating_sub(24);
        let window = &text[floor_char_boundary(text, window_start)..start];
        if window.to_lowercase().contains("cpt") {
            return true;
        }
    }
    false
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
