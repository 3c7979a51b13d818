//! Complication extraction with negation scoping.
//!
//! "No complications" claims the field so later sources cannot invent
//! one; affirmative mentions (including "due to <event>") become entries.

use super::ExtractionOutcome;
use crate::model::{Complication, RegistryRecord};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NONE_STATED: Regex = Regex::new(
        r"(?i)\b(?:no (?:immediate )?complications?|without complication|tolerated the procedure well)\b"
    )
    .expect("no complications");
    static ref EVENT: Regex = Regex::new(
        r"(?i)\b(pneumothorax|bleeding|hemorrhage|hypoxia|desaturation|hypotension|bradycardia|laryngospasm|bronchospasm|arrhythmia|respiratory failure|aspiration)\b"
    )
    .expect("complication event");
    static ref CAUSAL: Regex =
        Regex::new(r"(?i)\b(?:due to|complicated by|developed|resulting in)\b").expect("causal cue");
}

pub(crate) fn extract(text: &str, record: &mut RegistryRecord, out: &mut ExtractionOutcome) {
    let none_stated = NONE_STATED.is_match(text);

    let mut entries: Vec<Complication> = Vec::new();
    for m in EVENT.find_iter(text) {
        // "was not performed due to hypoxia": the denial belongs to the
        // procedure, not the event, so a causal cue right before the
        // event overrides negation scoping.
        let lead_start = super::floor_boundary(text, m.start().saturating_sub(24));
        let lead = text[lead_start..m.start()].to_lowercase();
        let description = m.as_str().to_lowercase();
        // "needle aspiration" and "therapeutic aspiration" are
        // procedures, not aspiration events.
        if description == "aspiration"
            && (lead.ends_with("needle ") || lead.ends_with("therapeutic ") || lead.ends_with("mucus "))
        {
            continue;
        }
        let causal = CAUSAL.is_match(&lead);
        if !causal && super::negation::is_negated(text, m.start(), m.end()) {
            continue;
        }
        if entries.iter().any(|c| c.description == description) {
            continue;
        }
        out.record_evidence("complications", text, m.start(), m.end());
        entries.push(Complication {
            description,
            severity: None,
            intervention: None,
        });
    }

    if !entries.is_empty() {
        record.complications = entries;
        out.claim("complications");
    } else if none_stated {
        // Explicit denial: claim the empty list so the LLM cannot add to it.
        out.claim("complications");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> (RegistryRecord, ExtractionOutcome) {
        let mut record = RegistryRecord::default();
        let mut out = ExtractionOutcome::default();
        extract(text, &mut record, &mut out);
        (record, out)
    }

    #[test]
    fn causal_event_captured() {
        let (record, _) = run("Planned transbronchial biopsy was NOT performed due to hypoxia.");
        assert_eq!(record.complications.len(), 1);
        assert_eq!(record.complications[0].description, "hypoxia");
    }

    #[test]
    fn negated_event_skipped() {
        let (record, out) = run("There was no pneumothorax on post-procedure imaging.");
        assert!(record.complications.is_empty());
        assert!(!out.touched.contains("complications"));
    }

    #[test]
    fn explicit_denial_claims_field() {
        let (record, out) = run("The patient tolerated the procedure well. No complications.");
        assert!(record.complications.is_empty());
        assert!(out.touched.contains("complications"));
    }

    #[test]
    fn needle_aspiration_is_not_a_complication() {
        let (record, _) = run("EBUS-guided transbronchial needle aspiration of station 7.");
        assert!(record.complications.is_empty());
    }

    #[test]
    fn multiple_events_deduplicated() {
        let (record, _) =
            run("Complicated by bleeding; bleeding controlled with iced saline. Transient hypoxia noted.");
        let names: Vec<&str> = record
            .complications
            .iter()
            .map(|c| c.description.as_str())
            .collect();
        assert_eq!(names, vec!["bleeding", "hypoxia"]);
    }
}
