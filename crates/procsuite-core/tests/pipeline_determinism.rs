//! Determinism, PHI boundary, and auditor-input guarantees of the full
//! pipeline.

mod common;

use common::{auditor_with_probs, offline_settings, service};
use procsuite_core::phi;
use procsuite_core::providers::llm::stub::StubLlm;
use sha2::{Digest, Sha256};

const NOTE: &str = "Patient: Harold Jensen. MRN: 00472913.\n\
    INDICATION: 67-year-old male with mediastinal adenopathy.\n\
    PROCEDURE: EBUS-TBNA of stations 4R, 7, and 11L; all adequate.\n\
    Moderate sedation with midazolam 2 mg and fentanyl 100 mcg.\n\
    No complications.";

#[tokio::test]
async fn two_runs_are_bitwise_identical() {
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );

    let first = svc.extract_fields_extraction_first(NOTE).await.unwrap();
    let second = svc.extract_fields_extraction_first(NOTE).await.unwrap();

    assert_eq!(first.record, second.record);
    assert_eq!(first.cpt_codes, second.cpt_codes);
    assert_eq!(first.code_rationales, second.code_rationales);
    assert_eq!(first.warnings, second.warnings);
    assert_eq!(first.audit_warnings, second.audit_warnings);
    assert_eq!(first.needs_manual_review, second.needs_manual_review);
    assert_eq!(
        serde_json::to_value(&first.audit_report.as_ref().unwrap()).unwrap(),
        serde_json::to_value(&second.audit_report.as_ref().unwrap()).unwrap()
    );
}

#[tokio::test]
async fn phi_never_crosses_the_gate() {
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );

    let redaction = phi::redact(NOTE).unwrap();
    assert!(!redaction.span_map.is_empty());

    let result = svc.extract_fields_extraction_first(NOTE).await.unwrap();

    // The meta digest proves the pipeline worked from the scrubbed text.
    let scrubbed_digest = hex::encode(Sha256::digest(redaction.scrubbed_text.as_str().as_bytes()));
    assert_eq!(result.meta.scrubbed_sha256, scrubbed_digest);
    assert!(result.meta.phi_entity_types.iter().any(|t| t == "mrn"));

    // Nothing recorded downstream carries the original tokens.
    let serialized = result.record.to_value().to_string();
    for span in &redaction.span_map {
        if span.original.is_empty() {
            continue;
        }
        assert!(
            !serialized.contains(&span.original),
            "record leaked PHI token {:?}",
            span.original
        );
    }
}

#[tokio::test]
async fn auditor_reads_full_note_not_focused() {
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );
    let result = svc.extract_fields_extraction_first(NOTE).await.unwrap();

    // The focused region drops the name header, so its digest differs;
    // the auditor input must equal the full scrubbed note.
    assert_eq!(
        result.meta.auditor_input_sha256.as_deref(),
        Some(result.meta.scrubbed_sha256.as_str())
    );
    assert!(result.meta.focus.focused_len < result.meta.focus.full_len);
}

#[tokio::test]
async fn structured_fields_extracted_alongside() {
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );
    let result = svc.extract_fields_extraction_first(NOTE).await.unwrap();

    let record = &result.record;
    assert_eq!(record.demographics.age_band.as_deref(), Some("60-69"));
    assert_eq!(record.demographics.sex.as_deref(), Some("male"));
    assert!(record
        .demographics
        .indication
        .as_deref()
        .unwrap_or_default()
        .contains("mediastinal adenopathy"));
    assert_eq!(record.sedation.sedation_type.as_deref(), Some("moderate"));
    assert_eq!(record.sedation.agents.len(), 2);
    assert!(record.complications.is_empty());
}
