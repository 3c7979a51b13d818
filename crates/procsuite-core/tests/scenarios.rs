//! End-to-end pipeline scenarios over the offline stub LLM and a fixed
//! audit backend.

mod common;

use common::{auditor_with_probs, offline_settings, quiet_auditor, service};
use procsuite_core::derive::derive;
use procsuite_core::model::{PleuralProcedure, Procedure, RegistryRecord, StentPlacement};
use procsuite_core::propagate::propagate;
use procsuite_core::providers::llm::stub::StubLlm;
use procsuite_rules::KnowledgeBase;

#[tokio::test]
async fn s1_ebus_three_stations() {
    // Auditor agrees: 31653 high, everything else quiet.
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );
    let note = "EBUS-TBNA of stations 4R, 7, and 11L; all adequate.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.record.is_performed(Procedure::LinearEbus));
    let entry = &result.record.procedures_performed[&Procedure::LinearEbus];
    assert_eq!(entry.details.stations_sampled_count, Some(3));

    assert!(result.cpt_codes.contains(&"31653".to_string()));
    assert!(!result.cpt_codes.contains(&"31652".to_string()));
    assert!(!result.cpt_codes.contains(&"31622".to_string()));
    assert!(result.audit_warnings.is_empty());
    assert!(!result.needs_manual_review);
}

#[tokio::test]
async fn s2_bal_biopsy_with_navigation() {
    let svc = service(offline_settings(), StubLlm::empty(), Some(quiet_auditor()));
    let note = "Navigational bronchoscopy with BAL of the RLL and transbronchial biopsy \
                of the right lower lobe nodule.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    for code in ["31628", "31624", "31627"] {
        assert!(
            result.cpt_codes.contains(&code.to_string()),
            "missing {} in {:?}",
            code,
            result.cpt_codes
        );
    }
}

#[tokio::test]
async fn s2_addon_dropped_without_primary() {
    let svc = service(offline_settings(), StubLlm::empty(), Some(quiet_auditor()));
    let note = "Electromagnetic navigation was used for airway inspection.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();
    assert!(!result.cpt_codes.contains(&"31627".to_string()));
    assert!(result
        .derivation_warnings
        .iter()
        .any(|w| w.contains("31627")));
}

#[tokio::test]
async fn s3_negated_biopsy_with_complication() {
    let svc = service(offline_settings(), StubLlm::empty(), Some(quiet_auditor()));
    let note = "Planned transbronchial biopsy was NOT performed due to hypoxia.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    let entry = result
        .record
        .procedures_performed
        .get(&Procedure::TransbronchialBiopsy)
        .expect("explicit denial still creates the entry");
    assert!(!entry.performed);
    assert!(!result.cpt_codes.contains(&"31628".to_string()));
    assert_eq!(result.record.complications.len(), 1);
    assert_eq!(result.record.complications[0].description, "hypoxia");
}

#[test]
fn s4_granular_only_stent_evidence() {
    let kb = KnowledgeBase::builtin().unwrap();
    let mut record = RegistryRecord::default();
    record
        .entry_mut(Procedure::AirwayStent)
        .performed = false;
    record.granular_data.stents = vec![StentPlacement {
        lobe: Some("RUL".to_string()),
        airway: None,
        device: None,
    }];

    let (propagated, warnings) = propagate(&record);
    assert!(propagated.is_performed(Procedure::AirwayStent));
    assert!(warnings
        .iter()
        .any(|w| w.contains("aggregate flag flipped from granular evidence")));

    let derivation = derive(&propagated, &kb).unwrap();
    assert!(derivation.has("31636"));
}

#[tokio::test]
async fn s5_high_conf_omission_flags_review() {
    let svc = service(
        offline_settings(),
        StubLlm::empty(),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );
    let note = "Flexible bronchoscopy with BAL of the right lower lobe.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.cpt_codes.contains(&"31624".to_string()));
    assert!(!result.cpt_codes.contains(&"31653".to_string()));
    assert!(result.needs_manual_review);
    assert!(result.audit_warnings.iter().any(|w| w
        == "RAW_ML_AUDIT[HIGH_CONF]: model suggests 31653 (prob=0.97), but deterministic derivation missed it"));
    let report = result.audit_report.unwrap();
    assert_eq!(report.high_conf_omissions.len(), 1);
    assert!(result.self_correction.is_empty(), "disabled by default");
}

#[tokio::test]
async fn s6_self_correction_recovers_omission() {
    let mut settings = offline_settings();
    settings.self_correct_enabled = true;

    // The station extractor cannot read spelled-out numbers, so the
    // derivation lands on the 1-2 station code and the auditor's 31653
    // becomes a high-confidence omission.
    let note = "EBUS-TBNA sampling of lymph node stations four R, seven, and eleven L; \
                all adequate on ROSE.";
    let judge_response = serde_json::json!({
        "json_patch": [
            {"op": "replace", "path": "/procedures_performed/linear_ebus/performed", "value": true},
            {"op": "add", "path": "/granular_data/linear_ebus", "value": {
                "stations_sampled": [
                    {"station": "4R", "adequate": true},
                    {"station": "7", "adequate": true},
                    {"station": "11L", "adequate": true}
                ]
            }}
        ],
        "evidence_quote": "stations four R, seven, and eleven L",
        "rationale": "Three distinct nodal stations are documented as sampled and adequate."
    })
    .to_string();

    let svc = service(
        settings,
        StubLlm::with_responses(vec![("Missing code".to_string(), judge_response)]),
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    );
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.cpt_codes.contains(&"31653".to_string()));
    assert!(result
        .warnings
        .iter()
        .any(|w| w == "AUTO_CORRECTED: 31653"));
    assert_eq!(result.self_correction.len(), 1);
    assert_eq!(result.self_correction[0].trigger, "31653");
    assert!(!result.self_correction[0].evidence_quotes.is_empty());

    // The rebuilt report sees agreement, not omission.
    let report = result.audit_report.unwrap();
    assert!(report.high_conf_omissions.is_empty());
    assert!(report.agreements.contains(&"31653".to_string()));
}

#[tokio::test]
async fn pleural_codes_with_ipc_bundling() {
    let svc = service(offline_settings(), StubLlm::empty(), Some(quiet_auditor()));
    let note = "Ultrasound-guided thoracentesis followed by PleurX indwelling pleural \
                catheter placement on the right.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.cpt_codes.contains(&"32550".to_string()));
    assert!(!result.cpt_codes.contains(&"32555".to_string()));
    assert!(result
        .code_rationales
        .get("32555")
        .map(|r| r.starts_with("suppressed:"))
        .unwrap_or(false));
}

#[tokio::test]
async fn pleural_thoracoscopy_with_pleurodesis() {
    let svc = service(offline_settings(), StubLlm::empty(), Some(quiet_auditor()));
    let note = "Medical thoracoscopy with talc poudrage pleurodesis was performed.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result
        .record
        .is_pleural_performed(PleuralProcedure::MedicalThoracoscopy));
    assert!(result.cpt_codes.contains(&"32601".to_string()));
    assert!(result.cpt_codes.contains(&"32650".to_string()));
    assert!(!result.cpt_codes.contains(&"32560".to_string()));
}
