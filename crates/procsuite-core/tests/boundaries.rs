//! Boundary behaviors: empty input, LLM timeout containment, auditor
//! failure degradation.

mod common;

use async_trait::async_trait;
use common::{auditor_with_probs, offline_settings, service, AUDIT_LABELS};
use procsuite_core::audit::{AuditorService, Thresholds};
use procsuite_core::model::{CoderDifficulty, Procedure};
use procsuite_core::providers::llm::stub::StubLlm;
use procsuite_core::providers::llm::{LlmClient, LlmError, LlmResponse, LlmRuntime};
use procsuite_core::RegistryService;
use procsuite_rules::KnowledgeBase;
use std::sync::Arc;

#[tokio::test]
async fn empty_note_yields_empty_result_needing_review() {
    let svc = service(offline_settings(), StubLlm::empty(), None);
    let result = svc.extract_fields_extraction_first("").await.unwrap();

    assert!(result.record.is_empty());
    assert!(result.cpt_codes.is_empty());
    assert!(result.needs_manual_review);
    assert_eq!(result.coder_difficulty, CoderDifficulty::Disabled);
}

/// A client that never answers in time.
struct StallingStub;

#[async_trait]
impl LlmClient for StallingStub {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(LlmError::Network("unreachable".to_string()))
    }

    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        self.complete(prompt, system).await
    }

    fn provider_name(&self) -> &'static str {
        "stalling"
    }

    fn model_name(&self) -> &str {
        "stalling"
    }
}

#[tokio::test]
async fn llm_timeout_leaves_deterministic_record() {
    let mut settings = offline_settings();
    settings.registry_task_timeout_s = 0;

    let kb = KnowledgeBase::builtin().unwrap();
    let schema = procsuite_core::RegistrySchema::generated().unwrap();
    let runtime = LlmRuntime::new(Arc::new(StallingStub), 2, 1);
    let svc = RegistryService::with_parts(
        settings,
        kb,
        schema,
        runtime,
        Some(auditor_with_probs(vec![0.97, 0.05, 0.05])),
    )
    .unwrap();

    let note = "EBUS-TBNA of stations 4R, 7, and 11L; all adequate.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    // Deterministic extraction carried the case despite the dead LLM.
    assert!(result.record.is_performed(Procedure::LinearEbus));
    assert!(result.cpt_codes.contains(&"31653".to_string()));
    assert!(result.warnings.iter().any(|w| w.contains("timed out")));
}

#[tokio::test]
async fn auditor_failure_degrades_to_review() {
    let auditor = AuditorService::with_backend(
        Box::new(common::FailingBackend),
        AUDIT_LABELS.iter().map(|s| s.to_string()).collect(),
        Thresholds::default(),
    );
    let svc = service(offline_settings(), StubLlm::empty(), Some(auditor));

    let note = "Flexible bronchoscopy with BAL of the right lower lobe.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.cpt_codes.contains(&"31624".to_string()), "codes still derived");
    assert!(result.needs_manual_review);
    assert_eq!(result.coder_difficulty, CoderDifficulty::Disabled);
    assert!(result
        .audit_warnings
        .iter()
        .any(|w| w.contains("auditor unavailable") || w.contains("RAW-ML auditor")));
    assert!(result.audit_report.is_none());
}

#[tokio::test]
async fn disabled_auditor_is_not_a_failure() {
    let svc = service(offline_settings(), StubLlm::empty(), None);
    let note = "Flexible bronchoscopy with BAL of the right lower lobe.";
    let result = svc.extract_fields_extraction_first(note).await.unwrap();

    assert!(result.cpt_codes.contains(&"31624".to_string()));
    assert_eq!(result.coder_difficulty, CoderDifficulty::Disabled);
    assert!(result.audit_warnings.is_empty());
    assert!(!result.needs_manual_review);
}
