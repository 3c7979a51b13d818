//! Shared fixtures for the pipeline integration tests: an offline
//! service wired with the deterministic stub LLM and a fixed-probability
//! audit backend.
#![allow(dead_code)]

use procsuite_core::audit::backend::AuditBackend;
use procsuite_core::audit::{AuditorService, Thresholds};
use procsuite_core::config::{PipelineMode, Settings};
use procsuite_core::model::RegistrySchema;
use procsuite_core::providers::llm::stub::StubLlm;
use procsuite_core::providers::llm::LlmRuntime;
use procsuite_core::RegistryService;
use procsuite_rules::KnowledgeBase;
use std::sync::Arc;

pub const AUDIT_LABELS: [&str; 3] = ["31653", "31624", "31628"];

pub struct FixedBackend(pub Vec<f64>);

impl AuditBackend for FixedBackend {
    fn classify(&self, _text: &str) -> anyhow::Result<Vec<f64>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct FailingBackend;

impl AuditBackend for FailingBackend {
    fn classify(&self, _text: &str) -> anyhow::Result<Vec<f64>> {
        anyhow::bail!("backend exploded")
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn offline_settings() -> Settings {
    let mut settings = Settings::default();
    settings.pipeline_mode = PipelineMode::ExtractionFirst;
    settings.offline_stub = true;
    settings
}

pub fn auditor_with_probs(probs: Vec<f64>) -> AuditorService {
    AuditorService::with_backend(
        Box::new(FixedBackend(probs)),
        AUDIT_LABELS.iter().map(|s| s.to_string()).collect(),
        Thresholds::default(),
    )
}

pub fn service(
    settings: Settings,
    stub: StubLlm,
    auditor: Option<AuditorService>,
) -> RegistryService {
    let kb = KnowledgeBase::builtin().expect("builtin kb");
    let schema = RegistrySchema::generated().expect("generated schema");
    let runtime = LlmRuntime::new(
        Arc::new(stub),
        settings.llm_concurrency,
        settings.llm_timeout_s,
    );
    RegistryService::with_parts(settings, kb, schema, runtime, auditor)
        .expect("service assembly")
}

/// Quiet auditor: every label far below the low threshold.
pub fn quiet_auditor() -> AuditorService {
    auditor_with_probs(vec![0.01, 0.01, 0.01])
}
