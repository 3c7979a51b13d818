//! The Registry Service: sequences redaction, focusing, extraction,
//! propagation, derivation, audit, and the optional correction loop.
//!
//! Components run in strict order within a request so warnings and
//! metadata are deterministic. Contained failures become warnings; only
//! PHI redaction and derivation failures abort.

use crate::audit::{compare, AuditorService};
use crate::config::{ExtractionEngine, PipelineMode, Settings};
use crate::derive::{derive, Derivation};
use crate::errors::PipelineError;
use crate::extract::{self, schema_guided, EvidenceSpan};
use crate::model::{
    AuditCompareReport, CoderDifficulty, RegistryRecord, RegistrySchema, SelfCorrectionMetadata,
};
use crate::phi::{self, ScrubbedText};
use crate::propagate::propagate;
use crate::providers::llm::{openai::OpenAiClient, stub::StubLlm, LlmClient, LlmRuntime};
use crate::sectionizer::{self, FocusMeta};
use crate::selfcorrect::{effective_allowlist, SelfCorrector};
use procsuite_rules::{KnowledgeBase, NcciTable, PatchAllowlist, RuleTable};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMeta {
    pub note_id: Option<String>,
    pub focus: FocusMeta,
    pub evidence: Vec<EvidenceSpan>,
    pub phi_entity_types: Vec<String>,
    /// Digest of the scrubbed full note, and of what the auditor was
    /// actually given; the two must match.
    pub scrubbed_sha256: String,
    pub auditor_input_sha256: Option<String>,
    pub audit_backend: Option<String>,
    pub llm_provider: String,
    pub config_snapshot: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub record: RegistryRecord,
    /// Which orchestration produced the codes.
    pub source: String,
    /// Hybrid-path decision ("ml_high_conf", "llm_judge", "llm_primary");
    /// absent on the extraction-first path.
    pub hybrid_decision: Option<String>,
    pub cpt_codes: Vec<String>,
    pub code_rationales: BTreeMap<String, String>,
    pub derivation_warnings: Vec<String>,
    pub audit_report: Option<AuditCompareReport>,
    pub audit_warnings: Vec<String>,
    pub needs_manual_review: bool,
    pub self_correction: Vec<SelfCorrectionMetadata>,
    pub coder_difficulty: CoderDifficulty,
    /// Pipeline warnings (sectionizer, extractors, LLM containment), in
    /// emission order.
    pub warnings: Vec<String>,
    pub meta: ExtractionMeta,
}

pub struct RegistryService {
    pub(crate) settings: Settings,
    pub(crate) kb: KnowledgeBase,
    pub(crate) schema: RegistrySchema,
    pub(crate) runtime: LlmRuntime,
    pub(crate) auditor: Option<AuditorService>,
    pub(crate) allowlist: PatchAllowlist,
}

impl RegistryService {
    /// Startup construction: every artifact loads here or the process
    /// does not come up.
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let mut kb = KnowledgeBase::builtin()?;
        if let Some(path) = settings.rules_path.as_deref() {
            kb.rules = RuleTable::load(path)?;
            kb.version = kb.rules.version.clone();
        }
        if let Some(path) = settings.ncci_path.as_deref() {
            kb.ncci = NcciTable::load(path)?;
        }

        let schema = match settings.schema_path.as_deref() {
            Some(path) => RegistrySchema::load(path)?,
            None => RegistrySchema::generated()?,
        };

        let client: Arc<dyn LlmClient> = if settings.offline_stub {
            Arc::new(StubLlm::empty())
        } else {
            let api_key = settings.openai_api_key.clone().ok_or_else(|| {
                anyhow::anyhow!("OPENAI_API_KEY is not set and PROCSUITE_OFFLINE_STUB is off")
            })?;
            Arc::new(OpenAiClient::new(settings.llm_model.clone(), api_key)?)
        };
        let runtime = LlmRuntime::new(client, settings.llm_concurrency, settings.llm_timeout_s);

        let auditor = AuditorService::startup(&settings)?;
        let allowlist = effective_allowlist(&settings, &kb)?;

        Ok(Self {
            settings,
            kb,
            schema,
            runtime,
            auditor,
            allowlist,
        })
    }

    /// Test seam: assemble a service from already-built parts.
    pub fn with_parts(
        settings: Settings,
        kb: KnowledgeBase,
        schema: RegistrySchema,
        runtime: LlmRuntime,
        auditor: Option<AuditorService>,
    ) -> anyhow::Result<Self> {
        let allowlist = effective_allowlist(&settings, &kb)?;
        Ok(Self {
            settings,
            kb,
            schema,
            runtime,
            auditor,
            allowlist,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn llm_latency_ms(&self) -> u64 {
        self.runtime.total_latency_ms()
    }

    /// Run only the RAW-ML auditor over a note (diagnostics surface).
    /// `None` when the auditor is disabled by configuration.
    pub fn audit_note(
        &self,
        raw_text: &str,
    ) -> Result<Option<crate::model::CasePredictions>, PipelineError> {
        let Some(auditor) = &self.auditor else {
            return Ok(None);
        };
        let redaction = phi::redact(raw_text)?;
        auditor
            .classify(&redaction.scrubbed_text)
            .map(Some)
            .map_err(|e| PipelineError::auditor_unavailable(e.to_string()))
    }

    /// Mode dispatch: the legacy hybrid path stays behind the default
    /// flag; extraction-first is opt-in.
    pub async fn extract_fields(&self, raw_text: &str) -> Result<ExtractionResult, PipelineError> {
        match self.settings.pipeline_mode {
            PipelineMode::ExtractionFirst => self.extract_fields_extraction_first(raw_text).await,
            PipelineMode::Current => self.extract_fields_hybrid(raw_text).await,
        }
    }

    /// Registry extraction only: record, warnings, meta. No coding.
    pub async fn extract_record(
        &self,
        raw_text: &str,
        note_id: Option<&str>,
    ) -> Result<(RegistryRecord, Vec<String>, ExtractionMeta), PipelineError> {
        let staged = self.stage_record(raw_text, note_id).await?;
        Ok((staged.record, staged.warnings, staged.meta))
    }

    /// The extraction-first pipeline, end to end.
    pub async fn extract_fields_extraction_first(
        &self,
        raw_text: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let staged = self.stage_record(raw_text, None).await?;
        let StagedRecord {
            record,
            warnings,
            mut meta,
            scrubbed,
            focused,
            validation_error_count,
        } = staged;

        // CPT derivation: the one post-redaction failure that aborts.
        let derivation = derive(&record, &self.kb)?;

        // Independent audit over the full scrubbed note.
        let (audit_outcome, difficulty) = self.run_auditor(&scrubbed, &mut meta);

        let (mut result_record, mut derivation, mut self_correction, mut correction_warnings) =
            (record, derivation, Vec::new(), Vec::new());

        let mut audit_report = None;
        let mut audit_warnings = Vec::new();
        let mut auditor_failed = false;

        match audit_outcome {
            AuditOutcome::Ran(audit_set) => {
                let snapshot = self.settings.snapshot();
                let mut report = compare::compare(&derivation.codes, &audit_set, &snapshot);

                if self.settings.self_correct_enabled && !report.high_conf_omissions.is_empty() {
                    let corrector = SelfCorrector {
                        settings: &self.settings,
                        kb: &self.kb,
                        allowlist: &self.allowlist,
                        runtime: &self.runtime,
                        schema: &self.schema,
                    };
                    let outcome = corrector
                        .run(
                            &result_record,
                            &derivation,
                            &report.high_conf_omissions,
                            &focused,
                            &scrubbed,
                        )
                        .await;
                    if !outcome.metadata.is_empty() {
                        // Rebuild the report against the corrected set.
                        report = compare::compare(&outcome.derivation.codes, &audit_set, &snapshot);
                    }
                    result_record = outcome.record;
                    derivation = outcome.derivation;
                    self_correction = outcome.metadata;
                    correction_warnings = outcome.warnings;
                }

                audit_warnings = report.warnings.clone();
                audit_report = Some(report);
            }
            AuditOutcome::Disabled => {}
            AuditOutcome::Failed(warning) => {
                auditor_failed = true;
                audit_warnings.push(warning);
            }
        }

        let has_validation_errors = validation_error_count > 0;
        let needs_manual_review = match &audit_report {
            Some(report) => {
                compare::needs_manual_review(report, difficulty, has_validation_errors)
            }
            None => auditor_failed || has_validation_errors,
        } || result_record.is_empty();

        let mut all_warnings = warnings;
        all_warnings.extend(correction_warnings);

        Ok(ExtractionResult {
            record: result_record,
            source: "extraction_first".to_string(),
            hybrid_decision: None,
            cpt_codes: derivation.codes.clone(),
            code_rationales: derivation.rationales.clone(),
            derivation_warnings: derivation.warnings.clone(),
            audit_report,
            audit_warnings,
            needs_manual_review,
            self_correction,
            coder_difficulty: difficulty,
            warnings: all_warnings,
            meta,
        })
    }

    /// Shared front half: redact, focus, extract, merge, hydrate,
    /// propagate.
    pub(crate) async fn stage_record(
        &self,
        raw_text: &str,
        note_id: Option<&str>,
    ) -> Result<StagedRecord, PipelineError> {
        // PHI gate. Fail closed.
        let redaction = phi::redact(raw_text)?;
        let scrubbed = redaction.scrubbed_text;

        let focus_result = sectionizer::focus(&scrubbed);
        let mut warnings = focus_result.warnings.clone();
        let focused = focus_result.focused_text;

        let mut record = RegistryRecord::default();
        let use_deterministic = self.settings.extraction_engine != ExtractionEngine::AgentsStructurer;
        let mut outcome = if use_deterministic {
            extract::run_deterministic(&focused, &mut record)
        } else {
            let mut outcome = extract::ExtractionOutcome::default();
            outcome.claim("granular_validation_warnings");
            outcome
        };
        warnings.append(&mut outcome.warnings);

        // Schema-guided LLM fills what the rules could not.
        let llm_input = match self.settings.extraction_engine {
            // agents_focus_then_engine hands the model the whole note
            // and lets it find the procedure region itself.
            ExtractionEngine::AgentsFocusThenEngine => &scrubbed,
            _ => &focused,
        };
        let (fragment, mut llm_warnings) = schema_guided::extract_fragment(
            &self.runtime,
            llm_input,
            &self.schema,
            self.settings.registry_task_timeout_s,
        )
        .await;
        warnings.append(&mut llm_warnings);
        let mut merge_warnings =
            extract::merge_llm_fragment(&mut record, &fragment, &outcome.touched, &self.schema);
        let validation_error_count = merge_warnings.len()
            + warnings
                .iter()
                .filter(|w| w.contains("schema_guided"))
                .count();
        warnings.append(&mut merge_warnings);

        // Keyword hydration, lowest priority.
        let hydrated = extract::keywords::hydrate(focused.as_str(), &mut record);
        for path in hydrated {
            tracing::debug!("hydrated {} from keyword evidence", path);
        }

        // Single granular-to-aggregate pass.
        let (record, propagation_warnings) = propagate(&record);
        warnings.extend(propagation_warnings);

        let meta = ExtractionMeta {
            note_id: note_id.map(str::to_string),
            focus: focus_result.meta,
            evidence: outcome.evidence,
            phi_entity_types: redaction.entity_types,
            scrubbed_sha256: sha256_hex(scrubbed.as_str()),
            auditor_input_sha256: None,
            audit_backend: None,
            llm_provider: self.runtime.provider_name().to_string(),
            config_snapshot: self.settings.snapshot(),
        };

        Ok(StagedRecord {
            record,
            warnings,
            meta,
            scrubbed,
            focused,
            validation_error_count,
        })
    }

    fn run_auditor(
        &self,
        scrubbed: &ScrubbedText,
        meta: &mut ExtractionMeta,
    ) -> (AuditOutcome, CoderDifficulty) {
        let Some(auditor) = &self.auditor else {
            return (AuditOutcome::Disabled, CoderDifficulty::Disabled);
        };
        // The auditor always reads the full scrubbed note, never the
        // focused substring; the digest in meta makes that inspectable.
        meta.auditor_input_sha256 = Some(sha256_hex(scrubbed.as_str()));
        meta.audit_backend = Some(auditor.backend_name().to_string());
        match auditor.classify(scrubbed) {
            Ok(case) => {
                let audit_set = auditor.audit_set(&case, &self.settings);
                let difficulty = AuditorService::difficulty(&audit_set);
                (AuditOutcome::Ran(audit_set), difficulty)
            }
            Err(e) => {
                let err = PipelineError::auditor_unavailable(e.to_string());
                (
                    AuditOutcome::Failed(err.as_warning()),
                    CoderDifficulty::Disabled,
                )
            }
        }
    }
}

enum AuditOutcome {
    Ran(Vec<crate::model::AuditPrediction>),
    Disabled,
    Failed(String),
}

pub(crate) struct StagedRecord {
    pub(crate) record: RegistryRecord,
    pub(crate) warnings: Vec<String>,
    pub(crate) meta: ExtractionMeta,
    pub(crate) scrubbed: ScrubbedText,
    pub(crate) focused: ScrubbedText,
    pub(crate) validation_error_count: usize,
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
