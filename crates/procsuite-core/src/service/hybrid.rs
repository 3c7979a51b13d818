//! Legacy hybrid-policy orchestration, kept behind the default pipeline
//! mode for comparison against extraction-first.
//!
//! ML-first: a high-confidence prediction set ships as-is (after NCCI),
//! the gray zone asks the LLM to judge with the ML hints, and a
//! low-confidence case hands the LLM primary responsibility. The record
//! itself is staged exactly as in extraction-first so both paths return
//! the same shape.

use super::registry::{ExtractionResult, RegistryService};
use crate::audit::AuditorService;
use crate::derive::apply_ncci;
use crate::errors::PipelineError;
use crate::model::{AuditPrediction, CoderDifficulty};
use std::collections::BTreeMap;

const JUDGE_SYSTEM_PROMPT: &str = "You are a CPT coding assistant for interventional pulmonology. \
Given a procedure note and candidate codes from a classifier, answer with ONLY a JSON object \
{\"codes\": [\"...\"]} listing the codes the note actually supports. Do not add codes the note \
does not document.";

const PRIMARY_SYSTEM_PROMPT: &str = "You are a CPT coding assistant for interventional \
pulmonology. Read the procedure note and answer with ONLY a JSON object {\"codes\": [\"...\"]} \
listing the CPT codes the note supports.";

impl RegistryService {
    pub async fn extract_fields_hybrid(
        &self,
        raw_text: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let staged = self.stage_for_hybrid(raw_text).await?;
        let (mut result, scrubbed) = staged;

        let audit_set: Vec<AuditPrediction> = match &self.auditor {
            Some(auditor) => match auditor.classify(&scrubbed) {
                Ok(case) => auditor.audit_set(&case, &self.settings),
                Err(e) => {
                    result
                        .audit_warnings
                        .push(PipelineError::auditor_unavailable(e.to_string()).as_warning());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let difficulty = if audit_set.is_empty() && self.auditor.is_none() {
            CoderDifficulty::Disabled
        } else {
            AuditorService::difficulty(&audit_set)
        };

        let (candidates, decision): (Vec<String>, &str) = match difficulty {
            CoderDifficulty::HighConf => (
                audit_set.iter().map(|p| p.cpt.clone()).collect(),
                "ml_high_conf",
            ),
            CoderDifficulty::GrayZone => {
                let hints: Vec<String> = audit_set
                    .iter()
                    .map(|p| format!("{} (prob={:.2})", p.cpt, p.probability))
                    .collect();
                let prompt = format!(
                    "Candidate codes from the classifier:\n{}\n\nNote:\n{}",
                    hints.join("\n"),
                    scrubbed.as_str()
                );
                (
                    self.llm_code_list(&prompt, JUDGE_SYSTEM_PROMPT, &mut result.warnings)
                        .await,
                    "llm_judge",
                )
            }
            _ => {
                let prompt = format!("Note:\n{}", scrubbed.as_str());
                (
                    self.llm_code_list(&prompt, PRIMARY_SYSTEM_PROMPT, &mut result.warnings)
                        .await,
                    "llm_primary",
                )
            }
        };

        // NCCI/MER filter, shared with the derivation engine.
        let (kept, suppressed) = apply_ncci(candidates, &self.kb.ncci);

        let mut rationales: BTreeMap<String, String> = BTreeMap::new();
        for code in &kept {
            let rationale = match audit_set.iter().find(|p| &p.cpt == code) {
                Some(p) => format!(
                    "hybrid {}: classifier probability {:.2} [{}]",
                    decision, p.probability, p.bucket
                ),
                None => format!("hybrid {}: selected by LLM", decision),
            };
            rationales.insert(code.clone(), rationale);
        }
        rationales.extend(suppressed);

        result.source = "hybrid".to_string();
        result.hybrid_decision = Some(decision.to_string());
        result.cpt_codes = kept;
        result.code_rationales = rationales;
        result.coder_difficulty = difficulty;
        result.needs_manual_review = result.needs_manual_review
            || !matches!(
                difficulty,
                CoderDifficulty::HighConf | CoderDifficulty::Disabled
            )
            || !result.audit_warnings.is_empty()
            || result.record.is_empty();

        Ok(result)
    }

    /// Stage the record and wrap it in a result skeleton the hybrid
    /// decision then fills in.
    async fn stage_for_hybrid(
        &self,
        raw_text: &str,
    ) -> Result<(ExtractionResult, crate::phi::ScrubbedText), PipelineError> {
        // Reuse the extraction-first front half for the record so both
        // paths agree on what happened clinically.
        let staged = self.stage_record(raw_text, None).await?;

        Ok((
            ExtractionResult {
                record: staged.record,
                source: "hybrid".to_string(),
                hybrid_decision: None,
                cpt_codes: Vec::new(),
                code_rationales: BTreeMap::new(),
                derivation_warnings: Vec::new(),
                audit_report: None,
                audit_warnings: Vec::new(),
                needs_manual_review: staged.validation_error_count > 0,
                self_correction: Vec::new(),
                coder_difficulty: CoderDifficulty::Unknown,
                warnings: staged.warnings,
                meta: staged.meta,
            },
            staged.scrubbed,
        ))
    }

    async fn llm_code_list(
        &self,
        prompt: &str,
        system: &str,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let response = match self.runtime.call_json(prompt, Some(system)).await {
            Ok(response) => response,
            Err(e) => {
                warnings.push(e.as_warning());
                return Vec::new();
            }
        };
        let parsed: serde_json::Value = match serde_json::from_str(response.text.trim()) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(format!("hybrid: LLM code list not JSON ({})", e));
                return Vec::new();
            }
        };
        let known = self.kb.rules.codes();
        parsed
            .get("codes")
            .and_then(|v| v.as_array())
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|c| c.as_str())
                    .filter(|c| known.iter().any(|k| k == c))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
