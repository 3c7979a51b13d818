//! Guarded self-correction.
//!
//! When the auditor is highly confident about a code the deterministic
//! derivation missed, a judge LLM may propose a small JSON Patch to the
//! record. Every proposal runs the same gauntlet: keyword guard, op and
//! pointer allow-list checks, evidence-quote substring check, schema
//! check, then re-propagation and re-derivation. The patch is only
//! accepted when the missing code actually becomes derivable from the
//! patched record and the record really changed. Anything else is a
//! skip with a reason, never a state change.

use crate::config::Settings;
use crate::derive::{derive, Derivation};
use crate::errors::PipelineError;
use crate::model::{
    AuditPrediction, RegistryRecord, RegistrySchema, SelfCorrectionMetadata,
};
use crate::phi::ScrubbedText;
use crate::propagate::propagate;
use crate::providers::llm::LlmRuntime;
use procsuite_rules::{KnowledgeBase, PatchAllowlist};
use serde_json::Value;

const JUDGE_SYSTEM_PROMPT: &str = "You are a clinical coding auditor. The deterministic coder \
missed a CPT code that an independent model believes is documented in the note. Propose the \
smallest JSON Patch to the registry record that captures the documented evidence. Respond with \
ONLY a JSON object: {\"json_patch\": [...], \"evidence_quote\": \"...\", \"rationale\": \"...\"}. \
The evidence_quote must be copied verbatim from the note. Only 'add' and 'replace' operations \
on the allowed pointers are accepted. Do not invent findings.";

pub struct CorrectionOutcome {
    pub record: RegistryRecord,
    pub derivation: Derivation,
    pub metadata: Vec<SelfCorrectionMetadata>,
    pub warnings: Vec<String>,
}

pub struct SelfCorrector<'a> {
    pub settings: &'a Settings,
    pub kb: &'a KnowledgeBase,
    pub allowlist: &'a PatchAllowlist,
    pub runtime: &'a LlmRuntime,
    pub schema: &'a RegistrySchema,
}

impl<'a> SelfCorrector<'a> {
    /// Work through the omissions in probability order until the attempt
    /// budget runs out. Only accepted patches mutate the returned state.
    pub async fn run(
        &self,
        record: &RegistryRecord,
        derivation: &Derivation,
        omissions: &[AuditPrediction],
        focused: &ScrubbedText,
        full_text: &ScrubbedText,
    ) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome {
            record: record.clone(),
            derivation: derivation.clone(),
            metadata: Vec::new(),
            warnings: Vec::new(),
        };

        let mut candidates: Vec<&AuditPrediction> = omissions
            .iter()
            .filter(|p| p.probability >= self.settings.self_correct_min_prob)
            .collect();
        candidates.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cpt.cmp(&b.cpt))
        });

        let mut attempts_left = self.settings.self_correct_max_attempts;
        for omission in candidates {
            if attempts_left == 0 {
                break;
            }
            if outcome.derivation.has(&omission.cpt) {
                continue;
            }
            attempts_left -= 1;

            match self
                .attempt(&outcome.record, omission, focused, full_text)
                .await
            {
                Ok((patched, new_derivation, metadata)) => {
                    outcome.warnings.push(format!("AUTO_CORRECTED: {}", omission.cpt));
                    outcome.record = patched;
                    outcome.derivation = new_derivation;
                    outcome.metadata.push(metadata);
                }
                Err(e) => outcome.warnings.push(e.message),
            }
        }
        outcome
    }

    async fn attempt(
        &self,
        record: &RegistryRecord,
        omission: &AuditPrediction,
        focused: &ScrubbedText,
        full_text: &ScrubbedText,
    ) -> Result<(RegistryRecord, Derivation, SelfCorrectionMetadata), PipelineError> {
        let cpt = omission.cpt.as_str();

        // 1. Keyword guard on the note itself.
        if !self.kb.keywords.supports(cpt, full_text.as_str()) {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                "keyword guard found no supporting language in the note",
            ));
        }

        // 2. Judge proposal.
        let evidence_source = if focused.is_empty() { full_text } else { focused };
        let prompt = self.build_judge_prompt(record, cpt, evidence_source);
        let response = self
            .runtime
            .call_json(&prompt, Some(JUDGE_SYSTEM_PROMPT))
            .await
            .map_err(|e| {
                PipelineError::self_correction_rejected(cpt, format!("judge call failed: {}", e))
            })?;
        let proposal: Value = serde_json::from_str(response.text.trim()).map_err(|e| {
            PipelineError::self_correction_rejected(cpt, format!("judge output not JSON: {}", e))
        })?;

        let patch_value = proposal.get("json_patch").cloned().ok_or_else(|| {
            PipelineError::self_correction_rejected(cpt, "proposal missing json_patch")
        })?;
        let evidence_quote = proposal
            .get("evidence_quote")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        // 3. Validate the proposal.
        self.validate_patch(cpt, &patch_value)?;
        if evidence_quote.trim().is_empty()
            || !evidence_source.as_str().contains(evidence_quote.as_str())
        {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                "evidence_quote is not a substring of the note",
            ));
        }

        // 4. Apply to a tentative copy.
        let mut doc = record.to_value();
        let patch: json_patch::Patch = serde_json::from_value(patch_value.clone()).map_err(|e| {
            PipelineError::self_correction_rejected(cpt, format!("patch does not parse: {}", e))
        })?;
        json_patch::patch(&mut doc, &patch).map_err(|e| {
            PipelineError::self_correction_rejected(cpt, format!("patch does not apply: {}", e))
        })?;

        let schema_violations = self.schema.violations(&doc);
        if !schema_violations.is_empty() {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                format!("patched record fails schema: {}", schema_violations.join("; ")),
            ));
        }
        let tentative: RegistryRecord = serde_json::from_value(doc).map_err(|e| {
            PipelineError::self_correction_rejected(
                cpt,
                format!("patched record does not deserialize: {}", e),
            )
        })?;

        if tentative == *record {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                "patch did not change the record",
            ));
        }

        // 5-6. Re-propagate, re-derive, and demand the target appears.
        let (propagated, _) = propagate(&tentative);
        let new_derivation = derive(&propagated, self.kb).map_err(|e| {
            PipelineError::self_correction_rejected(cpt, format!("re-derivation failed: {}", e))
        })?;
        if !new_derivation.has(cpt) {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                "patched record still does not derive the target code",
            ));
        }

        // 7. Metadata for the audit trail.
        let applied_paths = patch_value
            .as_array()
            .map(|ops| {
                ops.iter()
                    .filter_map(|op| op.get("path").and_then(|p| p.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let metadata = SelfCorrectionMetadata {
            trigger: cpt.to_string(),
            applied_paths,
            evidence_quotes: vec![evidence_quote],
            config_snapshot: self.settings.snapshot(),
        };

        Ok((propagated, new_derivation, metadata))
    }

    fn validate_patch(&self, cpt: &str, patch_value: &Value) -> Result<(), PipelineError> {
        let ops = patch_value.as_array().ok_or_else(|| {
            PipelineError::self_correction_rejected(cpt, "json_patch is not an array")
        })?;
        if ops.is_empty() {
            return Err(PipelineError::self_correction_rejected(cpt, "empty patch"));
        }
        if ops.len() > self.settings.self_correct_max_patch_ops {
            return Err(PipelineError::self_correction_rejected(
                cpt,
                format!(
                    "patch has {} ops, cap is {}",
                    ops.len(),
                    self.settings.self_correct_max_patch_ops
                ),
            ));
        }
        for op in ops {
            let kind = op.get("op").and_then(|v| v.as_str()).unwrap_or("");
            if kind != "add" && kind != "replace" {
                return Err(PipelineError::self_correction_rejected(
                    cpt,
                    format!("op '{}' is not allowed (add/replace only)", kind),
                ));
            }
            let path = op.get("path").and_then(|v| v.as_str()).unwrap_or("");
            if !self.allowlist.permits(path) {
                return Err(PipelineError::self_correction_rejected(
                    cpt,
                    format!("path '{}' is outside the allow-list", path),
                ));
            }
        }
        Ok(())
    }

    fn build_judge_prompt(
        &self,
        record: &RegistryRecord,
        cpt: &str,
        evidence_source: &ScrubbedText,
    ) -> String {
        let description = self
            .kb
            .rules
            .rule(cpt)
            .map(|r| r.description.as_str())
            .unwrap_or("(no rule description)");
        format!(
            "Missing code: {} ({})\n\nAllowed pointers:\n{}\n\nCurrent record:\n{}\n\nNote:\n{}",
            cpt,
            description,
            self.allowlist.pointers.join("\n"),
            record.to_value(),
            evidence_source.as_str()
        )
    }
}

/// Resolve the effective allow-list: the env replacement when present
/// (capped by the loader), otherwise the built-in list.
pub fn effective_allowlist(
    settings: &Settings,
    kb: &KnowledgeBase,
) -> anyhow::Result<PatchAllowlist> {
    match settings.self_correct_allowlist.as_deref() {
        Some(csv) => Ok(PatchAllowlist::from_csv(csv)?),
        None => Ok(kb.allowlist.clone()),
    }
}
