//! The Coding Service: wraps an extraction result into per-code
//! suggestions with provenance, confidence, and review flags.

use super::registry::{ExtractionResult, RegistryService};
use crate::errors::PipelineError;
use crate::model::CoderDifficulty;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewFlag {
    Required,
    Recommended,
    Optional,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionReasoning {
    pub rule_paths: Vec<String>,
    pub audit_notes: Vec<String>,
    pub kb_version: String,
    pub policy_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSuggestion {
    pub code: String,
    pub description: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_decision: Option<String>,
    pub rule_confidence: f64,
    pub final_confidence: f64,
    pub reasoning: SuggestionReasoning,
    pub review_flag: ReviewFlag,
    pub evidence_verified: bool,
    pub suggestion_id: String,
    pub procedure_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodingResult {
    pub procedure_id: String,
    pub suggestions: Vec<CodeSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure_type: Option<String>,
    pub kb_version: String,
    pub policy_version: String,
    pub processing_time_ms: u64,
    pub llm_latency_ms: u64,
    pub generated_at: String,
}

pub struct CodingService {
    registry: RegistryService,
}

impl CodingService {
    pub fn new(registry: RegistryService) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryService {
        &self.registry
    }

    pub async fn generate_result(
        &self,
        procedure_id: &str,
        raw_text: &str,
        procedure_type: Option<&str>,
    ) -> Result<CodingResult, PipelineError> {
        let started = Instant::now();
        let llm_before = self.registry.llm_latency_ms();

        let extraction = self.registry.extract_fields(raw_text).await?;
        let suggestions = self.build_suggestions(procedure_id, &extraction);

        Ok(CodingResult {
            procedure_id: procedure_id.to_string(),
            suggestions,
            procedure_type: procedure_type.map(str::to_string),
            kb_version: self.registry.kb().version.clone(),
            policy_version: env!("CARGO_PKG_VERSION").to_string(),
            processing_time_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
            llm_latency_ms: self.registry.llm_latency_ms().saturating_sub(llm_before),
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn build_suggestions(
        &self,
        procedure_id: &str,
        extraction: &ExtractionResult,
    ) -> Vec<CodeSuggestion> {
        let final_confidence = confidence_for(extraction.coder_difficulty);
        let review_flag = if extraction.needs_manual_review {
            ReviewFlag::Required
        } else if !extraction.audit_warnings.is_empty() {
            ReviewFlag::Recommended
        } else {
            ReviewFlag::Optional
        };
        let agreements: &[String] = extraction
            .audit_report
            .as_ref()
            .map(|r| r.agreements.as_slice())
            .unwrap_or(&[]);

        extraction
            .cpt_codes
            .iter()
            .map(|code| {
                let rationale = extraction
                    .code_rationales
                    .get(code)
                    .cloned()
                    .unwrap_or_default();
                let rule_paths = cited_paths(&rationale);
                let corrected = extraction.self_correction.iter().any(|m| &m.trigger == code);
                let mut audit_notes = Vec::new();
                if agreements.contains(code) {
                    audit_notes.push("confirmed by RAW-ML audit".to_string());
                }
                if corrected {
                    audit_notes.push("added by guarded self-correction".to_string());
                }

                let description = self
                    .registry
                    .kb()
                    .rules
                    .rule(code)
                    .map(|r| r.description.clone())
                    .unwrap_or_else(|| rationale.clone());

                // Evidence counts as verified when the note-level
                // extractors saw the fields this code cites, or when a
                // correction carried a verified quote.
                let evidence_verified = corrected
                    || extraction.meta.evidence.iter().any(|span| {
                        rule_paths
                            .iter()
                            .any(|p| p.starts_with(&span.field_path) || span.field_path.starts_with(p.as_str()))
                    });

                CodeSuggestion {
                    code: code.clone(),
                    description,
                    source: extraction.source.clone(),
                    hybrid_decision: extraction.hybrid_decision.clone(),
                    rule_confidence: if extraction.source == "extraction_first" {
                        1.0
                    } else {
                        final_confidence
                    },
                    final_confidence,
                    reasoning: SuggestionReasoning {
                        rule_paths,
                        audit_notes,
                        kb_version: self.registry.kb().version.clone(),
                        policy_version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                    review_flag,
                    evidence_verified,
                    suggestion_id: Uuid::new_v4().to_string(),
                    procedure_id: procedure_id.to_string(),
                }
            })
            .collect()
    }
}

fn confidence_for(difficulty: CoderDifficulty) -> f64 {
    match difficulty {
        CoderDifficulty::HighConf => 0.95,
        CoderDifficulty::GrayZone => 0.80,
        _ => 0.70,
    }
}

/// Pull the cited field paths back out of a derivation rationale
/// ("description [path, path]").
fn cited_paths(rationale: &str) -> Vec<String> {
    rationale
        .rsplit_once('[')
        .map(|(_, tail)| {
            tail.trim_end_matches(']')
                .split(", ")
                .map(str::to_string)
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_policy_matches_difficulty() {
        assert_eq!(confidence_for(CoderDifficulty::HighConf), 0.95);
        assert_eq!(confidence_for(CoderDifficulty::GrayZone), 0.80);
        assert_eq!(confidence_for(CoderDifficulty::LowConf), 0.70);
        assert_eq!(confidence_for(CoderDifficulty::Disabled), 0.70);
        assert_eq!(confidence_for(CoderDifficulty::Unknown), 0.70);
    }

    #[test]
    fn cited_paths_parse_back_out() {
        let paths = cited_paths(
            "EBUS-guided TBNA, 3 or more stations [procedures_performed.linear_ebus.performed, procedures_performed.linear_ebus.details.stations_sampled_count]",
        );
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], "procedures_performed.linear_ebus.performed");
    }
}
