//! Cross-check of the deterministic derivation against the auditor.
//!
//! Pure set comparison. Missing derived codes become audit warnings (one
//! per item, in audit-set order); codes the derivation found that the
//! model did not are informational and live only in `extra_in_derived`.

use crate::model::{
    AuditCompareReport, AuditPrediction, CoderDifficulty, ConfidenceBucket,
};

pub fn compare(
    derived_codes: &[String],
    audit_set: &[AuditPrediction],
    config_snapshot: &str,
) -> AuditCompareReport {
    let ml_audit_codes: Vec<String> = audit_set.iter().map(|p| p.cpt.clone()).collect();

    let agreements: Vec<String> = derived_codes
        .iter()
        .filter(|c| ml_audit_codes.contains(c))
        .cloned()
        .collect();
    let extra_in_derived: Vec<String> = derived_codes
        .iter()
        .filter(|c| !ml_audit_codes.contains(c))
        .cloned()
        .collect();
    let missing: Vec<&AuditPrediction> = audit_set
        .iter()
        .filter(|p| !derived_codes.contains(&p.cpt))
        .collect();

    let warnings: Vec<String> = missing
        .iter()
        .map(|p| {
            format!(
                "RAW_ML_AUDIT[{}]: model suggests {} (prob={:.2}), but deterministic derivation missed it",
                p.bucket, p.cpt, p.probability
            )
        })
        .collect();

    let high_conf_omissions: Vec<AuditPrediction> = missing
        .iter()
        .filter(|p| p.bucket == ConfidenceBucket::HighConf)
        .map(|p| (*p).clone())
        .collect();

    AuditCompareReport {
        derived_codes: derived_codes.to_vec(),
        ml_audit_codes,
        agreements,
        extra_in_derived,
        missing_in_derived: missing.iter().map(|p| p.cpt.clone()).collect(),
        high_conf_omissions,
        config_snapshot: config_snapshot.to_string(),
        warnings,
    }
}

/// The review gate over everything the pipeline learned about a case.
pub fn needs_manual_review(
    report: &AuditCompareReport,
    difficulty: CoderDifficulty,
    has_validation_errors: bool,
) -> bool {
    !report.high_conf_omissions.is_empty()
        || !report.warnings.is_empty()
        || has_validation_errors
        || matches!(
            difficulty,
            CoderDifficulty::GrayZone | CoderDifficulty::LowConf
        )
}
