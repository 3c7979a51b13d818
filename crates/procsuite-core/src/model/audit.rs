//! Audit-side structures: the RAW-ML auditor's predictions, the
//! comparator report, and self-correction metadata.

use serde::{Deserialize, Serialize};

/// Confidence band for a single label, from the per-label thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceBucket {
    #[serde(rename = "HIGH_CONF")]
    HighConf,
    #[serde(rename = "GRAY_ZONE")]
    GrayZone,
    #[serde(rename = "LOW_CONF")]
    LowConf,
}

impl std::fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceBucket::HighConf => f.write_str("HIGH_CONF"),
            ConfidenceBucket::GrayZone => f.write_str("GRAY_ZONE"),
            ConfidenceBucket::LowConf => f.write_str("LOW_CONF"),
        }
    }
}

/// Case-level difficulty as reported next to the derived codes.
/// Pinned to a closed set; `Disabled` means the auditor did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoderDifficulty {
    #[serde(rename = "HIGH_CONF")]
    HighConf,
    #[serde(rename = "GRAY_ZONE")]
    GrayZone,
    #[serde(rename = "LOW_CONF")]
    LowConf,
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "unknown")]
    Unknown,
}

impl std::fmt::Display for CoderDifficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoderDifficulty::HighConf => f.write_str("HIGH_CONF"),
            CoderDifficulty::GrayZone => f.write_str("GRAY_ZONE"),
            CoderDifficulty::LowConf => f.write_str("LOW_CONF"),
            CoderDifficulty::Disabled => f.write_str("disabled"),
            CoderDifficulty::Unknown => f.write_str("unknown"),
        }
    }
}

impl From<ConfidenceBucket> for CoderDifficulty {
    fn from(bucket: ConfidenceBucket) -> Self {
        match bucket {
            ConfidenceBucket::HighConf => CoderDifficulty::HighConf,
            ConfidenceBucket::GrayZone => CoderDifficulty::GrayZone,
            ConfidenceBucket::LowConf => CoderDifficulty::LowConf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPrediction {
    pub cpt: String,
    pub probability: f64,
    pub bucket: ConfidenceBucket,
}

/// Uniform classifier output across backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CasePredictions {
    pub predictions: Vec<AuditPrediction>,
    pub backend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditCompareReport {
    pub derived_codes: Vec<String>,
    pub ml_audit_codes: Vec<String>,
    pub agreements: Vec<String>,
    pub extra_in_derived: Vec<String>,
    pub missing_in_derived: Vec<String>,
    pub high_conf_omissions: Vec<AuditPrediction>,
    pub config_snapshot: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfCorrectionMetadata {
    /// The CPT omission that triggered the attempt.
    pub trigger: String,
    pub applied_paths: Vec<String>,
    pub evidence_quotes: Vec<String>,
    pub config_snapshot: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ConfidenceBucket::HighConf).unwrap(),
            "\"HIGH_CONF\""
        );
    }

    #[test]
    fn difficulty_closed_set_spelling() {
        assert_eq!(CoderDifficulty::Disabled.to_string(), "disabled");
        assert_eq!(CoderDifficulty::GrayZone.to_string(), "GRAY_ZONE");
        let parsed: CoderDifficulty = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(parsed, CoderDifficulty::Unknown);
    }
}
