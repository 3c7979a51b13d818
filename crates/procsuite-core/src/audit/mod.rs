//! The RAW-ML auditor: an independent multi-label classifier over the
//! full scrubbed note (never the focused substring), bucketed by
//! per-label thresholds loaded from the model bundle.

pub mod backend;
pub mod compare;
pub mod vectorizer;

use crate::config::{AuditorSource, Settings};
use crate::model::{AuditPrediction, CasePredictions, CoderDifficulty, ConfidenceBucket};
use crate::phi::ScrubbedText;
use backend::{AuditBackend, ModelBundle, LABEL_FIELDS_FILE, THRESHOLDS_FILE};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LabelThreshold {
    pub low: f64,
    pub high: f64,
}

impl Default for LabelThreshold {
    fn default() -> Self {
        LabelThreshold {
            low: 0.35,
            high: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub default: LabelThreshold,
    #[serde(default)]
    pub labels: BTreeMap<String, LabelThreshold>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            default: LabelThreshold::default(),
            labels: BTreeMap::new(),
        }
    }
}

impl Thresholds {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading thresholds {}: {}", path.display(), e))?;
        let thresholds: Thresholds = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing thresholds {}: {}", path.display(), e))?;
        for (label, t) in &thresholds.labels {
            if t.low > t.high {
                anyhow::bail!("thresholds for {} have low {} > high {}", label, t.low, t.high);
            }
        }
        Ok(thresholds)
    }

    pub fn bucket(&self, label: &str, probability: f64) -> ConfidenceBucket {
        let t = self.labels.get(label).copied().unwrap_or(self.default);
        if probability >= t.high {
            ConfidenceBucket::HighConf
        } else if probability < t.low {
            ConfidenceBucket::LowConf
        } else {
            ConfidenceBucket::GrayZone
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelFields {
    labels: Vec<String>,
}

pub struct AuditorService {
    backend: Box<dyn AuditBackend>,
    labels: Vec<String>,
    thresholds: Thresholds,
}

impl AuditorService {
    /// Startup warmup: resolve artifacts once; any missing piece is a
    /// hard error here, never at request time. Returns `None` when the
    /// auditor is disabled by configuration.
    pub fn startup(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.auditor_source == AuditorSource::Disabled {
            return Ok(None);
        }
        let dir = settings.model_bundle_dir.as_ref().ok_or_else(|| {
            anyhow::anyhow!("auditor enabled but PROCSUITE_MODEL_DIR is not set")
        })?;
        let bundle = ModelBundle::new(dir);

        let labels_path = bundle.path(LABEL_FIELDS_FILE);
        let raw = std::fs::read_to_string(&labels_path)
            .map_err(|e| anyhow::anyhow!("reading labels {}: {}", labels_path.display(), e))?;
        let fields: LabelFields = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing labels {}: {}", labels_path.display(), e))?;
        if fields.labels.is_empty() {
            anyhow::bail!("label_fields.json declares no labels");
        }

        let thresholds_path = bundle.path(THRESHOLDS_FILE);
        let thresholds = if thresholds_path.is_file() {
            Thresholds::load(&thresholds_path)?
        } else {
            Thresholds::default()
        };

        let backend = backend::resolve(settings.model_backend, &bundle, fields.labels.len())?;
        Ok(Some(Self {
            backend,
            labels: fields.labels,
            thresholds,
        }))
    }

    /// Test/bench seam: inject a backend directly.
    pub fn with_backend(
        backend: Box<dyn AuditBackend>,
        labels: Vec<String>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            backend,
            labels,
            thresholds,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classify the full scrubbed note. The `ScrubbedText` parameter is
    /// the guardrail: there is no way to hand this the focused substring
    /// without deliberately wrapping it.
    pub fn classify(&self, raw_scrubbed: &ScrubbedText) -> anyhow::Result<CasePredictions> {
        let probs = self.backend.classify(raw_scrubbed.as_str())?;
        if probs.len() != self.labels.len() {
            anyhow::bail!(
                "backend returned {} probabilities for {} labels",
                probs.len(),
                self.labels.len()
            );
        }
        let predictions = self
            .labels
            .iter()
            .zip(probs)
            .map(|(label, probability)| AuditPrediction {
                cpt: label.clone(),
                probability,
                bucket: self.thresholds.bucket(label, probability),
            })
            .collect();
        Ok(CasePredictions {
            predictions,
            backend: self.backend.name().to_string(),
        })
    }

    /// The audit set under the configured policy.
    pub fn audit_set(&self, case: &CasePredictions, settings: &Settings) -> Vec<AuditPrediction> {
        if settings.audit_use_buckets {
            case.predictions
                .iter()
                .filter(|p| {
                    matches!(
                        p.bucket,
                        ConfidenceBucket::HighConf | ConfidenceBucket::GrayZone
                    )
                })
                .cloned()
                .collect()
        } else {
            let mut sorted: Vec<AuditPrediction> = case
                .predictions
                .iter()
                .filter(|p| p.probability >= settings.audit_min_prob)
                .cloned()
                .collect();
            sorted.sort_by(|a, b| {
                b.probability
                    .partial_cmp(&a.probability)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cpt.cmp(&b.cpt))
            });
            sorted.truncate(settings.audit_top_k);
            sorted
        }
    }

    /// Case difficulty from the audit set: all-high is easy, an empty
    /// set means the model saw nothing it believes, anything mixed is
    /// the gray zone.
    pub fn difficulty(audit_set: &[AuditPrediction]) -> CoderDifficulty {
        if audit_set.is_empty() {
            return CoderDifficulty::LowConf;
        }
        if audit_set
            .iter()
            .all(|p| p.bucket == ConfidenceBucket::HighConf)
        {
            CoderDifficulty::HighConf
        } else {
            CoderDifficulty::GrayZone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phi;

    struct FixedBackend(Vec<f64>);

    impl AuditBackend for FixedBackend {
        fn classify(&self, _text: &str) -> anyhow::Result<Vec<f64>> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn service(probs: Vec<f64>) -> AuditorService {
        AuditorService::with_backend(
            Box::new(FixedBackend(probs)),
            vec!["31653".to_string(), "31624".to_string(), "31628".to_string()],
            Thresholds::default(),
        )
    }

    fn scrubbed(text: &str) -> ScrubbedText {
        phi::redact(text).unwrap().scrubbed_text
    }

    #[test]
    fn buckets_follow_thresholds() {
        let svc = service(vec![0.97, 0.50, 0.10]);
        let case = svc.classify(&scrubbed("note")).unwrap();
        assert_eq!(case.predictions[0].bucket, ConfidenceBucket::HighConf);
        assert_eq!(case.predictions[1].bucket, ConfidenceBucket::GrayZone);
        assert_eq!(case.predictions[2].bucket, ConfidenceBucket::LowConf);
    }

    #[test]
    fn bucket_mode_takes_high_and_gray() {
        let svc = service(vec![0.97, 0.50, 0.10]);
        let settings = Settings::default();
        let case = svc.classify(&scrubbed("note")).unwrap();
        let set = svc.audit_set(&case, &settings);
        let codes: Vec<&str> = set.iter().map(|p| p.cpt.as_str()).collect();
        assert_eq!(codes, vec!["31653", "31624"]);
    }

    #[test]
    fn top_k_mode_applies_floor_and_cap() {
        let svc = service(vec![0.97, 0.60, 0.55]);
        let mut settings = Settings::default();
        settings.audit_use_buckets = false;
        settings.audit_top_k = 2;
        settings.audit_min_prob = 0.56;
        let case = svc.classify(&scrubbed("note")).unwrap();
        let set = svc.audit_set(&case, &settings);
        let codes: Vec<&str> = set.iter().map(|p| p.cpt.as_str()).collect();
        assert_eq!(codes, vec!["31653", "31624"]);
    }

    #[test]
    fn difficulty_classification() {
        assert_eq!(AuditorService::difficulty(&[]), CoderDifficulty::LowConf);
        let high = AuditPrediction {
            cpt: "31653".to_string(),
            probability: 0.97,
            bucket: ConfidenceBucket::HighConf,
        };
        let gray = AuditPrediction {
            cpt: "31624".to_string(),
            probability: 0.5,
            bucket: ConfidenceBucket::GrayZone,
        };
        assert_eq!(
            AuditorService::difficulty(&[high.clone()]),
            CoderDifficulty::HighConf
        );
        assert_eq!(
            AuditorService::difficulty(&[high, gray]),
            CoderDifficulty::GrayZone
        );
    }

    #[test]
    fn per_label_thresholds_override_default() {
        let mut thresholds = Thresholds::default();
        thresholds.labels.insert(
            "31653".to_string(),
            LabelThreshold {
                low: 0.2,
                high: 0.95,
            },
        );
        assert_eq!(
            thresholds.bucket("31653", 0.9),
            ConfidenceBucket::GrayZone
        );
        assert_eq!(thresholds.bucket("31624", 0.9), ConfidenceBucket::HighConf);
    }
}
