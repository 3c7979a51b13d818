//! Process-wide settings, read from the environment exactly once at
//! startup and passed by reference afterwards. Absent variables take the
//! documented defaults; an unrecognized value for a closed-set option is
//! a startup error, never a request-time one.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    Current,
    ExtractionFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionEngine {
    Engine,
    AgentsFocusThenEngine,
    AgentsStructurer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditorSource {
    RawMl,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    Onnx,
    Tfidf,
    Auto,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub pipeline_mode: PipelineMode,
    pub extraction_engine: ExtractionEngine,
    pub auditor_source: AuditorSource,
    pub audit_use_buckets: bool,
    pub audit_top_k: usize,
    pub audit_min_prob: f64,
    pub self_correct_min_prob: f64,
    pub self_correct_enabled: bool,
    pub self_correct_max_attempts: u32,
    pub self_correct_max_patch_ops: usize,
    /// Comma-separated pointer list replacing the built-in allow-list.
    pub self_correct_allowlist: Option<String>,
    pub llm_concurrency: usize,
    pub llm_timeout_s: u64,
    /// Read timeout for the schema-guided registry extraction call.
    pub registry_task_timeout_s: u64,
    pub model_backend: ModelBackend,
    pub model_bundle_dir: Option<PathBuf>,
    pub schema_path: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
    pub ncci_path: Option<PathBuf>,
    /// Substitute the deterministic stub LLM (offline/test runs).
    pub offline_stub: bool,
    pub llm_model: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline_mode: PipelineMode::Current,
            extraction_engine: ExtractionEngine::Engine,
            auditor_source: AuditorSource::RawMl,
            audit_use_buckets: true,
            audit_top_k: 25,
            audit_min_prob: 0.50,
            self_correct_min_prob: 0.95,
            self_correct_enabled: false,
            self_correct_max_attempts: 1,
            self_correct_max_patch_ops: 5,
            self_correct_allowlist: None,
            llm_concurrency: 2,
            llm_timeout_s: 60,
            registry_task_timeout_s: 180,
            model_backend: ModelBackend::Auto,
            model_bundle_dir: None,
            schema_path: None,
            rules_path: None,
            ncci_path: None,
            offline_stub: false,
            llm_model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
        }
    }
}

fn closed_set<T>(var: &str, raw: &str, options: &[(&str, T)]) -> anyhow::Result<T>
where
    T: Copy,
{
    for (name, value) in options {
        if raw == *name {
            return Ok(*value);
        }
    }
    let expected: Vec<&str> = options.iter().map(|(name, _)| *name).collect();
    anyhow::bail!(
        "config error: {}='{}' not in {{{}}}",
        var,
        raw,
        expected.join(", ")
    )
}

fn env_bool(var: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(var) {
        Ok(raw) => closed_set(var, raw.trim(), &[("0", false), ("1", true)]),
        Err(_) => Ok(default),
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("config error: {}='{}' does not parse", var, raw)),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Settings::default();
        let mut settings = defaults;

        if let Ok(raw) = std::env::var("PROCSUITE_PIPELINE_MODE") {
            settings.pipeline_mode = closed_set(
                "PROCSUITE_PIPELINE_MODE",
                raw.trim(),
                &[
                    ("current", PipelineMode::Current),
                    ("extraction_first", PipelineMode::ExtractionFirst),
                ],
            )?;
        }
        if let Ok(raw) = std::env::var("REGISTRY_EXTRACTION_ENGINE") {
            settings.extraction_engine = closed_set(
                "REGISTRY_EXTRACTION_ENGINE",
                raw.trim(),
                &[
                    ("engine", ExtractionEngine::Engine),
                    (
                        "agents_focus_then_engine",
                        ExtractionEngine::AgentsFocusThenEngine,
                    ),
                    ("agents_structurer", ExtractionEngine::AgentsStructurer),
                ],
            )?;
        }
        if let Ok(raw) = std::env::var("REGISTRY_AUDITOR_SOURCE") {
            settings.auditor_source = closed_set(
                "REGISTRY_AUDITOR_SOURCE",
                raw.trim(),
                &[
                    ("raw_ml", AuditorSource::RawMl),
                    ("disabled", AuditorSource::Disabled),
                ],
            )?;
        }
        if let Ok(raw) = std::env::var("MODEL_BACKEND") {
            settings.model_backend = closed_set(
                "MODEL_BACKEND",
                raw.trim(),
                &[
                    ("onnx", ModelBackend::Onnx),
                    ("tfidf", ModelBackend::Tfidf),
                    ("auto", ModelBackend::Auto),
                ],
            )?;
        }

        settings.audit_use_buckets = env_bool("REGISTRY_ML_AUDIT_USE_BUCKETS", true)?;
        settings.audit_top_k = env_parse("REGISTRY_ML_AUDIT_TOP_K", settings.audit_top_k)?;
        settings.audit_min_prob = env_parse("REGISTRY_ML_AUDIT_MIN_PROB", settings.audit_min_prob)?;
        settings.self_correct_min_prob = env_parse(
            "REGISTRY_ML_SELF_CORRECT_MIN_PROB",
            settings.self_correct_min_prob,
        )?;
        settings.self_correct_enabled = env_bool("REGISTRY_SELF_CORRECT_ENABLED", false)?;
        settings.self_correct_max_attempts = env_parse(
            "REGISTRY_SELF_CORRECT_MAX_ATTEMPTS",
            settings.self_correct_max_attempts,
        )?;
        settings.self_correct_max_patch_ops = env_parse(
            "REGISTRY_SELF_CORRECT_MAX_PATCH_OPS",
            settings.self_correct_max_patch_ops,
        )?;
        settings.self_correct_allowlist = std::env::var("REGISTRY_SELF_CORRECT_ALLOWLIST").ok();
        settings.llm_concurrency = env_parse("LLM_CONCURRENCY", settings.llm_concurrency)?;
        settings.llm_timeout_s = env_parse("LLM_TIMEOUT_S", settings.llm_timeout_s)?;
        settings.registry_task_timeout_s =
            env_parse("REGISTRY_TASK_TIMEOUT_S", settings.registry_task_timeout_s)?;
        settings.model_bundle_dir = std::env::var("PROCSUITE_MODEL_DIR").ok().map(PathBuf::from);
        settings.schema_path = std::env::var("REGISTRY_SCHEMA_PATH").ok().map(PathBuf::from);
        settings.rules_path = std::env::var("PROCSUITE_RULES_PATH").ok().map(PathBuf::from);
        settings.ncci_path = std::env::var("PROCSUITE_NCCI_PATH").ok().map(PathBuf::from);
        settings.offline_stub = env_bool("PROCSUITE_OFFLINE_STUB", false)?;
        if let Ok(model) = std::env::var("PROCSUITE_LLM_MODEL") {
            settings.llm_model = model;
        }
        settings.openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        if settings.llm_concurrency == 0 {
            anyhow::bail!("config error: LLM_CONCURRENCY must be at least 1");
        }
        if settings.self_correct_max_patch_ops == 0 {
            anyhow::bail!("config error: REGISTRY_SELF_CORRECT_MAX_PATCH_OPS must be at least 1");
        }

        Ok(settings)
    }

    /// Stable digest of the effective configuration, embedded in audit
    /// reports and self-correction metadata. Secrets are excluded by
    /// serialization.
    pub fn snapshot(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        hex::encode(&digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "PROCSUITE_PIPELINE_MODE",
            "REGISTRY_EXTRACTION_ENGINE",
            "REGISTRY_AUDITOR_SOURCE",
            "REGISTRY_ML_AUDIT_USE_BUCKETS",
            "REGISTRY_ML_AUDIT_TOP_K",
            "REGISTRY_ML_AUDIT_MIN_PROB",
            "REGISTRY_ML_SELF_CORRECT_MIN_PROB",
            "REGISTRY_SELF_CORRECT_ENABLED",
            "REGISTRY_SELF_CORRECT_MAX_ATTEMPTS",
            "REGISTRY_SELF_CORRECT_MAX_PATCH_OPS",
            "REGISTRY_SELF_CORRECT_ALLOWLIST",
            "LLM_CONCURRENCY",
            "LLM_TIMEOUT_S",
            "REGISTRY_TASK_TIMEOUT_S",
            "MODEL_BACKEND",
            "PROCSUITE_OFFLINE_STUB",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_match_documented_values() {
        clear_env();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.pipeline_mode, PipelineMode::Current);
        assert_eq!(settings.extraction_engine, ExtractionEngine::Engine);
        assert_eq!(settings.auditor_source, AuditorSource::RawMl);
        assert!(settings.audit_use_buckets);
        assert_eq!(settings.audit_top_k, 25);
        assert!(!settings.self_correct_enabled);
        assert_eq!(settings.self_correct_max_attempts, 1);
        assert_eq!(settings.self_correct_max_patch_ops, 5);
        assert_eq!(settings.llm_concurrency, 2);
        assert_eq!(settings.llm_timeout_s, 60);
        assert_eq!(settings.registry_task_timeout_s, 180);
        assert_eq!(settings.model_backend, ModelBackend::Auto);
    }

    #[test]
    #[serial]
    fn unknown_closed_set_value_is_an_error() {
        clear_env();
        std::env::set_var("PROCSUITE_PIPELINE_MODE", "experimental");
        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("PROCSUITE_PIPELINE_MODE"));
        clear_env();
    }

    #[test]
    #[serial]
    fn extraction_first_mode_parses() {
        clear_env();
        std::env::set_var("PROCSUITE_PIPELINE_MODE", "extraction_first");
        std::env::set_var("REGISTRY_SELF_CORRECT_ENABLED", "1");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.pipeline_mode, PipelineMode::ExtractionFirst);
        assert!(settings.self_correct_enabled);
        clear_env();
    }

    #[test]
    #[serial]
    fn snapshot_is_stable_and_short() {
        clear_env();
        let a = Settings::from_env().unwrap();
        let b = Settings::from_env().unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.snapshot().len(), 16);
    }
}
