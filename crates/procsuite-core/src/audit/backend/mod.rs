//! Audit classifier backends.
//!
//! The closed set is {onnx, tfidf, auto}. `auto` prefers the quantized
//! ONNX graph when the bundle ships one and falls back to the TF-IDF
//! linear model; naming a backend whose artifacts are missing is a hard
//! startup error, never a request-time one.

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tfidf;

use crate::config::ModelBackend;
use std::path::{Path, PathBuf};

pub const VECTORIZER_FILE: &str = "vectorizer.json";
pub const LINEAR_MODEL_FILE: &str = "linear_model.json";
pub const ONNX_MODEL_FILE: &str = "model.onnx";
pub const ONNX_CONFIG_FILE: &str = "config.json";
pub const THRESHOLDS_FILE: &str = "thresholds.json";
pub const LABEL_FIELDS_FILE: &str = "label_fields.json";

/// Uniform classifier seam: probabilities aligned with the bundle's
/// label order.
pub trait AuditBackend: Send + Sync {
    fn classify(&self, text: &str) -> anyhow::Result<Vec<f64>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct ModelBundle {
    dir: PathBuf,
}

impl ModelBundle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ModelBundle { dir: dir.into() }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn has(&self, file: &str) -> bool {
        self.path(file).is_file()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Resolve the configured backend against the bundle on disk. Loaded
/// once during startup warmup; read-only afterwards.
pub fn resolve(
    backend: ModelBackend,
    bundle: &ModelBundle,
    expected_labels: usize,
) -> anyhow::Result<Box<dyn AuditBackend>> {
    match backend {
        ModelBackend::Onnx => load_onnx(bundle, expected_labels),
        ModelBackend::Tfidf => load_tfidf(bundle, expected_labels),
        ModelBackend::Auto => {
            if bundle.has(ONNX_MODEL_FILE) {
                load_onnx(bundle, expected_labels)
            } else {
                load_tfidf(bundle, expected_labels)
            }
        }
    }
}

fn load_tfidf(bundle: &ModelBundle, expected_labels: usize) -> anyhow::Result<Box<dyn AuditBackend>> {
    let backend = tfidf::TfidfBackend::load(bundle, expected_labels)?;
    Ok(Box::new(backend))
}

#[cfg(feature = "onnx")]
fn load_onnx(bundle: &ModelBundle, expected_labels: usize) -> anyhow::Result<Box<dyn AuditBackend>> {
    let backend = onnx::OnnxBackend::load(bundle, expected_labels)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(
    bundle: &ModelBundle,
    _expected_labels: usize,
) -> anyhow::Result<Box<dyn AuditBackend>> {
    anyhow::bail!(
        "ONNX backend requested for bundle {} but this build has no onnx support",
        bundle.dir().display()
    )
}
