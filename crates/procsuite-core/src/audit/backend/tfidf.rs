//! TF-IDF + one-vs-rest logistic regression backend, loaded from the
//! sklearn-exported coefficient artifacts.

use super::{AuditBackend, ModelBundle, LINEAR_MODEL_FILE, VECTORIZER_FILE};
use crate::audit::vectorizer::TfidfVectorizer;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct LinearModel {
    /// One weight row per label, each of vectorizer dimension.
    weights: Vec<Vec<f32>>,
    intercepts: Vec<f32>,
}

pub struct TfidfBackend {
    vectorizer: TfidfVectorizer,
    model: LinearModel,
}

impl TfidfBackend {
    pub fn load(bundle: &ModelBundle, expected_labels: usize) -> anyhow::Result<Self> {
        let vectorizer = TfidfVectorizer::load(&bundle.path(VECTORIZER_FILE))?;
        let model_path = bundle.path(LINEAR_MODEL_FILE);
        let raw = std::fs::read_to_string(&model_path)
            .map_err(|e| anyhow::anyhow!("reading linear model {}: {}", model_path.display(), e))?;
        let model: LinearModel = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing linear model {}: {}", model_path.display(), e))?;

        if model.weights.len() != expected_labels {
            anyhow::bail!(
                "linear model has {} label rows, label_fields declares {}",
                model.weights.len(),
                expected_labels
            );
        }
        if model.intercepts.len() != model.weights.len() {
            anyhow::bail!(
                "linear model has {} intercepts for {} labels",
                model.intercepts.len(),
                model.weights.len()
            );
        }
        let dim = vectorizer.dimension();
        if let Some(row) = model.weights.iter().find(|row| row.len() != dim) {
            anyhow::bail!(
                "weight row of length {} does not match vectorizer dimension {}",
                row.len(),
                dim
            );
        }
        Ok(Self { vectorizer, model })
    }
}

impl AuditBackend for TfidfBackend {
    fn classify(&self, text: &str) -> anyhow::Result<Vec<f64>> {
        let features = self.vectorizer.transform(text);
        let probs = self
            .model
            .weights
            .iter()
            .zip(&self.model.intercepts)
            .map(|(row, intercept)| {
                let logit: f32 = row
                    .iter()
                    .zip(&features)
                    .map(|(w, x)| w * x)
                    .sum::<f32>()
                    + intercept;
                sigmoid(f64::from(logit))
            })
            .collect();
        Ok(probs)
    }

    fn name(&self) -> &'static str {
        "tfidf"
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
