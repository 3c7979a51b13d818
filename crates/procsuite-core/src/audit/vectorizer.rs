//! TF-IDF vectorization matching the exported sklearn vectorizer.
//!
//! The artifact carries the fitted vocabulary and IDF weights; this side
//! reproduces sklearn's default analyzer (lowercase, `\w\w+` tokens,
//! L2-normalized tf-idf) so probabilities line up with training.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\b\w\w+\b").expect("token pattern");
}

#[derive(Debug, Deserialize)]
pub struct TfidfVectorizer {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f32>,
}

impl TfidfVectorizer {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading vectorizer {}: {}", path.display(), e))?;
        let vectorizer: TfidfVectorizer = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing vectorizer {}: {}", path.display(), e))?;
        vectorizer.validate()?;
        Ok(vectorizer)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let dim = self.idf.len();
        for (term, index) in &self.vocabulary {
            if *index >= dim {
                anyhow::bail!(
                    "vectorizer term '{}' maps to index {} outside idf dimension {}",
                    term,
                    index,
                    dim
                );
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    /// Dense L2-normalized tf-idf features.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut features = vec![0f32; self.idf.len()];
        for token in TOKEN.find_iter(&lowered) {
            if let Some(&index) = self.vocabulary.get(token.as_str()) {
                features[index] += 1.0;
            }
        }
        for (index, value) in features.iter_mut().enumerate() {
            *value *= self.idf[index];
        }
        let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in features.iter_mut() {
                *value /= norm;
            }
        }
        features
    }
}
