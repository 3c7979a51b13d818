//! Quantized ONNX backend over the same TF-IDF features.
//!
//! The bundle exports the sklearn pipeline head as an INT8 ONNX graph;
//! vectorization stays on this side so both backends share one feature
//! space. `config.json` names the graph's input and output tensors.

use super::{AuditBackend, ModelBundle, ONNX_CONFIG_FILE, ONNX_MODEL_FILE, VECTORIZER_FILE};
use crate::audit::vectorizer::TfidfVectorizer;
use ort::session::Session;
use serde::Deserialize;
use std::sync::Mutex;

#[derive(Debug, Deserialize)]
struct OnnxConfig {
    #[serde(default = "default_input_name")]
    input_name: String,
    #[serde(default = "default_output_name")]
    output_name: String,
}

fn default_input_name() -> String {
    "float_input".to_string()
}

fn default_output_name() -> String {
    "probabilities".to_string()
}

pub struct OnnxBackend {
    vectorizer: TfidfVectorizer,
    session: Mutex<Session>,
    config: OnnxConfig,
    expected_labels: usize,
}

impl OnnxBackend {
    pub fn load(bundle: &ModelBundle, expected_labels: usize) -> anyhow::Result<Self> {
        let vectorizer = TfidfVectorizer::load(&bundle.path(VECTORIZER_FILE))?;

        let config_path = bundle.path(ONNX_CONFIG_FILE);
        let config: OnnxConfig = if config_path.is_file() {
            let raw = std::fs::read_to_string(&config_path)
                .map_err(|e| anyhow::anyhow!("reading {}: {}", config_path.display(), e))?;
            serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("parsing {}: {}", config_path.display(), e))?
        } else {
            OnnxConfig {
                input_name: default_input_name(),
                output_name: default_output_name(),
            }
        };

        let model_path = bundle.path(ONNX_MODEL_FILE);
        if !model_path.is_file() {
            anyhow::bail!("onnx model missing: {}", model_path.display());
        }
        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("onnx session builder: {}", e))?
            .commit_from_file(&model_path)
            .map_err(|e| anyhow::anyhow!("loading onnx model {}: {}", model_path.display(), e))?;

        Ok(Self {
            vectorizer,
            session: Mutex::new(session),
            config,
            expected_labels,
        })
    }
}

impl AuditBackend for OnnxBackend {
    fn classify(&self, text: &str) -> anyhow::Result<Vec<f64>> {
        let features = self.vectorizer.transform(text);
        let input = ndarray::Array2::from_shape_vec((1, features.len()), features)
            .map_err(|e| anyhow::anyhow!("onnx input shape: {}", e))?;
        let tensor = ort::value::Tensor::from_array(input)
            .map_err(|e| anyhow::anyhow!("onnx input tensor: {}", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("onnx session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.config.input_name.as_str() => tensor])
            .map_err(|e| anyhow::anyhow!("onnx inference: {}", e))?;

        let output = outputs
            .get(self.config.output_name.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("onnx output '{}' not found", self.config.output_name)
            })?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow::anyhow!("onnx output tensor: {}", e))?;

        if data.len() != self.expected_labels {
            anyhow::bail!(
                "onnx output has {} probabilities, label_fields declares {}",
                data.len(),
                self.expected_labels
            );
        }
        Ok(data.iter().map(|p| f64::from(*p)).collect())
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
