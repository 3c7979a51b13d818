//! The dynamic Registry schema.
//!
//! By default the schema is generated from the typed record; a deployment
//! may load its own JSON Schema document from disk instead
//! (`REGISTRY_SCHEMA_PATH`), which then drives both the LLM structured
//! call and validation of everything that claims to be a record fragment.

use super::record::RegistryRecord;
use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub struct RegistrySchema {
    document: Value,
    compiled: Arc<jsonschema::JSONSchema>,
}

impl std::fmt::Debug for RegistrySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySchema").finish_non_exhaustive()
    }
}

impl Clone for RegistrySchema {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            compiled: Arc::clone(&self.compiled),
        }
    }
}

impl RegistrySchema {
    /// Schema generated from the typed `RegistryRecord`.
    pub fn generated() -> anyhow::Result<Self> {
        let document = serde_json::to_value(schemars::schema_for!(RegistryRecord))
            .context("serializing generated registry schema")?;
        Self::from_document(document)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry schema {}", path.display()))?;
        let document: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing registry schema {}", path.display()))?;
        Self::from_document(document)
    }

    pub fn from_document(document: Value) -> anyhow::Result<Self> {
        let compiled = jsonschema::JSONSchema::compile(&document)
            .map_err(|e| anyhow::anyhow!("registry schema does not compile: {}", e))?;
        Ok(Self {
            document,
            compiled: Arc::new(compiled),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Validate a candidate fragment; violations come back as strings in
    /// instance-path order, empty when the fragment conforms.
    pub fn violations(&self, candidate: &Value) -> Vec<String> {
        match self.compiled.validate(candidate) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_schema_accepts_empty_record() {
        let schema = RegistrySchema::generated().unwrap();
        let record = RegistryRecord::default();
        assert!(schema.violations(&record.to_value()).is_empty());
    }

    #[test]
    fn generated_schema_rejects_wrong_types() {
        let schema = RegistrySchema::generated().unwrap();
        let bad = json!({"procedures_performed": {"bal": {"performed": "yes"}}});
        assert!(!schema.violations(&bad).is_empty());
    }

    #[test]
    fn station_labels_validate_as_string_or_number() {
        let schema = RegistrySchema::generated().unwrap();
        let doc = json!({"granular_data": {"linear_ebus": {"stations_sampled": [
            {"station": "4R", "adequate": true},
            {"station": 7, "adequate": true}
        ]}}});
        assert!(schema.violations(&doc).is_empty());
    }

    #[test]
    fn external_document_must_compile() {
        let err = RegistrySchema::from_document(json!({"type": 12})).unwrap_err();
        assert!(err.to_string().contains("does not compile"));
    }
}
