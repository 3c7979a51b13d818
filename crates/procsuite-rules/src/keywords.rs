//! Per-CPT keyword guards used by the self-correction loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const BUILTIN_AUDIT_KEYWORDS: &str = include_str!("../tables/audit_keywords.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordGuards {
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl KeywordGuards {
    pub fn builtin() -> Result<Self, crate::table::TableError> {
        Ok(serde_yaml::from_str(BUILTIN_AUDIT_KEYWORDS)?)
    }

    pub fn load(path: &Path) -> Result<Self, crate::table::TableError> {
        let raw =
            std::fs::read_to_string(path).map_err(|source| crate::table::TableError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// True when the note plausibly mentions the procedure behind `code`.
    /// A code with no guard entry never passes: self-correction must not
    /// touch codes the keyword list knows nothing about.
    pub fn supports(&self, code: &str, note_text: &str) -> bool {
        let lowered = note_text.to_lowercase();
        self.keywords
            .get(code)
            .map(|words| words.iter().any(|w| lowered.contains(w.as_str())))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_guards_parse() {
        let guards = KeywordGuards::builtin().unwrap();
        assert!(guards.keywords.contains_key("31653"));
    }

    #[test]
    fn supports_is_case_insensitive() {
        let guards = KeywordGuards::builtin().unwrap();
        assert!(guards.supports("31653", "EBUS-TBNA of station 4R"));
        assert!(!guards.supports("31653", "diagnostic inspection only"));
    }

    #[test]
    fn unknown_code_never_passes() {
        let guards = KeywordGuards::builtin().unwrap();
        assert!(!guards.supports("99999", "ebus station"));
    }
}
