//! The CPT rule table: typed schema, YAML loader, and structural checks.
//!
//! The built-in table ships with the crate (`tables/cpt_rules.yaml`); a
//! deployment may point the loader at its own file. Structural validation
//! happens at load time so a bad table is a startup error, never a
//! request-time surprise.

use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const BUILTIN_CPT_RULES: &str = include_str!("../tables/cpt_rules.yaml");

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read rule table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid rule table: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Bronchoscopy,
    Pleural,
}

/// What an add-on code needs before it may be emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryRequirement {
    /// Any non-add-on code of the bronchoscopy family.
    Keyword(AnyBronchoscopy),
    /// One of these specific codes.
    Codes(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnyBronchoscopy {
    AnyBronchoscopy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CptRule {
    pub code: String,
    pub description: String,
    pub category: RuleCategory,
    /// Add-on codes require an emitted primary and never satisfy one.
    #[serde(default)]
    pub addon: bool,
    #[serde(default)]
    pub requires_primary: Option<PrimaryRequirement>,
    /// Rules sharing a group are mutually exclusive; lowest rank wins.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub group_rank: u32,
    /// A diagnostic base code is suppressed by any non-add-on code of the
    /// same category.
    #[serde(default)]
    pub diagnostic_base: bool,
    pub when: Condition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    pub version: String,
    pub rules: Vec<CptRule>,
}

impl RuleTable {
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_yaml(BUILTIN_CPT_RULES)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, TableError> {
        let table: RuleTable = serde_yaml::from_str(yaml)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn rule(&self, code: &str) -> Option<&CptRule> {
        self.rules.iter().find(|r| r.code == code)
    }

    /// Codes of every rule in the table, in table order.
    pub fn codes(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.code.clone()).collect()
    }

    fn validate(&self) -> Result<(), TableError> {
        let mut seen = BTreeMap::new();
        for rule in &self.rules {
            if rule.code.len() != 5 || !rule.code.chars().all(|c| c.is_ascii_digit()) {
                return Err(TableError::Invalid(format!(
                    "rule code '{}' is not a 5-digit CPT code",
                    rule.code
                )));
            }
            if seen.insert(rule.code.clone(), ()).is_some() {
                return Err(TableError::Invalid(format!(
                    "duplicate rule for code '{}'",
                    rule.code
                )));
            }
            if rule.addon && rule.requires_primary.is_none() {
                return Err(TableError::Invalid(format!(
                    "add-on rule '{}' must declare requires_primary",
                    rule.code
                )));
            }
            if !rule.addon && rule.requires_primary.is_some() {
                return Err(TableError::Invalid(format!(
                    "rule '{}' declares requires_primary but is not an add-on",
                    rule.code
                )));
            }
        }

        // Group ranks must be unique within a group so "lowest rank wins"
        // is well defined.
        let mut ranks: BTreeMap<(&str, u32), &str> = BTreeMap::new();
        for rule in &self.rules {
            if let Some(group) = rule.group.as_deref() {
                if let Some(other) = ranks.insert((group, rule.group_rank), &rule.code) {
                    return Err(TableError::Invalid(format!(
                        "group '{}' has duplicate rank {} ({} and {})",
                        group, rule.group_rank, other, rule.code
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_parses_and_validates() {
        let table = RuleTable::builtin().expect("builtin table must be valid");
        assert!(table.rules.len() > 20);
        assert!(table.rule("31653").is_some());
        assert!(table.rule("32551").is_some());
    }

    #[test]
    fn ebus_group_is_a_partition() {
        let table = RuleTable::builtin().unwrap();
        let r52 = table.rule("31652").unwrap();
        let r53 = table.rule("31653").unwrap();
        assert_eq!(r52.group.as_deref(), Some("ebus_tbna"));
        assert_eq!(r53.group.as_deref(), Some("ebus_tbna"));
        assert!(r53.group_rank < r52.group_rank, "3+ stations outranks 1-2");
    }

    #[test]
    fn addons_declare_primaries() {
        let table = RuleTable::builtin().unwrap();
        for rule in table.rules.iter().filter(|r| r.addon) {
            assert!(
                rule.requires_primary.is_some(),
                "add-on {} without primary requirement",
                rule.code
            );
        }
    }

    #[test]
    fn duplicate_codes_rejected() {
        let yaml = r#"
version: "t"
rules:
  - code: "31624"
    description: "a"
    category: bronchoscopy
    when: { flag: x.performed }
  - code: "31624"
    description: "b"
    category: bronchoscopy
    when: { flag: y.performed }
"#;
        let err = RuleTable::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn addon_without_primary_rejected() {
        let yaml = r#"
version: "t"
rules:
  - code: "31627"
    description: "navigation"
    category: bronchoscopy
    addon: true
    when: { flag: x.performed }
"#;
        let err = RuleTable::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("requires_primary"));
    }
}
