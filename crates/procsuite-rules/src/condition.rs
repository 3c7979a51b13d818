//! Conditions a CPT rule evaluates against a serialized Registry Record.
//!
//! Paths are dot-separated field paths into the record JSON
//! (`procedures_performed.linear_ebus.performed`). Counts accept either a
//! number at the path or an array (its length); a missing path counts as
//! zero, so `count_at_most` is satisfied by absence while
//! `count_at_least` is not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    Flag { flag: String },
    CountAtLeast { count_at_least: CountBound },
    CountAtMost { count_at_most: CountBound },
    Equals { equals: EqualsClause },
    Any { any: Vec<Condition> },
    All { all: Vec<Condition> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountBound {
    pub path: String,
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EqualsClause {
    pub path: String,
    pub value: Value,
}

/// Resolve a dot-separated field path against a record value.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('.') {
        cur = cur.get(seg)?;
    }
    Some(cur)
}

fn count_at(root: &Value, path: &str) -> u64 {
    match resolve_path(root, path) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::Array(items)) => items.len() as u64,
        _ => 0,
    }
}

impl Condition {
    /// Evaluate against the serialized record.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Condition::Flag { flag } => {
                matches!(resolve_path(record, flag), Some(Value::Bool(true)))
            }
            Condition::CountAtLeast { count_at_least } => {
                let min = count_at_least.min.unwrap_or(1);
                count_at(record, &count_at_least.path) >= min
            }
            Condition::CountAtMost { count_at_most } => {
                let max = count_at_most.max.unwrap_or(0);
                count_at(record, &count_at_most.path) <= max
            }
            Condition::Equals { equals } => {
                resolve_path(record, &equals.path) == Some(&equals.value)
            }
            Condition::Any { any } => any.iter().any(|c| c.matches(record)),
            Condition::All { all } => all.iter().all(|c| c.matches(record)),
        }
    }

    /// Field paths referenced by this condition, for rationale strings.
    pub fn referenced_paths(&self) -> Vec<String> {
        match self {
            Condition::Flag { flag } => vec![flag.clone()],
            Condition::CountAtLeast { count_at_least } => vec![count_at_least.path.clone()],
            Condition::CountAtMost { count_at_most } => vec![count_at_most.path.clone()],
            Condition::Equals { equals } => vec![equals.path.clone()],
            Condition::Any { any } => any.iter().flat_map(|c| c.referenced_paths()).collect(),
            Condition::All { all } => all.iter().flat_map(|c| c.referenced_paths()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flag_matches_only_true() {
        let record = json!({"procedures_performed": {"bal": {"performed": true}}});
        let cond: Condition =
            serde_yaml::from_str("flag: procedures_performed.bal.performed").unwrap();
        assert!(cond.matches(&record));

        let record = json!({"procedures_performed": {"bal": {"performed": false}}});
        assert!(!cond.matches(&record));
        assert!(!cond.matches(&json!({})));
    }

    #[test]
    fn count_accepts_number_or_array() {
        let cond: Condition = serde_yaml::from_str(
            "count_at_least:\n  path: granular_data.stents\n  min: 2",
        )
        .unwrap();
        assert!(cond.matches(&json!({"granular_data": {"stents": [1, 2]}})));
        assert!(cond.matches(&json!({"granular_data": {"stents": 3}})));
        assert!(!cond.matches(&json!({"granular_data": {"stents": [1]}})));
        assert!(!cond.matches(&json!({})));
    }

    #[test]
    fn count_at_most_treats_missing_as_zero() {
        let cond: Condition = serde_yaml::from_str(
            "count_at_most:\n  path: a.b\n  max: 2",
        )
        .unwrap();
        assert!(cond.matches(&json!({})));
        assert!(cond.matches(&json!({"a": {"b": 2}})));
        assert!(!cond.matches(&json!({"a": {"b": 3}})));
    }

    #[test]
    fn nested_all_any() {
        let yaml = r#"
all:
  - flag: a.performed
  - any:
      - equals: { path: a.route, value: "tube" }
      - equals: { path: a.route, value: "thoracoscopic" }
"#;
        let cond: Condition = serde_yaml::from_str(yaml).unwrap();
        assert!(cond.matches(&json!({"a": {"performed": true, "route": "tube"}})));
        assert!(!cond.matches(&json!({"a": {"performed": true, "route": "talc"}})));
        assert_eq!(
            cond.referenced_paths(),
            vec!["a.performed", "a.route", "a.route"]
        );
    }
}
