//! CPT derivation: a pure function of the record and the rule tables.
//!
//! Evaluation order is fixed: match rules in table order, resolve
//! mutually exclusive groups (lowest rank wins), gate add-ons on an
//! emitted primary, suppress the diagnostic base under any interventional
//! code of its family, then apply NCCI pairs. Suppressed codes keep a
//! rationale explaining the bundling; emitted codes cite the record
//! field paths that satisfied them. The engine never reads the note.

use crate::errors::PipelineError;
use crate::model::RegistryRecord;
use procsuite_rules::{
    resolve_path, CptRule, KnowledgeBase, PrimaryRequirement, RuleCategory,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct Derivation {
    /// Emitted codes, in rule-table order.
    pub codes: Vec<String>,
    /// Rationales for emitted codes and for codes suppressed by
    /// bundling, keyed by code.
    pub rationales: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl Derivation {
    pub fn has(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }
}

pub fn derive(record: &RegistryRecord, kb: &KnowledgeBase) -> Result<Derivation, PipelineError> {
    let value = record.to_value();
    if value.is_null() {
        return Err(PipelineError::derivation("record does not serialize"));
    }

    let mut derivation = Derivation::default();

    // 1. Raw matches, table order.
    let mut matched: Vec<&CptRule> = kb
        .rules
        .rules
        .iter()
        .filter(|rule| rule.when.matches(&value))
        .collect();

    // 2. Mutually exclusive groups: keep the lowest rank per group.
    let mut group_winner: BTreeMap<&str, (&CptRule, u32)> = BTreeMap::new();
    for rule in &matched {
        if let Some(group) = rule.group.as_deref() {
            match group_winner.get(group) {
                Some((_, rank)) if *rank <= rule.group_rank => {}
                _ => {
                    group_winner.insert(group, (*rule, rule.group_rank));
                }
            }
        }
    }
    matched.retain(|rule| match rule.group.as_deref() {
        Some(group) => group_winner
            .get(group)
            .map(|(winner, _)| winner.code == rule.code)
            .unwrap_or(false),
        None => true,
    });

    // 3. Add-on gating against the surviving primaries.
    let primaries: BTreeSet<&str> = matched
        .iter()
        .filter(|r| !r.addon)
        .map(|r| r.code.as_str())
        .collect();
    let has_bronch_primary = matched
        .iter()
        .any(|r| !r.addon && r.category == RuleCategory::Bronchoscopy);
    matched.retain(|rule| {
        if !rule.addon {
            return true;
        }
        let satisfied = match &rule.requires_primary {
            Some(PrimaryRequirement::Keyword(_)) => has_bronch_primary,
            Some(PrimaryRequirement::Codes(codes)) => {
                codes.iter().any(|c| primaries.contains(c.as_str()))
            }
            None => false,
        };
        if !satisfied {
            derivation.warnings.push(format!(
                "derive: add-on {} requires an emitted primary; dropped",
                rule.code
            ));
        }
        satisfied
    });

    // 4. Diagnostic base bundling.
    let mut suppressed: BTreeMap<String, String> = BTreeMap::new();
    let interventional: Vec<&str> = matched
        .iter()
        .filter(|r| !r.addon && !r.diagnostic_base && r.category == RuleCategory::Bronchoscopy)
        .map(|r| r.code.as_str())
        .collect();
    if !interventional.is_empty() {
        for rule in &matched {
            if rule.diagnostic_base {
                suppressed.insert(
                    rule.code.clone(),
                    format!(
                        "suppressed: diagnostic bronchoscopy is bundled into {}",
                        interventional.join(", ")
                    ),
                );
            }
        }
        matched.retain(|rule| !rule.diagnostic_base);
    }

    // 5. NCCI pairs over what is left.
    let emitted_codes: Vec<String> = matched.iter().map(|r| r.code.clone()).collect();
    for pair in kb.ncci.applicable(&emitted_codes) {
        if emitted_codes.iter().any(|c| c == &pair.drop) {
            suppressed.insert(pair.drop.clone(), format!("suppressed: {}", pair.reason));
        }
    }
    matched.retain(|rule| !suppressed.contains_key(&rule.code));

    // 6. Rationales for the emitted set.
    for rule in &matched {
        let paths: Vec<String> = rule
            .when
            .referenced_paths()
            .into_iter()
            .filter(|p| resolve_path(&value, p).is_some())
            .collect();
        let cited = if paths.is_empty() {
            // Conditions over absent paths (count_at_most) still need a
            // grounded citation; fall back to the rule identity.
            format!("rule {}", rule.code)
        } else {
            let mut unique = paths;
            unique.dedup();
            unique.join(", ")
        };
        derivation
            .rationales
            .insert(rule.code.clone(), format!("{} [{}]", rule.description, cited));
        derivation.codes.push(rule.code.clone());
    }
    derivation.rationales.extend(suppressed);

    Ok(derivation)
}

/// NCCI pair filter over an arbitrary code list, shared with the hybrid
/// path. Returns surviving codes plus suppression reasons by code.
pub fn apply_ncci(
    codes: Vec<String>,
    ncci: &procsuite_rules::NcciTable,
) -> (Vec<String>, BTreeMap<String, String>) {
    let mut suppressed: BTreeMap<String, String> = BTreeMap::new();
    for pair in ncci.applicable(&codes) {
        if codes.iter().any(|c| c == &pair.drop) {
            suppressed.insert(pair.drop.clone(), format!("suppressed: {}", pair.reason));
        }
    }
    let kept = codes
        .into_iter()
        .filter(|c| !suppressed.contains_key(c))
        .collect();
    (kept, suppressed)
}
