//! Extraction over the focused note text.
//!
//! Three sources fill the record, in fixed priority order:
//! deterministic rules first, the schema-guided LLM second, keyword
//! hydration last. Priority is enforced with a touched-path set: a later
//! source never overwrites a path an earlier one claimed.

pub mod complications;
pub mod devices;
pub mod keywords;
pub mod negation;
pub mod schema_guided;
pub mod sedation;
pub mod stations;

use crate::model::{RegistryRecord, RegistrySchema};
use crate::phi::ScrubbedText;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Where in the focused text a field value came from.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceSpan {
    pub field_path: String,
    pub quote: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Dotted record paths the deterministic pass claimed.
    pub touched: BTreeSet<String>,
    pub evidence: Vec<EvidenceSpan>,
    pub warnings: Vec<String>,
}

impl ExtractionOutcome {
    pub fn claim(&mut self, path: impl Into<String>) {
        self.touched.insert(path.into());
    }

    pub fn record_evidence(
        &mut self,
        field_path: impl Into<String>,
        text: &str,
        start: usize,
        end: usize,
    ) {
        self.evidence.push(EvidenceSpan {
            field_path: field_path.into(),
            quote: text[start..end].to_string(),
            start,
            end,
        });
    }
}

/// Run every deterministic extractor over the focused text.
pub fn run_deterministic(focused: &ScrubbedText, record: &mut RegistryRecord) -> ExtractionOutcome {
    let text = focused.as_str();
    let mut outcome = ExtractionOutcome::default();
    // The propagator owns this field; no extraction source may write it.
    outcome.claim("granular_validation_warnings");

    extract_demographics(text, record, &mut outcome);
    stations::extract(text, record, &mut outcome);
    devices::extract(text, record, &mut outcome);
    sedation::extract(text, record, &mut outcome);
    complications::extract(text, record, &mut outcome);
    keywords::extract_negations(text, record, &mut outcome);
    keywords::extract_granular_sites(text, record, &mut outcome);

    outcome
}

lazy_static! {
    static ref INDICATION_LINE: Regex =
        Regex::new(r"(?im)^[ \t]*indications?[ \t]*:[ \t]*(.+)$").expect("indication line");
    static ref AGE_SEX: Regex = Regex::new(
        r"(?i)\b(\d{1,3})[ -]?(?:year[ -]old|y/?o)\b[ ,]*(male|female|man|woman)?"
    )
    .expect("age sex pattern");
    static ref DISPOSITION_LINE: Regex =
        Regex::new(r"(?im)^[ \t]*disposition[ \t]*:[ \t]*(.+)$").expect("disposition line");
}

fn extract_demographics(text: &str, record: &mut RegistryRecord, out: &mut ExtractionOutcome) {
    if let Some(caps) = INDICATION_LINE.captures(text) {
        if let Some(m) = caps.get(1) {
            record.demographics.indication = Some(m.as_str().trim().to_string());
            out.claim("demographics.indication");
            out.record_evidence("demographics.indication", text, m.start(), m.end());
        }
    }
    if let Some(caps) = AGE_SEX.captures(text) {
        if let Some(age) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
            let decade = (age / 10) * 10;
            record.demographics.age_band = Some(format!("{}-{}", decade, decade + 9));
            out.claim("demographics.age_band");
        }
        if let Some(sex) = caps.get(2) {
            let normalized = match sex.as_str().to_lowercase().as_str() {
                "male" | "man" => "male",
                _ => "female",
            };
            record.demographics.sex = Some(normalized.to_string());
            out.claim("demographics.sex");
        }
    }
    if let Some(caps) = DISPOSITION_LINE.captures(text) {
        if let Some(m) = caps.get(1) {
            record.post_procedure_disposition = Some(m.as_str().trim().to_string());
            out.claim("post_procedure_disposition");
            out.record_evidence("post_procedure_disposition", text, m.start(), m.end());
        }
    }
}

/// Lobe or central-airway token near a match, for site attribution.
pub(crate) fn lobe_near(text: &str, start: usize, end: usize) -> Option<String> {
    lazy_static! {
        static ref LOBE: Regex = Regex::new(
            r"(?i)\b(RUL|RML|RLL|LUL|LLL|lingula|right upper lobe|right middle lobe|right lower lobe|left upper lobe|left lower lobe|bronchus intermedius|trachea|(?:right|left) mainstem)\b"
        )
        .expect("lobe pattern");
    }
    let window_start = start.saturating_sub(60);
    let window_end = (end + 60).min(text.len());
    let window = &text[floor_boundary(text, window_start)..ceil_boundary(text, window_end)];
    LOBE.find(window).map(|m| normalize_lobe(m.as_str()))
}

pub(crate) fn normalize_lobe(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "right upper lobe" => "RUL".to_string(),
        "right middle lobe" => "RML".to_string(),
        "right lower lobe" => "RLL".to_string(),
        "left upper lobe" => "LUL".to_string(),
        "left lower lobe" => "LLL".to_string(),
        "lingula" => "lingula".to_string(),
        "trachea" => "trachea".to_string(),
        "bronchus intermedius" => "bronchus intermedius".to_string(),
        other if other.ends_with("mainstem") => other.to_string(),
        _ => raw.to_uppercase(),
    }
}

pub(crate) fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

pub(crate) fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Merge a schema-validated LLM fragment into the record, honoring the
/// deterministic pass's claims. Returns warnings; the record is left
/// untouched when the merged value no longer deserializes.
pub fn merge_llm_fragment(
    record: &mut RegistryRecord,
    fragment: &Value,
    touched: &BTreeSet<String>,
    schema: &RegistrySchema,
) -> Vec<String> {
    let mut warnings = Vec::new();

    let violations = schema.violations(fragment);
    if !violations.is_empty() {
        for violation in violations.iter().take(5) {
            warnings.push(format!("schema_guided: fragment rejected: {}", violation));
        }
        return warnings;
    }

    let mut current = record.to_value();
    merge_value(&mut current, fragment, "", touched);

    match serde_json::from_value::<RegistryRecord>(current) {
        Ok(merged) => *record = merged,
        Err(e) => {
            warnings.push(format!(
                "schema_guided: merged fragment does not deserialize; discarded ({})",
                e
            ));
        }
    }
    warnings
}

fn path_claimed(touched: &BTreeSet<String>, path: &str) -> bool {
    if touched.contains(path) {
        return true;
    }
    // Any claimed ancestor shields the whole subtree.
    let mut prefix = String::new();
    for seg in path.split('.') {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(seg);
        if touched.contains(&prefix) {
            return true;
        }
    }
    false
}

fn merge_value(current: &mut Value, incoming: &Value, path: &str, touched: &BTreeSet<String>) {
    if !path.is_empty() && path_claimed(touched, path) {
        return;
    }
    match incoming {
        Value::Null => {}
        Value::Object(incoming_map) => {
            if let Value::Object(current_map) = current {
                for (key, incoming_child) in incoming_map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    if current_map.contains_key(key) {
                        if let Some(current_child) = current_map.get_mut(key) {
                            merge_value(current_child, incoming_child, &child_path, touched);
                        }
                    } else if !path_claimed(touched, &child_path) && !incoming_child.is_null() {
                        current_map.insert(key.clone(), incoming_child.clone());
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Value::Array(current_items) = current {
                if current_items.is_empty() && !items.is_empty() {
                    *current = incoming.clone();
                }
            }
        }
        scalar => {
            if current.is_null() {
                *current = scalar.clone();
            }
        }
    }
}
