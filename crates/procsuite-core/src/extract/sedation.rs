//! Sedation type and drug extraction.

use super::ExtractionOutcome;
use crate::model::{RegistryRecord, SedationAgent};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SEDATION_TYPE: Regex = Regex::new(
        r"(?i)\b(general anesthesia|monitored anesthesia care|\bMAC\b|moderate sedation|conscious sedation|deep sedation)\b"
    )
    .expect("sedation type");
    static ref AGENT: Regex = Regex::new(
        r"(?i)\b(midazolam|versed|fentanyl|propofol|ketamine|dexmedetomidine|precedex|remifentanil|rocuronium)\b(?:[^.;\n]{0,20}?(\d+(?:\.\d+)?)\s*(mcg|mg|mg/kg|mcg/kg))?"
    )
    .expect("sedation agent");
}

pub(crate) fn extract(text: &str, record: &mut RegistryRecord, out: &mut ExtractionOutcome) {
    if let Some(m) = SEDATION_TYPE.find(text) {
        let normalized = match m.as_str().to_lowercase().as_str() {
            "general anesthesia" => "general",
            "monitored anesthesia care" | "mac" => "mac",
            "deep sedation" => "deep",
            _ => "moderate",
        };
        record.sedation.sedation_type = Some(normalized.to_string());
        out.claim("sedation.sedation_type");
        out.record_evidence("sedation.sedation_type", text, m.start(), m.end());
    }

    let mut agents: Vec<SedationAgent> = Vec::new();
    for caps in AGENT.captures_iter(text) {
        let name = match caps.get(1) {
            Some(m) => m.as_str().to_lowercase(),
            None => continue,
        };
        let canonical = match name.as_str() {
            "versed" => "midazolam".to_string(),
            "precedex" => "dexmedetomidine".to_string(),
            other => other.to_string(),
        };
        if agents.iter().any(|a| a.name == canonical) {
            continue;
        }
        let dose = match (caps.get(2), caps.get(3)) {
            (Some(amount), Some(unit)) => Some(format!("{} {}", amount.as_str(), unit.as_str())),
            _ => None,
        };
        agents.push(SedationAgent {
            name: canonical,
            dose,
        });
    }
    if !agents.is_empty() {
        record.sedation.agents = agents;
        out.claim("sedation.agents");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> RegistryRecord {
        let mut record = RegistryRecord::default();
        let mut out = ExtractionOutcome::default();
        extract(text, &mut record, &mut out);
        record
    }

    #[test]
    fn moderate_sedation_with_doses() {
        let record =
            run("Moderate sedation with midazolam 2 mg and fentanyl 100 mcg was administered.");
        assert_eq!(record.sedation.sedation_type.as_deref(), Some("moderate"));
        assert_eq!(record.sedation.agents.len(), 2);
        assert_eq!(record.sedation.agents[0].name, "midazolam");
        assert_eq!(record.sedation.agents[0].dose.as_deref(), Some("2 mg"));
        assert_eq!(record.sedation.agents[1].dose.as_deref(), Some("100 mcg"));
    }

    #[test]
    fn brand_names_canonicalized() {
        let record = run("Versed 2 mg given.");
        assert_eq!(record.sedation.agents[0].name, "midazolam");
    }

    #[test]
    fn general_anesthesia_detected() {
        let record = run("The procedure was performed under general anesthesia with propofol.");
        assert_eq!(record.sedation.sedation_type.as_deref(), Some("general"));
        assert_eq!(record.sedation.agents[0].name, "propofol");
    }
}
