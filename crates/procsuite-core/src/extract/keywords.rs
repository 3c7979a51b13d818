//! Procedure phrase scanning.
//!
//! One scan feeds three consumers at different priority levels:
//! explicit denials ("was NOT performed") are deterministic and claim
//! the flag; granular TBLB sites with a named lobe are deterministic;
//! bare affirmative mentions are the lowest-priority hydration source
//! and only ever fill entries nothing else created.

use super::{lobe_near, negation, ExtractionOutcome};
use crate::model::{
    PleuralProcedure, Procedure, RegistryRecord, TblbGranular, TblbSite,
};
use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Proc(Procedure),
    Pleural(PleuralProcedure),
}

struct Phrase {
    target: Target,
    regex: Regex,
}

lazy_static! {
    static ref PHRASES: Vec<Phrase> = {
        let table: Vec<(Target, &str)> = vec![
            (
                Target::Proc(Procedure::LinearEbus),
                r"(?i)\bEBUS[- ]?TBNA\b|\bEBUS[- ]guided\b|\blinear EBUS\b|\bEBUS\b|\bendobronchial ultrasound\b",
            ),
            (
                Target::Proc(Procedure::RadialEbus),
                r"(?i)\bradial[- ]?EBUS\b|\bradial probe\b",
            ),
            (
                Target::Proc(Procedure::Bal),
                r"(?i)\bbronchoalveolar lavage\b|\bBAL\b",
            ),
            (
                Target::Proc(Procedure::BronchialWash),
                r"(?i)\bbronchial wash(?:ing)?s?\b|\bcell wash(?:ing)?s?\b",
            ),
            (
                Target::Proc(Procedure::Brushings),
                r"(?i)\b(?:bronchial |protected )?brush(?:ing)?s?\b",
            ),
            (
                Target::Proc(Procedure::EndobronchialBiopsy),
                r"(?i)\bendobronchial biops(?:y|ies)\b|\bEBBX\b",
            ),
            (
                Target::Proc(Procedure::TbnaConventional),
                r"(?i)\btransbronchial needle aspiration\b|\bconventional TBNA\b",
            ),
            (
                Target::Proc(Procedure::TransbronchialBiopsy),
                r"(?i)\btransbronchial (?:lung )?biops(?:y|ies)\b|\bTBLB\b|\bTBBX\b",
            ),
            (
                Target::Proc(Procedure::TransbronchialCryobiopsy),
                r"(?i)\btransbronchial cryobiops(?:y|ies)\b|\bcryobiops(?:y|ies)\b",
            ),
            (
                Target::Proc(Procedure::NavigationalBronchoscopy),
                r"(?i)\bnavigational bronchoscopy\b|\belectromagnetic navigation\b|\brobotic(?:-assisted)? bronchoscopy\b|\bsuperDimension\b",
            ),
            (
                Target::Proc(Procedure::AirwayDilation),
                r"(?i)\b(?:balloon|airway) dilat(?:ion|ation)\b",
            ),
            (Target::Proc(Procedure::AirwayStent), r"(?i)\bstent\b"),
            (
                Target::Proc(Procedure::ThermalAblation),
                r"(?i)\bargon plasma\b|\bAPC\b|\blaser\b|\belectrocautery\b|\bthermal ablation\b",
            ),
            (
                Target::Proc(Procedure::TumorDebulkingNonThermal),
                r"(?i)\bdebulk(?:ing|ed)?\b|\bmechanical debridement\b",
            ),
            (
                Target::Proc(Procedure::Cryotherapy),
                r"(?i)\bcryotherapy\b|\bcryoablation\b|\bcryo(?:probe)? (?:applied|treatment)\b",
            ),
            (
                Target::Proc(Procedure::Blvr),
                r"(?i)\bBLVR\b|\bbronchoscopic lung volume reduction\b|\bendobronchial valves?\b|\bZephyr\b|\bSpiration\b",
            ),
            (
                Target::Proc(Procedure::BronchialThermoplasty),
                r"(?i)\bbronchial thermoplasty\b",
            ),
            (
                Target::Proc(Procedure::ForeignBodyRemoval),
                r"(?i)\bforeign body\b",
            ),
            (
                Target::Proc(Procedure::RigidBronchoscopy),
                r"(?i)\brigid bronchoscop(?:y|e)\b",
            ),
            (
                Target::Proc(Procedure::WholeLungLavage),
                r"(?i)\b(?:whole|total) lung lavage\b",
            ),
            (
                Target::Proc(Procedure::TherapeuticAspiration),
                r"(?i)\btherapeutic aspiration\b|\bmucus plugs? (?:removed|aspirated|cleared)\b",
            ),
            (
                Target::Pleural(PleuralProcedure::Thoracentesis),
                r"(?i)\bthoracentesis\b",
            ),
            (
                Target::Pleural(PleuralProcedure::ChestTube),
                r"(?i)\bchest tube\b|\btube thoracostomy\b|\bpigtail catheter\b",
            ),
            (
                Target::Pleural(PleuralProcedure::Ipc),
                r"(?i)\b(?:indwelling|tunneled) pleural catheter\b|\bPleurX\b|\bIPC\b",
            ),
            (
                Target::Pleural(PleuralProcedure::MedicalThoracoscopy),
                r"(?i)\bmedical thoracoscopy\b|\bpleuroscopy\b",
            ),
            (
                Target::Pleural(PleuralProcedure::Pleurodesis),
                r"(?i)\bpleurodesis\b|\btalc (?:poudrage|slurry)\b",
            ),
            (
                Target::Pleural(PleuralProcedure::PleuralBiopsy),
                r"(?i)\bpleural biops(?:y|ies)\b",
            ),
            (
                Target::Pleural(PleuralProcedure::FibrinolyticTherapy),
                r"(?i)\bfibrinolytic\b|\balteplase\b|\btPA\b|\bdornase\b",
            ),
        ];
        table
            .into_iter()
            .map(|(target, pattern)| Phrase {
                target,
                regex: Regex::new(pattern).expect("phrase pattern"),
            })
            .collect()
    };
    static ref IMAGING_GUIDED: Regex =
        Regex::new(r"(?i)\b(?:ultrasound|US|CT)[- ]guid(?:ed|ance)\b").expect("imaging guidance");
    static ref THORACOSCOPIC_ROUTE: Regex =
        Regex::new(r"(?i)\bthoracoscop|poudrage\b").expect("thoracoscopic route");
}

#[derive(Debug, Default, Clone)]
pub(crate) struct PhraseHits {
    pub affirmative: Vec<(usize, usize)>,
    pub negated: Vec<(usize, usize)>,
}

/// Scan the text once; used by both the deterministic and the hydration
/// passes so the two can never disagree about what was mentioned.
pub(crate) fn scan(text: &str) -> Vec<(Target, PhraseHits)> {
    let mut results = Vec::new();
    for phrase in PHRASES.iter() {
        let mut hits = PhraseHits::default();
        for m in phrase.regex.find_iter(text) {
            if suppressed(phrase.target, text, m.start()) {
                continue;
            }
            if negation::is_negated(text, m.start(), m.end()) {
                hits.negated.push((m.start(), m.end()));
            } else {
                hits.affirmative.push((m.start(), m.end()));
            }
        }
        if !hits.affirmative.is_empty() || !hits.negated.is_empty() {
            results.push((phrase.target, hits));
        }
    }
    results
}

/// Phrase-level disambiguation the regex language cannot express.
fn suppressed(target: Target, text: &str, start: usize) -> bool {
    let lead_start = super::floor_boundary(text, start.saturating_sub(30));
    let lead = text[lead_start..start].to_lowercase();
    match target {
        // "radial endobronchial ultrasound" is not linear EBUS.
        Target::Proc(Procedure::LinearEbus) => lead.contains("radial"),
        // "EBUS-guided transbronchial needle aspiration" is 31652/3
        // territory, not conventional TBNA.
        Target::Proc(Procedure::TbnaConventional) => {
            lead.contains("ebus") || lead.contains("ultrasound")
        }
        // "transbronchial cryobiopsy" must not double-count as TBLB.
        Target::Proc(Procedure::TransbronchialBiopsy) => {
            let tail_end = super::ceil_boundary(text, (start + 40).min(text.len()));
            text[start..tail_end].to_lowercase().contains("cryobiops")
        }
        _ => false,
    }
}

/// Deterministic pass: explicit denials set `performed = false` and
/// claim the flag so no later source can flip it back.
pub(crate) fn extract_negations(
    text: &str,
    record: &mut RegistryRecord,
    out: &mut ExtractionOutcome,
) {
    for (target, hits) in scan(text) {
        if hits.negated.is_empty() || !hits.affirmative.is_empty() {
            continue;
        }
        let (start, end) = hits.negated[0];
        match target {
            Target::Proc(p) => {
                record.entry_mut(p).performed = false;
                let path = format!("procedures_performed.{}.performed", p);
                out.record_evidence(path.clone(), text, start, end);
                out.claim(path);
            }
            Target::Pleural(p) => {
                record.pleural_entry_mut(p).performed = false;
                let path = format!("pleural_procedures.{}.performed", p);
                out.record_evidence(path.clone(), text, start, end);
                out.claim(path);
            }
        }
    }
}

/// Deterministic pass: TBLB mentions with a named lobe become granular
/// sites. The propagator turns those into the aggregate flag.
pub(crate) fn extract_granular_sites(
    text: &str,
    record: &mut RegistryRecord,
    out: &mut ExtractionOutcome,
) {
    let mut sites: Vec<TblbSite> = Vec::new();
    for (target, hits) in scan(text) {
        let relevant = matches!(
            target,
            Target::Proc(Procedure::TransbronchialBiopsy)
                | Target::Proc(Procedure::TransbronchialCryobiopsy)
        );
        if !relevant {
            continue;
        }
        for (start, end) in &hits.affirmative {
            if let Some(lobe) = lobe_near(text, *start, *end) {
                if sites.iter().any(|s| s.lobe.as_deref() == Some(lobe.as_str())) {
                    continue;
                }
                out.record_evidence("granular_data.tblb.sites", text, *start, *end);
                sites.push(TblbSite {
                    lobe: Some(lobe),
                    segment: None,
                    samples: None,
                });
            }
        }
    }
    if !sites.is_empty() {
        record.granular_data.tblb = Some(TblbGranular { sites });
        out.claim("granular_data.tblb");
    }
}

/// Hydration pass, lowest priority: affirmative mentions fill entries
/// that are still absent after the deterministic and LLM passes.
pub(crate) fn hydrate(text: &str, record: &mut RegistryRecord) -> Vec<String> {
    let mut hydrated = Vec::new();
    for (target, hits) in scan(text) {
        let Some((start, end)) = hits.affirmative.first().copied() else {
            continue;
        };
        match target {
            Target::Proc(p) => {
                if record.procedures_performed.contains_key(&p) {
                    continue;
                }
                record.entry_mut(p).performed = true;
                hydrated.push(format!("procedures_performed.{}", p));
            }
            Target::Pleural(p) => {
                if record.pleural_procedures.contains_key(&p) {
                    continue;
                }
                let entry = record.pleural_entry_mut(p);
                entry.performed = true;
                match p {
                    PleuralProcedure::Thoracentesis => {
                        let window = context_window(text, start, end);
                        if IMAGING_GUIDED.is_match(window) {
                            entry.details.imaging_guidance = Some(true);
                        }
                    }
                    PleuralProcedure::Pleurodesis => {
                        let window = context_window(text, start, end);
                        entry.details.route = Some(if THORACOSCOPIC_ROUTE.is_match(window) {
                            "thoracoscopic".to_string()
                        } else {
                            "tube".to_string()
                        });
                    }
                    _ => {}
                }
                hydrated.push(format!("pleural_procedures.{}", p));
            }
        }
    }
    hydrated
}

fn context_window(text: &str, start: usize, end: usize) -> &str {
    let w_start = super::floor_boundary(text, start.saturating_sub(80));
    let w_end = super::ceil_boundary(text, (end + 80).min(text.len()));
    &text[w_start..w_end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_sets_flag_false_and_claims_path() {
        let text = "Planned transbronchial biopsy was NOT performed due to hypoxia.";
        let mut record = RegistryRecord::default();
        let mut out = ExtractionOutcome::default();
        extract_negations(text, &mut record, &mut out);
        let entry = record
            .procedures_performed
            .get(&Procedure::TransbronchialBiopsy)
            .expect("entry created");
        assert!(!entry.performed);
        assert!(out
            .touched
            .contains("procedures_performed.transbronchial_biopsy.performed"));
    }

    #[test]
    fn tblb_site_with_lobe_becomes_granular() {
        let text = "Transbronchial biopsy of the right lower lobe nodule was performed.";
        let mut record = RegistryRecord::default();
        let mut out = ExtractionOutcome::default();
        extract_granular_sites(text, &mut record, &mut out);
        let sites = record.granular_data.tblb.unwrap().sites;
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].lobe.as_deref(), Some("RLL"));
    }

    #[test]
    fn hydration_fills_only_absent_entries() {
        let text = "Navigational bronchoscopy with BAL of the RLL.";
        let mut record = RegistryRecord::default();
        record.entry_mut(Procedure::Bal).performed = false;
        let hydrated = hydrate(text, &mut record);
        assert!(!record.is_performed(Procedure::Bal), "existing entry kept");
        assert!(record.is_performed(Procedure::NavigationalBronchoscopy));
        assert_eq!(hydrated.len(), 1);
    }

    #[test]
    fn ebus_guided_tbna_is_not_conventional() {
        let text = "EBUS-guided transbronchial needle aspiration of station 7.";
        let hits = scan(text);
        assert!(hits
            .iter()
            .any(|(t, _)| *t == Target::Proc(Procedure::LinearEbus)));
        assert!(!hits
            .iter()
            .any(|(t, _)| *t == Target::Proc(Procedure::TbnaConventional)));
    }

    #[test]
    fn cryobiopsy_does_not_double_count_tblb() {
        let text = "Transbronchial cryobiopsy of the LUL was performed.";
        let hits = scan(text);
        assert!(hits
            .iter()
            .any(|(t, _)| *t == Target::Proc(Procedure::TransbronchialCryobiopsy)));
        assert!(!hits
            .iter()
            .any(|(t, _)| *t == Target::Proc(Procedure::TransbronchialBiopsy)));
    }

    #[test]
    fn pleurodesis_route_from_context() {
        let text = "Talc poudrage pleurodesis was performed during thoracoscopy.";
        let mut record = RegistryRecord::default();
        hydrate(text, &mut record);
        let entry = record
            .pleural_procedures
            .get(&PleuralProcedure::Pleurodesis)
            .unwrap();
        assert_eq!(entry.details.route.as_deref(), Some("thoracoscopic"));
    }
}
