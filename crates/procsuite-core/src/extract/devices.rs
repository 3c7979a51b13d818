//! Device lexicon extraction: stents and endobronchial valves into
//! granular evidence.

use super::{lobe_near, ExtractionOutcome};
use crate::model::{RegistryRecord, StentPlacement, ValvePlacement};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STENT: Regex = Regex::new(
        r"(?i)\b(?:(Ultraflex|Dumon|Aero|Bonastent|Silmet|AERO)\s+)?(?:(silicone|metallic|metal|covered|hybrid)\s+)?stent\b"
    )
    .expect("stent pattern");
    static ref VALVE: Regex = Regex::new(
        r"(?i)\b(?:(Zephyr|Spiration|IBV)\s+)?(?:endobronchial\s+)?valves?\b"
    )
    .expect("valve pattern");
}

pub(crate) fn extract(text: &str, record: &mut RegistryRecord, out: &mut ExtractionOutcome) {
    let mut stents: Vec<StentPlacement> = Vec::new();
    for caps in STENT.captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        if super::negation::is_negated(text, whole.start(), whole.end()) {
            continue;
        }
        let device = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .or_else(|| caps.get(2).map(|m| format!("{} stent", m.as_str().to_lowercase())));
        let lobe = lobe_near(text, whole.start(), whole.end());
        if stents.iter().any(|s| s.lobe == lobe && s.device == device) {
            continue;
        }
        out.record_evidence("granular_data.stents", text, whole.start(), whole.end());
        stents.push(StentPlacement {
            lobe,
            airway: None,
            device,
        });
    }
    if !stents.is_empty() {
        record.granular_data.stents = stents;
        out.claim("granular_data.stents");
    }

    let mut valves: Vec<ValvePlacement> = Vec::new();
    for caps in VALVE.captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        // Bare "valve" with no device name is too ambiguous (heart
        // valves appear in histories); require the lexicon hit or the
        // explicit "endobronchial" qualifier.
        let named = caps.get(1).is_some();
        let qualified = whole.as_str().to_lowercase().contains("endobronchial");
        if !named && !qualified {
            continue;
        }
        if super::negation::is_negated(text, whole.start(), whole.end()) {
            continue;
        }
        let device = caps.get(1).map(|m| m.as_str().to_string());
        let lobe = lobe_near(text, whole.start(), whole.end());
        if valves.iter().any(|v| v.lobe == lobe && v.device == device) {
            continue;
        }
        out.record_evidence("granular_data.valves", text, whole.start(), whole.end());
        valves.push(ValvePlacement {
            lobe,
            device,
            count: None,
        });
    }
    if !valves.is_empty() {
        record.granular_data.valves = valves;
        out.claim("granular_data.valves");
    }
}
