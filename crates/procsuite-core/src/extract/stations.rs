//! EBUS lymph-node station extraction.
//!
//! Station tokens only count inside a context window that mentions
//! stations or EBUS, and numbers that are really counts ("3 passes",
//! "22 gauge") are excluded. Output is granular evidence; the propagator
//! decides what it means for the aggregate flags.

use super::ExtractionOutcome;
use crate::model::{EbusGranular, RegistryRecord, StationSample};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STATION_TOKEN: Regex =
        Regex::new(r"\b(\d{1,2})\s*([RLrl])?\b").expect("station token");
    static ref UNIT_AFTER: Regex = Regex::new(
        r"(?i)^\s*(?:passes?|needle|gauge|ga\b|mm|cm|ml|cc|times|samples?|aspirations?|french|fr\b|%)"
    )
    .expect("unit suffix");
    static ref ADEQUATE: Regex = Regex::new(r"(?i)\badequate\b").expect("adequate");
    static ref INADEQUATE: Regex = Regex::new(r"(?i)\binadequate\b").expect("inadequate");
}

/// Stations that exist without a side letter (midline or single).
const MIDLINE: &[u32] = &[1, 3, 5, 6, 7, 8, 9];
/// Stations that require a side letter.
const SIDED: &[u32] = &[2, 4, 10, 11, 12, 13, 14];

pub(crate) fn extract(text: &str, record: &mut RegistryRecord, out: &mut ExtractionOutcome) {
    let mut samples: Vec<StationSample> = Vec::new();
    let mut evidence: Vec<(usize, usize)> = Vec::new();

    for caps in STATION_TOKEN.captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        if !in_station_context(text, whole.start()) {
            continue;
        }
        if UNIT_AFTER.is_match(&text[whole.end()..]) {
            continue;
        }
        let number: u32 = match caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            Some(n) => n,
            None => continue,
        };
        let side = caps.get(2).map(|m| m.as_str().to_uppercase());
        let label = match (&side, number) {
            (Some(side), n) if SIDED.contains(&n) || MIDLINE.contains(&n) => {
                format!("{}{}", n, side)
            }
            (None, n) if MIDLINE.contains(&n) => n.to_string(),
            _ => continue,
        };
        if samples.iter().any(|s| s.station == label) {
            continue;
        }
        samples.push(StationSample {
            station: label,
            size_mm: None,
            appearance: None,
            adequate: None,
        });
        evidence.push((whole.start(), whole.end()));
    }

    if samples.is_empty() {
        return;
    }

    // Global adequacy call: per-station ROSE parsing is out of reach of a
    // regex pass, and a single "all adequate" is the dominant phrasing.
    let adequate = if INADEQUATE.is_match(text) {
        Some(false)
    } else if ADEQUATE.is_match(text) {
        Some(true)
    } else {
        None
    };
    for sample in &mut samples {
        sample.adequate = adequate;
    }

    for (start, end) in evidence {
        out.record_evidence("granular_data.linear_ebus.stations_sampled", text, start, end);
    }
    record.granular_data.linear_ebus = Some(EbusGranular {
        stations_sampled: samples,
    });
    out.claim("granular_data.linear_ebus");
}

fn in_station_context(text: &str, idx: usize) -> bool {
    lazy_static! {
        static ref CONTEXT: Regex = Regex::new(r"(?i)\bstations?\b|\bebus\b").expect("context");
    }
    let start = super::floor_boundary(text, idx.saturating_sub(60));
    let end = super::ceil_boundary(text, (idx + 20).min(text.len()));
    CONTEXT.is_match(&text[start..end])
}
