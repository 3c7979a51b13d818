//! Granular-to-aggregate propagation.
//!
//! This is the single place where per-site evidence drives the
//! procedure-performed flags. The pass only ever raises flags; a flag
//! that contradicts the granular evidence produces a warning, never a
//! downgrade. Warnings land in `granular_validation_warnings` in
//! insertion order and are also returned to the caller.

use crate::model::{Procedure, RegistryRecord};
use std::collections::BTreeSet;

const FLIP_NOTE: &str = "aggregate flag flipped from granular evidence";

pub fn propagate(record: &RegistryRecord) -> (RegistryRecord, Vec<String>) {
    let mut out = record.clone();
    let mut warnings = Vec::new();

    propagate_linear_ebus(&mut out, &mut warnings);
    propagate_tblb(&mut out, &mut warnings);
    propagate_stents(&mut out, &mut warnings);
    propagate_valves(&mut out, &mut warnings);
    check_unsupported_aggregates(&out, &mut warnings);

    for warning in &warnings {
        if !out.granular_validation_warnings.contains(warning) {
            out.granular_validation_warnings.push(warning.clone());
        }
    }
    (out, warnings)
}

fn propagate_linear_ebus(record: &mut RegistryRecord, warnings: &mut Vec<String>) {
    let Some(granular) = record.granular_data.linear_ebus.clone() else {
        return;
    };
    if granular.stations_sampled.is_empty() {
        return;
    }

    let count = granular.stations_sampled.len() as u32;
    let any_adequate = granular
        .stations_sampled
        .iter()
        .any(|s| s.adequate == Some(true));

    let entry = record.entry_mut(Procedure::LinearEbus);
    match entry.details.stations_sampled_count {
        Some(existing) if existing != count => {
            warnings.push(format!(
                "propagate: linear_ebus stations_sampled_count {} disagrees with {} granular stations; using granular",
                existing, count
            ));
            entry.details.stations_sampled_count = Some(count);
        }
        _ => entry.details.stations_sampled_count = Some(count),
    }

    if any_adequate && !entry.performed {
        entry.performed = true;
        warnings.push(format!(
            "propagate: linear_ebus.performed raised by {} adequate-sampled station(s) ({})",
            count, FLIP_NOTE
        ));
    }
}

fn propagate_tblb(record: &mut RegistryRecord, warnings: &mut Vec<String>) {
    let Some(granular) = record.granular_data.tblb.clone() else {
        return;
    };
    if granular.sites.is_empty() {
        return;
    }

    let lobes: BTreeSet<&str> = granular
        .sites
        .iter()
        .filter_map(|s| s.lobe.as_deref())
        .collect();

    let entry = record.entry_mut(Procedure::TransbronchialBiopsy);
    if !lobes.is_empty() {
        entry.details.lobes = Some(lobes.len() as u32);
    }
    if !entry.performed {
        entry.performed = true;
        warnings.push(format!(
            "propagate: transbronchial_biopsy.performed raised by {} documented site(s) ({})",
            granular.sites.len(),
            FLIP_NOTE
        ));
    }
}

fn propagate_stents(record: &mut RegistryRecord, warnings: &mut Vec<String>) {
    if record.granular_data.stents.is_empty() {
        return;
    }
    let lobes: BTreeSet<&str> = record
        .granular_data
        .stents
        .iter()
        .filter_map(|s| s.lobe.as_deref())
        .collect();
    let tracheal = lobes.contains("trachea");
    let stent_count = record.granular_data.stents.len();

    let entry = record.entry_mut(Procedure::AirwayStent);
    if !lobes.is_empty() {
        entry.details.lobes = Some(lobes.len() as u32);
    }
    if entry.details.location.is_none() {
        entry.details.location = Some(if tracheal {
            "tracheal".to_string()
        } else {
            "bronchial".to_string()
        });
    }
    if !entry.performed {
        entry.performed = true;
        warnings.push(format!(
            "propagate: airway_stent.performed raised by {} stent record(s) ({})",
            stent_count, FLIP_NOTE
        ));
    }
}

fn propagate_valves(record: &mut RegistryRecord, warnings: &mut Vec<String>) {
    if record.granular_data.valves.is_empty() {
        return;
    }
    let lobes: BTreeSet<&str> = record
        .granular_data
        .valves
        .iter()
        .filter_map(|v| v.lobe.as_deref())
        .collect();
    let valve_count = record.granular_data.valves.len();

    let entry = record.entry_mut(Procedure::Blvr);
    if !lobes.is_empty() {
        entry.details.lobes = Some(lobes.len() as u32);
    }
    if !entry.performed {
        entry.performed = true;
        warnings.push(format!(
            "propagate: blvr.performed raised by {} valve record(s) ({})",
            valve_count, FLIP_NOTE
        ));
    }
}

/// Aggregate flags that claim granular-backed procedures without any
/// granular evidence get a consistency warning. Purely informational.
fn check_unsupported_aggregates(record: &RegistryRecord, warnings: &mut Vec<String>) {
    if record.is_performed(Procedure::LinearEbus)
        && record
            .granular_data
            .linear_ebus
            .as_ref()
            .map(|g| g.stations_sampled.is_empty())
            .unwrap_or(true)
    {
        warnings.push(
            "propagate: linear_ebus.performed is set but no stations are documented".to_string(),
        );
    }
    if record.is_performed(Procedure::AirwayStent) && record.granular_data.stents.is_empty() {
        warnings.push(
            "propagate: airway_stent.performed is set but no stent records are documented"
                .to_string(),
        );
    }
}
