//! Closed enums for the procedure families the registry tracks.
//!
//! The canonical snake_case names double as map keys in the serialized
//! record, so the serde renames here are load-bearing: rule-table field
//! paths and patch pointers spell these exact strings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Procedure {
    LinearEbus,
    RadialEbus,
    Bal,
    BronchialWash,
    Brushings,
    EndobronchialBiopsy,
    TbnaConventional,
    TransbronchialBiopsy,
    TransbronchialCryobiopsy,
    NavigationalBronchoscopy,
    AirwayDilation,
    AirwayStent,
    ThermalAblation,
    TumorDebulkingNonThermal,
    Cryotherapy,
    Blvr,
    BronchialThermoplasty,
    ForeignBodyRemoval,
    RigidBronchoscopy,
    WholeLungLavage,
    TherapeuticAspiration,
}

impl Procedure {
    pub const ALL: &'static [Procedure] = &[
        Procedure::LinearEbus,
        Procedure::RadialEbus,
        Procedure::Bal,
        Procedure::BronchialWash,
        Procedure::Brushings,
        Procedure::EndobronchialBiopsy,
        Procedure::TbnaConventional,
        Procedure::TransbronchialBiopsy,
        Procedure::TransbronchialCryobiopsy,
        Procedure::NavigationalBronchoscopy,
        Procedure::AirwayDilation,
        Procedure::AirwayStent,
        Procedure::ThermalAblation,
        Procedure::TumorDebulkingNonThermal,
        Procedure::Cryotherapy,
        Procedure::Blvr,
        Procedure::BronchialThermoplasty,
        Procedure::ForeignBodyRemoval,
        Procedure::RigidBronchoscopy,
        Procedure::WholeLungLavage,
        Procedure::TherapeuticAspiration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Procedure::LinearEbus => "linear_ebus",
            Procedure::RadialEbus => "radial_ebus",
            Procedure::Bal => "bal",
            Procedure::BronchialWash => "bronchial_wash",
            Procedure::Brushings => "brushings",
            Procedure::EndobronchialBiopsy => "endobronchial_biopsy",
            Procedure::TbnaConventional => "tbna_conventional",
            Procedure::TransbronchialBiopsy => "transbronchial_biopsy",
            Procedure::TransbronchialCryobiopsy => "transbronchial_cryobiopsy",
            Procedure::NavigationalBronchoscopy => "navigational_bronchoscopy",
            Procedure::AirwayDilation => "airway_dilation",
            Procedure::AirwayStent => "airway_stent",
            Procedure::ThermalAblation => "thermal_ablation",
            Procedure::TumorDebulkingNonThermal => "tumor_debulking_non_thermal",
            Procedure::Cryotherapy => "cryotherapy",
            Procedure::Blvr => "blvr",
            Procedure::BronchialThermoplasty => "bronchial_thermoplasty",
            Procedure::ForeignBodyRemoval => "foreign_body_removal",
            Procedure::RigidBronchoscopy => "rigid_bronchoscopy",
            Procedure::WholeLungLavage => "whole_lung_lavage",
            Procedure::TherapeuticAspiration => "therapeutic_aspiration",
        }
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PleuralProcedure {
    Thoracentesis,
    ChestTube,
    Ipc,
    MedicalThoracoscopy,
    Pleurodesis,
    PleuralBiopsy,
    FibrinolyticTherapy,
}

impl PleuralProcedure {
    pub const ALL: &'static [PleuralProcedure] = &[
        PleuralProcedure::Thoracentesis,
        PleuralProcedure::ChestTube,
        PleuralProcedure::Ipc,
        PleuralProcedure::MedicalThoracoscopy,
        PleuralProcedure::Pleurodesis,
        PleuralProcedure::PleuralBiopsy,
        PleuralProcedure::FibrinolyticTherapy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PleuralProcedure::Thoracentesis => "thoracentesis",
            PleuralProcedure::ChestTube => "chest_tube",
            PleuralProcedure::Ipc => "ipc",
            PleuralProcedure::MedicalThoracoscopy => "medical_thoracoscopy",
            PleuralProcedure::Pleurodesis => "pleurodesis",
            PleuralProcedure::PleuralBiopsy => "pleural_biopsy",
            PleuralProcedure::FibrinolyticTherapy => "fibrinolytic_therapy",
        }
    }
}

impl std::fmt::Display for PleuralProcedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_as_str() {
        for p in Procedure::ALL {
            let json = serde_json::to_string(p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
        }
        for p in PleuralProcedure::ALL {
            let json = serde_json::to_string(p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
        }
    }
}
