//! The Registry Record: the structured account of what happened during a
//! procedure, separate from billing.
//!
//! Every field defaults so a record can be built up fragment by fragment;
//! optional fields are skipped on serialization so rule-table count
//! conditions see absence, not nulls.

use super::procedures::{PleuralProcedure, Procedure};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RegistryRecord {
    pub demographics: Demographics,
    pub sedation: Sedation,
    pub procedures_performed: BTreeMap<Procedure, ProcedureEntry>,
    pub pleural_procedures: BTreeMap<PleuralProcedure, ProcedureEntry>,
    pub granular_data: GranularData,
    pub complications: Vec<Complication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_procedure_disposition: Option<String>,
    pub granular_validation_warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Demographics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_band: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indication: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Sedation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sedation_type: Option<String>,
    pub agents: Vec<SedationAgent>,
    pub complications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SedationAgent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcedureEntry {
    pub performed: bool,
    pub details: ProcedureDetails,
}

impl ProcedureEntry {
    pub fn performed() -> Self {
        ProcedureEntry {
            performed: true,
            details: ProcedureDetails::default(),
        }
    }

    pub fn not_performed() -> Self {
        ProcedureEntry::default()
    }
}

/// Per-procedure detail fields. Only the fields the rule table consults
/// are typed; anything else an extractor surfaces lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcedureDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stations_sampled_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imaging_guidance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drainage_catheter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laterality: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GranularData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_ebus: Option<EbusGranular>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tblb: Option<TblbGranular>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stents: Vec<StentPlacement>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub valves: Vec<ValvePlacement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EbusGranular {
    pub stations_sampled: Vec<StationSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StationSample {
    /// Lymph-node station label ("4R", "7", "11L"). Accepts a bare
    /// number on input since upstream JSON is not always careful.
    #[serde(deserialize_with = "station_label")]
    #[schemars(schema_with = "station_schema")]
    pub station: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adequate: Option<bool>,
}

fn station_schema(
    _gen: &mut schemars::gen::SchemaGenerator,
) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject::default();
    schema.instance_type = Some(
        vec![
            schemars::schema::InstanceType::String,
            schemars::schema::InstanceType::Number,
        ]
        .into(),
    );
    schema.into()
}

fn station_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "station must be a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TblbGranular {
    pub sites: Vec<TblbSite>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TblbSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StentPlacement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValvePlacement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Complication {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<String>,
}

impl RegistryRecord {
    /// Serialized view the rule engine and patch machinery operate on.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_performed(&self, p: Procedure) -> bool {
        self.procedures_performed
            .get(&p)
            .map(|e| e.performed)
            .unwrap_or(false)
    }

    pub fn is_pleural_performed(&self, p: PleuralProcedure) -> bool {
        self.pleural_procedures
            .get(&p)
            .map(|e| e.performed)
            .unwrap_or(false)
    }

    pub fn entry_mut(&mut self, p: Procedure) -> &mut ProcedureEntry {
        self.procedures_performed.entry(p).or_default()
    }

    pub fn pleural_entry_mut(&mut self, p: PleuralProcedure) -> &mut ProcedureEntry {
        self.pleural_procedures.entry(p).or_default()
    }

    pub fn mark_performed(&mut self, p: Procedure) {
        self.entry_mut(p).performed = true;
    }

    pub fn mark_pleural_performed(&mut self, p: PleuralProcedure) {
        self.pleural_entry_mut(p).performed = true;
    }

    /// True when nothing was extracted at all.
    pub fn is_empty(&self) -> bool {
        *self == RegistryRecord::default()
    }
}
