//! NCCI bundling pairs: code pairs that cannot be billed together.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BUILTIN_NCCI_PAIRS: &str = include_str!("../tables/ncci_pairs.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcciPair {
    pub keep: String,
    pub drop: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcciTable {
    pub pairs: Vec<NcciPair>,
}

impl NcciTable {
    pub fn builtin() -> Result<Self, crate::table::TableError> {
        Self::from_yaml(BUILTIN_NCCI_PAIRS)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, crate::table::TableError> {
        let table: NcciTable = serde_yaml::from_str(yaml)?;
        for pair in &table.pairs {
            if pair.keep == pair.drop {
                return Err(crate::table::TableError::Invalid(format!(
                    "NCCI pair keeps and drops the same code '{}'",
                    pair.keep
                )));
            }
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, crate::table::TableError> {
        let raw =
            std::fs::read_to_string(path).map_err(|source| crate::table::TableError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml(&raw)
    }

    /// Pairs whose `keep` side is present in `codes`.
    pub fn applicable<'a>(&'a self, codes: &[String]) -> Vec<&'a NcciPair> {
        self.pairs
            .iter()
            .filter(|p| codes.iter().any(|c| c == &p.keep))
            .collect()
    }
}
